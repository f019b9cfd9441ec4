/// Value reported by the `WhoAmI` register, independent of the AD0 strap
pub const WHO_AM_I_VALUE: u8 = 0x68;

#[derive(PartialEq, Copy, Clone, Debug)]
pub enum Register {
    GyroConfig = 0x1B,
    AccelConfig = 0x1C,
    AccelXoutH = 0x3B,
    TempOutH = 0x41,
    GyroXoutH = 0x43,
    PwrMgmt1 = 0x6B,
    WhoAmI = 0x75,
}

impl Register {
    pub const fn reg(self) -> u8 {
        self as u8
    }
}

/// Bit fields of `PwrMgmt1`
pub mod pwr_mgmt_1 {
    pub const DEVICE_RESET: u8 = 1 << 7;
    pub const SLEEP: u8 = 1 << 6;

    /// Full register value written on wake: clock select 1, sleep cleared
    pub const WAKE: u8 = 0x01;
}

/// Full-scale range field, bits 3 and 4 of both `AccelConfig` and `GyroConfig`
pub mod fs_sel {
    pub const SHIFT: u8 = 3;
    pub const MASK: u8 = 0b11 << SHIFT;

    /// Place a 2-bit range setting into its register position
    pub const fn encode(setting: u8) -> u8 {
        (setting << SHIFT) & MASK
    }

    /// Extract the 2-bit range setting from a config register value
    pub const fn decode(register: u8) -> u8 {
        (register & MASK) >> SHIFT
    }
}

/// Apply `data` to `register`, only touching the bits set in `flag`
pub const fn merge_flag(register: u8, data: u8, flag: u8) -> u8 {
    (register & !flag) | (data & flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_sel_uses_bits_three_and_four() {
        assert_eq!(fs_sel::MASK, 0b0001_1000);
        assert_eq!(fs_sel::encode(0), 0b0000_0000);
        assert_eq!(fs_sel::encode(1), 0b0000_1000);
        assert_eq!(fs_sel::encode(2), 0b0001_0000);
        assert_eq!(fs_sel::encode(3), 0b0001_1000);
    }

    #[test]
    fn fs_sel_decode_ignores_other_bits() {
        assert_eq!(fs_sel::decode(0b1110_0111), 0);
        assert_eq!(fs_sel::decode(0b1110_1111), 1);
        assert_eq!(fs_sel::decode(0b0001_0000), 2);
        assert_eq!(fs_sel::decode(0xFF), 3);
    }

    #[test]
    fn merge_flag_preserves_unrelated_bits() {
        assert_eq!(merge_flag(0b0100_0000, pwr_mgmt_1::DEVICE_RESET, pwr_mgmt_1::DEVICE_RESET), 0b1100_0000);
        assert_eq!(merge_flag(0b1110_0111, fs_sel::encode(2), fs_sel::MASK), 0b1111_0111);
        assert_eq!(merge_flag(0b0100_0001, 0, pwr_mgmt_1::SLEEP), 0b0000_0001);
    }
}
