#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mpu6050Config {
    pub acc_range: AccRange,
    pub gyr_range: GyrRange,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum I2cAddress {
    /// Default address when pin `AD0` is low
    #[default]
    X68,
    /// Address when pin `AD0` is high
    X69,
    /// In case the module is strapped to something else entirely
    Any(u8),
}

impl From<u8> for I2cAddress {
    fn from(address: u8) -> Self {
        I2cAddress::Any(address)
    }
}

impl I2cAddress {
    pub const fn get(&self) -> u8 {
        match self {
            I2cAddress::X68 => 0x68,
            I2cAddress::X69 => 0x69,
            I2cAddress::Any(a) => *a,
        }
    }
}

/// Full-scale range of accelerometer in Gs
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AccRange {
    #[default]
    Gs2 = 0b00,
    Gs4 = 0b01,
    Gs8 = 0b10,
    Gs16 = 0b11,
}

impl AccRange {
    /// Sensitivity in LSB/g
    pub const fn divisor(self) -> f32 {
        match self {
            Self::Gs2 => 16384.0,
            Self::Gs4 => 8192.0,
            Self::Gs8 => 4096.0,
            Self::Gs16 => 2048.0,
        }
    }

    /// Build from the 2-bit `FS_SEL` value, upper bits are ignored
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Gs2,
            0b01 => Self::Gs4,
            0b10 => Self::Gs8,
            _ => Self::Gs16,
        }
    }
}

/// Full-scale range of gyroscope in degrees/second
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GyrRange {
    #[default]
    Dps250 = 0b00,
    Dps500 = 0b01,
    Dps1000 = 0b10,
    Dps2000 = 0b11,
}

impl GyrRange {
    /// Sensitivity in LSB/(deg/s)
    pub const fn divisor(self) -> f32 {
        match self {
            Self::Dps250 => 131.0,
            Self::Dps500 => 65.5,
            Self::Dps1000 => 32.8,
            Self::Dps2000 => 16.4,
        }
    }

    /// Build from the 2-bit `FS_SEL` value, upper bits are ignored
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Dps250,
            0b01 => Self::Dps500,
            0b10 => Self::Dps1000,
            _ => Self::Dps2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acc_range_bits_round_trip() {
        for range in [AccRange::Gs2, AccRange::Gs4, AccRange::Gs8, AccRange::Gs16] {
            assert_eq!(AccRange::from_bits(range as u8), range);
        }
        assert_eq!(AccRange::from_bits(0b101), AccRange::Gs4);
    }

    #[test]
    fn gyr_range_bits_round_trip() {
        for range in [GyrRange::Dps250, GyrRange::Dps500, GyrRange::Dps1000, GyrRange::Dps2000] {
            assert_eq!(GyrRange::from_bits(range as u8), range);
        }
    }

    #[test]
    fn defaults_match_power_on_registers() {
        let cfg = Mpu6050Config::default();
        assert_eq!(cfg.acc_range, AccRange::Gs2);
        assert_eq!(cfg.gyr_range, GyrRange::Dps250);
        assert_eq!(I2cAddress::default().get(), 0x68);
    }
}
