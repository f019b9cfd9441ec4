#![no_std]

use embedded_hal::{
    delay::DelayNs,
    i2c::{Error as _, ErrorKind, I2c},
};
use nalgebra::Vector3;

mod cfg;
mod reg;
pub use crate::cfg::*;
use crate::reg::*;

/// Wait after every register write before the new value is guaranteed in effect
const SETTLE_DELAY_MS: u32 = 50;

/// Temperature sensitivity in LSB/°C and offset in °C
const TMP_SENSITIVITY: f32 = 340.0;
const TMP_OFFSET: f32 = 36.53;

#[derive(Clone, Copy, Debug)]
/// Container for accelerometer and gyroscope measurements
pub struct Data6Dof<T> {
    pub acc: Vector3<T>,
    pub gyr: Vector3<T>,
    pub tmp: T,
}

/// Lifecycle of the device as last driven by this handle
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    /// Power state not known, either never initialized or an initialization failed midway
    Unknown,
    Reset,
    Awake,
    /// Ranges programmed and read back, sampling not yet requested
    Configured,
    Running,
    Stopped,
}

// Type to hold bus information for I2c
pub struct MpuBusI2c<I2C> {
    bus_inner: I2C,
    address: I2cAddress,
}

// Trait to allow swapping the transport underneath the driver
pub trait BusTransfer {
    type Error;
    type Inner;
    fn destroy(self) -> Self::Inner;
    fn bus_transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error>;
    fn bus_write(&mut self, write: &[u8]) -> Result<(), Self::Error>;
    /// Returns whether the device acknowledges its address
    fn probe(&mut self) -> Result<bool, Self::Error>;
}

impl<I2C: I2c> BusTransfer for MpuBusI2c<I2C> {
    type Inner = I2C;
    type Error = I2C::Error;

    fn destroy(self) -> Self::Inner {
        self.bus_inner
    }

    fn bus_transfer(&mut self, write: &[u8], read: &mut [u8]) -> Result<(), Self::Error> {
        self.bus_inner.write_read(self.address.get(), write, read)
    }

    fn bus_write(&mut self, write: &[u8]) -> Result<(), Self::Error> {
        self.bus_inner.write(self.address.get(), write)
    }

    fn probe(&mut self) -> Result<bool, Self::Error> {
        probe_address(&mut self.bus_inner, self.address.get())
    }
}

/// Zero-length write: an acknowledge means present, a NACK means absent
fn probe_address<I2C: I2c>(i2c: &mut I2C, address: u8) -> Result<bool, I2C::Error> {
    match i2c.write(address, &[]) {
        Ok(()) => Ok(true),
        Err(e) if matches!(e.kind(), ErrorKind::NoAcknowledge(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Set of 7-bit bus addresses
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet(u128);

impl AddressSet {
    pub fn insert(&mut self, address: u8) {
        if address < 128 {
            self.0 |= 1u128 << address;
        }
    }

    pub const fn contains(&self, address: u8) -> bool {
        address < 128 && self.0 & (1u128 << address) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..128u8).filter(move |a| self.contains(*a))
    }
}

/// Probes every non-reserved 7-bit address and collects the ones that respond
pub fn scan<I2C: I2c>(i2c: &mut I2C) -> Result<AddressSet, I2C::Error> {
    let mut found = AddressSet::default();
    for address in 0x08..=0x77 {
        if probe_address(i2c, address)? {
            found.insert(address);
        }
    }
    Ok(found)
}

/// Sensor-specific knowledge needed to program and decode a full-scale range
trait FullScale: Copy + PartialEq + core::fmt::Debug {
    const CONFIG: Register;
    fn setting(self) -> u8;
    fn from_setting(bits: u8) -> Self;
}

impl FullScale for AccRange {
    const CONFIG: Register = Register::AccelConfig;

    fn setting(self) -> u8 {
        self as u8
    }

    fn from_setting(bits: u8) -> Self {
        AccRange::from_bits(bits)
    }
}

impl FullScale for GyrRange {
    const CONFIG: Register = Register::GyroConfig;

    fn setting(self) -> u8 {
        self as u8
    }

    fn from_setting(bits: u8) -> Self {
        GyrRange::from_bits(bits)
    }
}

pub struct Mpu6050<BUS, DELAY> {
    bus: BUS,
    /// Requested ranges, applied on `initialize`
    config: Mpu6050Config,
    /// Ranges last read back from the device, with their cached divisors
    acc_range: AccRange,
    gyr_range: GyrRange,
    acc_scale: f32,
    gyr_scale: f32,
    state: DeviceState,
    delay: DELAY,
}

impl<BUS, DELAY> Mpu6050<MpuBusI2c<BUS>, DELAY>
where
    BUS: I2c,
    DELAY: DelayNs,
{
    /// Creates an uninitialized IMU struct with the given config.
    #[must_use]
    pub fn new_i2c_from_cfg(bus: BUS, cfg: Mpu6050Config, delay: DELAY) -> Self {
        Self {
            bus: MpuBusI2c {
                bus_inner: bus,
                address: I2cAddress::default(),
            },
            config: cfg,
            acc_range: cfg.acc_range,
            gyr_range: cfg.gyr_range,
            acc_scale: cfg.acc_range.divisor(),
            gyr_scale: cfg.gyr_range.divisor(),
            state: DeviceState::Unknown,
            delay,
        }
    }

    /// Creates an uninitialized IMU struct with a default config.
    #[must_use]
    pub fn new_i2c(bus: BUS, delay: DELAY) -> Self {
        Self::new_i2c_from_cfg(bus, Mpu6050Config::default(), delay)
    }

    /// Set I2C address of the module. See `I2cAddress` for defaults, otherwise `u8` implements `Into<I2cAddress>`
    #[must_use]
    pub fn set_address(self, address: impl Into<I2cAddress>) -> Self {
        Mpu6050 {
            bus: MpuBusI2c {
                address: address.into(),
                ..self.bus
            },
            ..self
        }
    }

    pub fn address(&self) -> u8 {
        self.bus.address.get()
    }
}

impl<BUS: BusTransfer, DELAY> Mpu6050<BUS, DELAY> {
    /// Consumes the `Mpu6050` and releases the bus back to the user
    #[must_use]
    pub fn destroy(self) -> BUS::Inner {
        self.bus.destroy()
    }

    /// Request an accelerometer range, choices are 2G, 4G, 8G or 16G
    #[must_use]
    pub fn acc_range(self, acc_range: AccRange) -> Self {
        Mpu6050 {
            config: Mpu6050Config {
                acc_range,
                ..self.config
            },
            ..self
        }
    }

    /// Request a gyroscope range, choices are 250Dps, 500Dps, 1000Dps and 2000Dps
    #[must_use]
    pub fn gyr_range(self, gyr_range: GyrRange) -> Self {
        Mpu6050 {
            config: Mpu6050Config {
                gyr_range,
                ..self.config
            },
            ..self
        }
    }

    pub fn config(&self) -> &Mpu6050Config {
        &self.config
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == DeviceState::Running
    }

    /// Accelerometer range as last read back from the device
    pub fn accel_range(&self) -> AccRange {
        self.acc_range
    }

    /// Gyroscope range as last read back from the device
    pub fn gyro_range(&self) -> GyrRange {
        self.gyr_range
    }

    /// Divisor in LSB/g currently applied to accelerometer samples
    pub fn accel_scale(&self) -> f32 {
        self.acc_scale
    }

    /// Divisor in LSB/(deg/s) currently applied to gyroscope samples
    pub fn gyro_scale(&self) -> f32 {
        self.gyr_scale
    }

    fn apply_acc_range(&mut self, range: AccRange) {
        self.acc_range = range;
        self.acc_scale = range.divisor();
    }

    fn apply_gyr_range(&mut self, range: GyrRange) {
        self.gyr_range = range;
        self.gyr_scale = range.divisor();
    }
}

impl<BUS, DELAY> Mpu6050<BUS, DELAY>
where
    BUS: BusTransfer,
    DELAY: DelayNs,
{
    /*
        Register access
    */

    /// Read a const number `N` of bytes starting at the requested register
    fn read_from<const N: usize>(&mut self, cmd: Register) -> Result<[u8; N], BUS::Error> {
        let mut buf = [0u8; N];
        self.bus.bus_transfer(&[cmd.reg()], &mut buf)?;
        Ok(buf)
    }

    /// Write a single byte to the requested register, then wait for it to settle
    fn write_to(&mut self, cmd: Register, data: u8) -> Result<(), BUS::Error> {
        log::trace!("write {:?} <- {:#04x}", cmd, data);
        self.bus.bus_write(&[cmd.reg(), data])?;
        self.delay.delay_ms(SETTLE_DELAY_MS);
        Ok(())
    }

    /// Write to a register, but only overwrite the parts corresponding to the flag byte
    fn write_to_flag(&mut self, cmd: Register, data: u8, flag: u8) -> Result<(), BUS::Error> {
        let [register] = self.read_from(cmd)?;
        self.write_to(cmd, merge_flag(register, data, flag))
    }

    /*
        Presence checks
    */

    /// Whether the configured address acknowledges on the bus
    pub fn is_device_accessible(&mut self) -> Result<bool, BUS::Error> {
        self.bus.probe()
    }

    /// Raw content of the identity register
    pub fn who_am_i(&mut self) -> Result<u8, BUS::Error> {
        let [id] = self.read_from(Register::WhoAmI)?;
        Ok(id)
    }

    /// Whether the chip identifies itself as an MPU6050
    pub fn check_connection(&mut self) -> Result<bool, BUS::Error> {
        Ok(self.who_am_i()? == WHO_AM_I_VALUE)
    }

    /// Runs both presence checks, failing with the first one that does not hold
    pub fn ensure_present(&mut self) -> Result<(), MpuError<BUS::Error>> {
        if !self.is_device_accessible()? {
            return Err(MpuError::DeviceNotPresent);
        }

        let id = self.who_am_i()?;
        if id != WHO_AM_I_VALUE {
            return Err(MpuError::WhoAmIMismatch(id));
        }

        Ok(())
    }

    /*
        Lifecycle
    */

    /// Trigger a device reset. The device stays asleep afterwards.
    pub fn reset(&mut self) -> Result<(), BUS::Error> {
        self.write_to_flag(
            Register::PwrMgmt1,
            pwr_mgmt_1::DEVICE_RESET,
            pwr_mgmt_1::DEVICE_RESET,
        )?;
        self.state = DeviceState::Reset;
        log::debug!("device reset");
        Ok(())
    }

    /// Select the default clock source, which also clears the sleep bit
    pub fn wake(&mut self) -> Result<(), BUS::Error> {
        self.write_to(Register::PwrMgmt1, pwr_mgmt_1::WAKE)?;
        self.state = DeviceState::Awake;
        log::debug!("device awake");
        Ok(())
    }

    pub fn reset_and_wake(&mut self) -> Result<(), BUS::Error> {
        self.reset()?;
        self.wake()
    }

    /// Reset, wake and program the requested ranges, reading back what the device accepted.
    ///
    /// Safe to call again; on failure the device is left in an unknown state and this
    /// must be re-run before sampling.
    pub fn initialize(&mut self) -> Result<(), BUS::Error> {
        let result = self.run_initialize();
        if result.is_err() {
            self.state = DeviceState::Unknown;
        }
        result
    }

    fn run_initialize(&mut self) -> Result<(), BUS::Error> {
        self.reset_and_wake()?;
        self.set_acc_range(self.config.acc_range)?;
        self.set_gyr_range(self.config.gyr_range)?;
        self.state = DeviceState::Configured;
        log::debug!(
            "device configured: {:?}, {:?}",
            self.acc_range,
            self.gyr_range
        );
        Ok(())
    }

    /// Clear the sleep bit to begin continuous sampling
    pub fn start(&mut self) -> Result<(), BUS::Error> {
        if self.state == DeviceState::Unknown {
            log::warn!("starting a device that has not been initialized");
        }
        self.write_to_flag(Register::PwrMgmt1, 0, pwr_mgmt_1::SLEEP)?;
        self.state = DeviceState::Running;
        log::debug!("device running");
        Ok(())
    }

    /// Set the sleep bit, returning the device to low power
    pub fn stop(&mut self) -> Result<(), BUS::Error> {
        self.write_to_flag(Register::PwrMgmt1, pwr_mgmt_1::SLEEP, pwr_mgmt_1::SLEEP)?;
        self.state = DeviceState::Stopped;
        log::debug!("device stopped");
        Ok(())
    }

    /*
        Range configuration
    */

    fn write_range<R: FullScale>(&mut self, range: R) -> Result<(), BUS::Error> {
        self.write_to_flag(R::CONFIG, fs_sel::encode(range.setting()), fs_sel::MASK)
    }

    fn read_range<R: FullScale>(&mut self) -> Result<R, BUS::Error> {
        let [config] = self.read_from(R::CONFIG)?;
        Ok(R::from_setting(fs_sel::decode(config)))
    }

    /// Program the accelerometer range and return the range the device actually holds.
    /// The returned value, not `range`, determines how samples are scaled.
    pub fn set_acc_range(&mut self, range: AccRange) -> Result<AccRange, BUS::Error> {
        self.config.acc_range = range;
        self.write_range(range)?;
        let actual = self.get_acc_range()?;
        note_coerced(range, actual);
        Ok(actual)
    }

    /// Program the gyroscope range and return the range the device actually holds.
    /// The returned value, not `range`, determines how samples are scaled.
    pub fn set_gyr_range(&mut self, range: GyrRange) -> Result<GyrRange, BUS::Error> {
        self.config.gyr_range = range;
        self.write_range(range)?;
        let actual = self.get_gyr_range()?;
        note_coerced(range, actual);
        Ok(actual)
    }

    /// Read the accelerometer range from the device and rescale to it
    pub fn get_acc_range(&mut self) -> Result<AccRange, BUS::Error> {
        let range = self.read_range()?;
        self.apply_acc_range(range);
        Ok(range)
    }

    /// Read the gyroscope range from the device and rescale to it
    pub fn get_gyr_range(&mut self) -> Result<GyrRange, BUS::Error> {
        let range = self.read_range()?;
        self.apply_gyr_range(range);
        Ok(range)
    }

    /*
        Measurements
    */

    fn read_triple(&mut self, cmd: Register, divisor: f32) -> Result<Vector3<f32>, BUS::Error> {
        let raw = self.read_from(cmd)?;
        Ok(scale_3xi16(collect_3xi16(raw), divisor))
    }

    /// Get vector of accelerometer values in g
    pub fn get_acceleration(&mut self) -> Result<Vector3<f32>, BUS::Error> {
        self.read_triple(Register::AccelXoutH, self.acc_scale)
    }

    /// Get vector of gyroscope values in degrees/second
    pub fn get_gyro(&mut self) -> Result<Vector3<f32>, BUS::Error> {
        self.read_triple(Register::GyroXoutH, self.gyr_scale)
    }

    /// Get die temperature in degrees Celsius
    pub fn read_temperature(&mut self) -> Result<f32, BUS::Error> {
        let raw = self.read_from(Register::TempOutH)?;
        Ok(tmp_from_bytes(raw))
    }

    /// Get array of unscaled accelerometer values
    pub fn read_acc_unscaled(&mut self) -> Result<Vector3<i16>, BUS::Error> {
        let raw = self.read_from(Register::AccelXoutH)?;
        Ok(collect_3xi16(raw).into())
    }

    /// Get array of unscaled gyroscope values
    pub fn read_gyr_unscaled(&mut self) -> Result<Vector3<i16>, BUS::Error> {
        let raw = self.read_from(Register::GyroXoutH)?;
        Ok(collect_3xi16(raw).into())
    }

    pub fn read_tmp_unscaled(&mut self) -> Result<i16, BUS::Error> {
        let raw = self.read_from(Register::TempOutH)?;
        Ok(i16::from_be_bytes(raw))
    }

    /// Get scaled measurements for accelerometer and gyroscope, and temperature
    pub fn read_6dof(&mut self) -> Result<Data6Dof<f32>, BUS::Error> {
        let raw: [u8; 14] = self.read_from(Register::AccelXoutH)?;
        let [axh, axl, ayh, ayl, azh, azl, tph, tpl, gxh, gxl, gyh, gyl, gzh, gzl] = raw;

        let acc = scale_3xi16(collect_3xi16([axh, axl, ayh, ayl, azh, azl]), self.acc_scale);
        let gyr = scale_3xi16(collect_3xi16([gxh, gxl, gyh, gyl, gzh, gzl]), self.gyr_scale);
        let tmp = tmp_from_bytes([tph, tpl]);

        Ok(Data6Dof { acc, gyr, tmp })
    }

    /// Get unscaled measurements for accelerometer and gyroscope, and temperature
    pub fn read_6dof_unscaled(&mut self) -> Result<Data6Dof<i16>, BUS::Error> {
        let raw: [u8; 14] = self.read_from(Register::AccelXoutH)?;
        let [axh, axl, ayh, ayl, azh, azl, tph, tpl, gxh, gxl, gyh, gyl, gzh, gzl] = raw;

        let acc = collect_3xi16([axh, axl, ayh, ayl, azh, azl]).into();
        let gyr = collect_3xi16([gxh, gxl, gyh, gyl, gzh, gzl]).into();
        let tmp = i16::from_be_bytes([tph, tpl]);

        Ok(Data6Dof { acc, gyr, tmp })
    }
}

fn note_coerced<R: FullScale>(requested: R, actual: R) {
    if requested != actual {
        log::warn!(
            "{:?}: requested {:?} but device holds {:?}",
            R::CONFIG,
            requested,
            actual
        );
    }
}

/// Collects 6 big-endian bytes into X, Y, Z values
fn collect_3xi16(values: [u8; 6]) -> [i16; 3] {
    let [xh, xl, yh, yl, zh, zl] = values;
    [
        i16::from_be_bytes([xh, xl]),
        i16::from_be_bytes([yh, yl]),
        i16::from_be_bytes([zh, zl]),
    ]
}

fn scale_3xi16(values: [i16; 3], divisor: f32) -> Vector3<f32> {
    Vector3::from(values.map(|x| f32::from(x) / divisor))
}

/// Takes 2 bytes converts them into a temperature as a float
fn tmp_from_bytes(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_be_bytes(bytes)) / TMP_SENSITIVITY + TMP_OFFSET
}

#[derive(Debug)]
pub enum MpuError<E> {
    BusError(E),
    /// Nothing acknowledged the configured address
    DeviceNotPresent,
    /// Something answered, but not with the MPU6050 identity byte
    WhoAmIMismatch(u8),
}

impl<E> From<E> for MpuError<E> {
    fn from(error: E) -> Self {
        MpuError::BusError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_3xi16_covers_full_i16_range() {
        for value in i16::MIN..=i16::MAX {
            let [h, l] = value.to_be_bytes();
            let flipped = value.wrapping_neg();
            let [fh, fl] = flipped.to_be_bytes();
            assert_eq!(collect_3xi16([h, l, fh, fl, l, h]), [
                value,
                flipped,
                i16::from_be_bytes([l, h])
            ]);
        }
    }

    #[test]
    fn collect_3xi16_is_msb_first_x_before_z() {
        assert_eq!(collect_3xi16([0x00, 0x01, 0x80, 0x00, 0xFF, 0xFF]), [1, i16::MIN, -1]);
    }

    #[test]
    fn temperature_is_linear() {
        assert_eq!(tmp_from_bytes(0i16.to_be_bytes()), 36.53);
        assert_eq!(tmp_from_bytes(340i16.to_be_bytes()), 37.53);
    }

    #[test]
    fn scale_divides_each_axis() {
        let v = scale_3xi16([8192, -8192, 0], AccRange::Gs4.divisor());
        assert_eq!(v, Vector3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn address_set_contains_only_inserted() {
        let mut set = AddressSet::default();
        assert!(set.is_empty());
        set.insert(0x3C);
        set.insert(0x77);
        set.insert(0xFF);
        assert!(set.contains(0x3C));
        assert!(!set.contains(0x68));
        assert!(!set.contains(0xFF));
        let mut found = set.iter();
        assert_eq!(found.next(), Some(0x3C));
        assert_eq!(found.next(), Some(0x77));
        assert_eq!(found.next(), None);
    }
}
