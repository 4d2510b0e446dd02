use crate::i2c::{I2cDevice, I2cError, RegisterTransport};
use log::{debug, error};
use std::time::Instant;

const RAD_TO_DEG: f64 = 57.29578; // 180 / pi
const DEFAULT_GYRO_COEFF: f64 = 0.98;

/// Address with AD0 pulled low; 0x69 with AD0 high.
pub const DEFAULT_ADDRESS: u8 = 0x68;

const RA_WHO_AM_I: u8 = 0x75;
const WHO_AM_I_BIT: u8 = 6;
const WHO_AM_I_LENGTH: u8 = 6;
const DEVICE_SIGNATURE: u8 = 0x34;

const RA_GYRO_CONFIG: u8 = 0x1B;
const GCONFIG_FS_SEL_BIT: u8 = 4;
const GCONFIG_FS_SEL_LENGTH: u8 = 2;

const RA_ACCEL_CONFIG: u8 = 0x1C;
const ACONFIG_AFS_SEL_BIT: u8 = 4;
const ACONFIG_AFS_SEL_LENGTH: u8 = 2;

const RA_PWR_MGMT_1: u8 = 0x6B;
const PWR1_SLEEP_BIT: u8 = 6;
const PWR1_CLKSEL_BIT: u8 = 2;
const PWR1_CLKSEL_LENGTH: u8 = 3;

const RA_ACCEL_XOUT_H: u8 = 0x3B;
const RA_TEMP_OUT_H: u8 = 0x41;
const MOTION_BURST_LEN: usize = 14;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Internal = 0x00,
    PllXGyro = 0x01,
    PllYGyro = 0x02,
    PllZGyro = 0x03,
    PllExt32k = 0x04,
    PllExt19m = 0x05,
    KeepReset = 0x07,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GyroRange {
    Dps250 = 0x00,
    Dps500 = 0x01,
    Dps1000 = 0x02,
    Dps2000 = 0x03,
}

impl GyroRange {
    /// Degrees per second per digit; fixed calibration constants.
    fn dps_per_digit(self) -> f64 {
        match self {
            GyroRange::Dps250 => 0.007633,
            GyroRange::Dps500 => 0.015267,
            GyroRange::Dps1000 => 0.030487,
            GyroRange::Dps2000 => 0.060975,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelRange {
    G2 = 0x00,
    G4 = 0x01,
    G8 = 0x02,
    G16 = 0x03,
}

impl AccelRange {
    fn range_per_digit(self) -> f64 {
        match self {
            AccelRange::G2 => 0.000061, // 1 : 16384
            AccelRange::G4 => 0.000122, // 1 : 8192
            AccelRange::G8 => 0.000244,
            AccelRange::G16 => 0.0004882,
        }
    }
}

/// One burst sample, big-endian words straight off the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawMotion6 {
    pub accel_x: i16,
    pub accel_y: i16,
    pub accel_z: i16,
    pub temp: i16,
    pub gyro_x: i16,
    pub gyro_y: i16,
    pub gyro_z: i16,
}

/// A sample converted to physical units: g, degrees per second, celsius.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Motion6 {
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub temp_c: f64,
}

/// Orientation estimate in degrees. `angle_acc_x`/`angle_acc_y` are the raw
/// accelerometer tilt of this sample; `angle_x`/`angle_y`/`angle_z` are the
/// driver's persisted running estimate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Angles {
    pub angle_acc_x: f64,
    pub angle_acc_y: f64,
    pub angle_x: f64,
    pub angle_y: f64,
    pub angle_z: f64,
}

fn wrap(angle: f64, limit: f64) -> f64 {
    let mut wrapped = angle;
    while wrapped > limit {
        wrapped -= 2.0 * limit;
    }
    while wrapped < -limit {
        wrapped += 2.0 * limit;
    }
    wrapped
}

pub(crate) fn temp_celsius(raw: i16) -> f64 {
    raw as f64 / 340.0 + 36.53
}

/// MPU-6050 6-axis accelerometer/gyroscope.
///
/// The running angle estimate and the last-sample timestamp are mutated only
/// by [`Mpu6050::angles`]; the `&mut self` receiver keeps the driver a
/// single-owner object as the filter state requires.
pub struct Mpu6050<'a> {
    device: I2cDevice<'a>,
    dps_per_digit: f64,
    range_per_digit: f64,
    upside_down_mounting: bool,
    filter_gyro_coef: f64,
    fusion_enabled: bool,
    last_sample: Instant,
    angle_x: f64,
    angle_y: f64,
    angle_z: f64,
}

impl<'a> Mpu6050<'a> {
    pub fn new(bus: &'a dyn RegisterTransport, address: u8) -> Self {
        Mpu6050 {
            device: I2cDevice::new(bus, address),
            dps_per_digit: 0.0,
            range_per_digit: 0.0,
            upside_down_mounting: false,
            filter_gyro_coef: DEFAULT_GYRO_COEFF,
            fusion_enabled: true,
            last_sample: Instant::now(),
            angle_x: 0.0,
            angle_y: 0.0,
            angle_z: 0.0,
        }
    }

    /// Verify the device signature and bring the sensor into its default
    /// operating state: X-gyro PLL clock, ±250 °/s, ±2 g, sleep cleared.
    ///
    /// Returns `false` on signature mismatch or I/O failure; the caller
    /// decides whether to proceed.
    pub fn init_device(&mut self) -> bool {
        let value = match self.device.read_bits(RA_WHO_AM_I, WHO_AM_I_BIT, WHO_AM_I_LENGTH) {
            Ok(value) => value,
            Err(err) => {
                error!(
                    "mpu6050 {:#04x}: identity read failed: {}",
                    self.device.address(),
                    err
                );
                return false;
            }
        };

        if value != DEVICE_SIGNATURE {
            error!(
                "no mpu6050 at {:#04x}: signature {:#04x}, expected {:#04x}",
                self.device.address(),
                value,
                DEVICE_SIGNATURE
            );
            return false;
        }

        if let Err(err) = self.set_clock_source(ClockSource::PllXGyro) {
            error!(
                "mpu6050 {:#04x}: clock source write failed: {}",
                self.device.address(),
                err
            );
            return false;
        }

        if self.set_full_scale_gyro_range(GyroRange::Dps250).is_err() {
            return false;
        }

        if self.set_full_scale_accel_range(AccelRange::G2).is_err() {
            return false;
        }

        if let Err(err) = self.set_sleep_enabled(false) {
            error!(
                "mpu6050 {:#04x}: could not clear sleep bit: {}",
                self.device.address(),
                err
            );
            return false;
        }

        debug!("mpu6050 {:#04x}: initialized", self.device.address());
        true
    }

    pub fn set_clock_source(&mut self, source: ClockSource) -> Result<(), I2cError> {
        self.device
            .write_bits(RA_PWR_MGMT_1, PWR1_CLKSEL_BIT, PWR1_CLKSEL_LENGTH, source as u8)
    }

    /// Select the gyro full-scale range. The scale factor only changes when
    /// the register write went through.
    pub fn set_full_scale_gyro_range(&mut self, range: GyroRange) -> Result<(), I2cError> {
        self.device
            .write_bits(RA_GYRO_CONFIG, GCONFIG_FS_SEL_BIT, GCONFIG_FS_SEL_LENGTH, range as u8)
            .map_err(|err| {
                error!(
                    "mpu6050 {:#04x}: gyro range write failed: {}",
                    self.device.address(),
                    err
                );
                err
            })?;

        self.dps_per_digit = range.dps_per_digit();
        Ok(())
    }

    pub fn set_full_scale_accel_range(&mut self, range: AccelRange) -> Result<(), I2cError> {
        self.device
            .write_bits(
                RA_ACCEL_CONFIG,
                ACONFIG_AFS_SEL_BIT,
                ACONFIG_AFS_SEL_LENGTH,
                range as u8,
            )
            .map_err(|err| {
                error!(
                    "mpu6050 {:#04x}: accel range write failed: {}",
                    self.device.address(),
                    err
                );
                err
            })?;

        self.range_per_digit = range.range_per_digit();
        Ok(())
    }

    pub fn set_sleep_enabled(&mut self, enabled: bool) -> Result<(), I2cError> {
        self.device.write_bit(RA_PWR_MGMT_1, PWR1_SLEEP_BIT, enabled)
    }

    pub fn set_upside_down_mounting(&mut self, upside_down: bool) {
        self.upside_down_mounting = upside_down;
    }

    /// Complementary-filter blend coefficient: weight of the integrated gyro
    /// estimate against the accelerometer tilt. Clamped to 0.0 - 1.0.
    pub fn set_filter_gyro_coef(&mut self, coef: f64) {
        self.filter_gyro_coef = coef.clamp(0.0, 1.0);
    }

    /// When disabled, [`Mpu6050::angles`] leaves the persisted estimate
    /// untouched and only reports the per-sample accelerometer tilt.
    pub fn set_fusion_enabled(&mut self, enabled: bool) {
        self.fusion_enabled = enabled;
    }

    pub fn dps_per_digit(&self) -> f64 {
        self.dps_per_digit
    }

    pub fn range_per_digit(&self) -> f64 {
        self.range_per_digit
    }

    /// One 14-byte burst read so all seven words belong to the same sample
    /// instant.
    pub fn raw_motion6(&self) -> Result<RawMotion6, I2cError> {
        let mut buffer = [0u8; MOTION_BURST_LEN];
        self.device.read_bytes(RA_ACCEL_XOUT_H, &mut buffer)?;

        let word = |i: usize| i16::from_be_bytes([buffer[i], buffer[i + 1]]);
        Ok(RawMotion6 {
            accel_x: word(0),
            accel_y: word(2),
            accel_z: word(4),
            temp: word(6),
            gyro_x: word(8),
            gyro_y: word(10),
            gyro_z: word(12),
        })
    }

    pub fn motion6(&self) -> Result<Motion6, I2cError> {
        let raw = self.raw_motion6()?;

        let mut accel_z = raw.accel_z as f64 * self.range_per_digit;
        if self.upside_down_mounting {
            accel_z = -accel_z;
        }

        Ok(Motion6 {
            accel_x: raw.accel_x as f64 * self.range_per_digit,
            accel_y: raw.accel_y as f64 * self.range_per_digit,
            accel_z,
            gyro_x: raw.gyro_x as f64 * self.dps_per_digit,
            gyro_y: raw.gyro_y as f64 * self.dps_per_digit,
            gyro_z: raw.gyro_z as f64 * self.dps_per_digit,
            temp_c: temp_celsius(raw.temp),
        })
    }

    pub fn temp(&self) -> Result<f64, I2cError> {
        let mut buffer = [0u8; 2];
        self.device.read_bytes(RA_TEMP_OUT_H, &mut buffer)?;
        Ok(temp_celsius(i16::from_be_bytes(buffer)))
    }

    /// Take a sample and update the orientation estimate.
    ///
    /// Tilt is an approximation for small angles; the sign of Z lets the X
    /// angle cover the full -180..+180 range. With fusion enabled the
    /// persisted estimate is the complementary blend of the integrated gyro
    /// rate and the accelerometer tilt; with fusion disabled the estimate is
    /// returned unchanged.
    pub fn angles(&mut self) -> Result<Angles, I2cError> {
        let motion = self.motion6()?;

        let sg_z = match motion.accel_z >= 0.0 {
            true => 1.0,
            false => -1.0,
        };
        let angle_acc_x = motion
            .accel_y
            .atan2(sg_z * (motion.accel_z.powi(2) + motion.accel_x.powi(2)).sqrt())
            * RAD_TO_DEG;
        let angle_acc_y = -motion
            .accel_x
            .atan2((motion.accel_z.powi(2) + motion.accel_y.powi(2)).sqrt())
            * RAD_TO_DEG;

        let now = Instant::now();
        let dt = now.duration_since(self.last_sample).as_secs_f64();
        self.last_sample = now;

        if self.fusion_enabled {
            let coef = self.filter_gyro_coef;
            self.angle_x = wrap(
                coef * (angle_acc_x + wrap(self.angle_x + motion.gyro_x * dt - angle_acc_x, 180.0))
                    + (1.0 - coef) * angle_acc_x,
                180.0,
            );
            self.angle_y = wrap(
                coef * (angle_acc_y
                    + wrap(self.angle_y + sg_z * motion.gyro_y * dt - angle_acc_y, 90.0))
                    + (1.0 - coef) * angle_acc_y,
                90.0,
            );
            // the accelerometer has no Z heading, gyro integration only
            self.angle_z += motion.gyro_z * dt;
        }

        Ok(Angles {
            angle_acc_x,
            angle_acc_y,
            angle_x: self.angle_x,
            angle_y: self.angle_y,
            angle_z: self.angle_z,
        })
    }
}
