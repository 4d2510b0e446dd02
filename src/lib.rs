//! Hardware abstraction helpers for single-board embedded Linux hosts:
//! sysfs GPIO lines with edge callbacks, a software-timed PWM generator and
//! register-mapped drivers for I2C peripherals.
//!
//! The library emits leveled records through the [`log`] facade; the
//! embedding process picks the sink.

pub mod config;
pub mod drivers;
pub mod gpio;
pub mod i2c;
pub mod pwm;
