use crate::gpio::{PinDirection, PinValue};
use crate::i2c::{I2cDevice, I2cError, RegisterTransport};
use log::{debug, error};
use std::error::Error;
use std::fmt::Display;

// bank A serves pins 0-7, bank B pins 8-15
const REG_IODIR_A: u8 = 0x00;
const REG_IODIR_B: u8 = 0x01;
const REG_GPIO_A: u8 = 0x12;
const REG_GPIO_B: u8 = 0x13;
const REG_OLAT_A: u8 = 0x14;
const REG_OLAT_B: u8 = 0x15;

pub const PIN_COUNT: u8 = 16;

#[derive(Debug, PartialEq)]
pub enum ExpanderError {
    PinOutOfRange(u8),
    Bus(I2cError),
}

impl Display for ExpanderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            ExpanderError::PinOutOfRange(pin) => format!("pin must be 0 - 15, got {}", pin),
            ExpanderError::Bus(err) => err.to_string(),
        })
    }
}

impl Error for ExpanderError {}

impl From<I2cError> for ExpanderError {
    fn from(err: I2cError) -> Self {
        ExpanderError::Bus(err)
    }
}

/// Map a logical pin 0-15 to its bank register and bit position. Rejects
/// out-of-range pins before any bus traffic.
fn select_bank(pin: u8, bank_a: u8, bank_b: u8) -> Result<(u8, u8), ExpanderError> {
    if pin >= PIN_COUNT {
        error!("mcp23017: pin must be 0 - 15, got {}", pin);
        return Err(ExpanderError::PinOutOfRange(pin));
    }

    match pin > 7 {
        true => Ok((bank_b, pin - 8)),
        false => Ok((bank_a, pin)),
    }
}

/// MCP23017 16-bit port expander. Stateless beyond the device handle; every
/// call is a fresh read-modify-write of the selected bank register.
pub struct Mcp23017<'a> {
    device: I2cDevice<'a>,
}

impl<'a> Mcp23017<'a> {
    pub fn new(bus: &'a dyn RegisterTransport, address: u8) -> Self {
        Mcp23017 {
            device: I2cDevice::new(bus, address),
        }
    }

    /// Configure a pin's direction. The expander's polarity is inverted
    /// against intuition: a set direction bit marks the pin as an input.
    pub fn config_pin(&self, pin: u8, direction: PinDirection) -> Result<(), ExpanderError> {
        let (reg_addr, internal_pin) = select_bank(pin, REG_IODIR_A, REG_IODIR_B)?;

        let mut value = self.device.read_byte(reg_addr)?;
        match direction {
            PinDirection::In => value |= 1 << internal_pin,
            PinDirection::Out => value &= !(1 << internal_pin),
        }
        self.device.write_byte(reg_addr, value)?;

        debug!(
            "mcp23017 {:#04x}: direction register {:#04x} is now {:08b}",
            self.device.address(),
            reg_addr,
            value
        );
        Ok(())
    }

    pub fn set_pin(&self, pin: u8, pin_value: PinValue) -> Result<(), ExpanderError> {
        let (reg_addr, internal_pin) = select_bank(pin, REG_OLAT_A, REG_OLAT_B)?;

        // read first so the other pins on this register keep their state
        let mut value = self.device.read_byte(reg_addr)?;
        match pin_value {
            PinValue::On => value |= 1 << internal_pin,
            PinValue::Off => value &= !(1 << internal_pin),
        }
        self.device.write_byte(reg_addr, value)?;

        debug!(
            "mcp23017 {:#04x}: latch register {:#04x} is now {:08b}",
            self.device.address(),
            reg_addr,
            value
        );
        Ok(())
    }

    pub fn get_pin(&self, pin: u8) -> Result<PinValue, ExpanderError> {
        let (reg_addr, internal_pin) = select_bank(pin, REG_GPIO_A, REG_GPIO_B)?;

        let value = self.device.read_byte(reg_addr)?;
        match value & (1 << internal_pin) != 0 {
            true => Ok(PinValue::On),
            false => Ok(PinValue::Off),
        }
    }
}
