use i2c_linux::{I2c, Message, ReadFlags, WriteFlags};
use log::error;
use parking_lot::Mutex;
use std::error::Error;
use std::fmt::Display;
use std::fs::File;
use std::path::Path;

#[derive(Debug, PartialEq)]
pub enum I2cError {
    DeviceUnavailable(String),
    HardwareError(String),
}

impl Display for I2cError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            I2cError::DeviceUnavailable(msg) => format!("I2C bus unavailable: {}", msg),
            I2cError::HardwareError(msg) => format!("I2C transaction failed: {}", msg),
        })
    }
}

impl Error for I2cError {}

/// Right shift aligning the field whose most-significant bit is
/// `bit_start` (datasheet numbering, 7 is the MSB of the register).
/// Valid fields satisfy `1 <= length <= bit_start + 1 <= 8`.
pub(crate) fn field_shift(bit_start: u8, length: u8) -> u8 {
    debug_assert!(
        bit_start <= 7 && length >= 1 && length <= bit_start + 1,
        "invalid bit-field (start {}, length {})",
        bit_start,
        length
    );
    bit_start + 1 - length
}

/// Mask selecting the field whose most-significant bit is `bit_start`.
pub(crate) fn field_mask(bit_start: u8, length: u8) -> u8 {
    (((1u16 << length) - 1) as u8) << field_shift(bit_start, length)
}

/// Byte-level register access to an addressable peripheral, plus the
/// bit-field protocol shared by every implementation.
///
/// Bit-fields are addressed by their most-significant bit and length, so a
/// read of `(bit_start: 6, length: 6)` returns bits 6..=1 right-aligned.
/// This matches the numbering used in hardware datasheets bit-for-bit.
pub trait RegisterTransport {
    fn read_byte(&self, device_addr: u8, reg_addr: u8) -> Result<u8, I2cError>;
    fn read_bytes(&self, device_addr: u8, reg_addr: u8, buf: &mut [u8]) -> Result<(), I2cError>;
    fn write_byte(&self, device_addr: u8, reg_addr: u8, value: u8) -> Result<(), I2cError>;

    /// Read a right-aligned bit-field (e.g. the field `101` read from any
    /// start position yields `0x05`).
    fn read_bits(
        &self,
        device_addr: u8,
        reg_addr: u8,
        bit_start: u8,
        length: u8,
    ) -> Result<u8, I2cError> {
        let current = self.read_byte(device_addr, reg_addr)?;
        let shift = field_shift(bit_start, length);
        Ok((current & field_mask(bit_start, length)) >> shift)
    }

    /// Write a bit-field, preserving every bit of the register outside the
    /// field (read-modify-write).
    fn write_bits(
        &self,
        device_addr: u8,
        reg_addr: u8,
        bit_start: u8,
        length: u8,
        value: u8,
    ) -> Result<(), I2cError> {
        let current = self.read_byte(device_addr, reg_addr)?;
        let shift = field_shift(bit_start, length);
        let mask = field_mask(bit_start, length);
        let value = (value << shift) & mask;
        self.write_byte(device_addr, reg_addr, (current & !mask) | value)
    }

    fn write_bit(
        &self,
        device_addr: u8,
        reg_addr: u8,
        bit_num: u8,
        value: bool,
    ) -> Result<(), I2cError> {
        let current = self.read_byte(device_addr, reg_addr)?;
        let updated = match value {
            true => current | (1 << bit_num),
            false => current & !(1 << bit_num),
        };
        self.write_byte(device_addr, reg_addr, updated)
    }
}

/// One open I2C bus character device.
///
/// All register operations go through the kernel's multi-message transfer
/// facility, so the register-address write and the data read of a single
/// call happen as one atomic transaction. A process-internal mutex
/// serializes concurrent callers; the bus may be shared across threads.
pub struct I2cBus {
    path: String,
    handle: Mutex<I2c<File>>,
}

impl I2cBus {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, I2cError> {
        let path = path.as_ref();
        let handle = I2c::from_path(path).map_err(|err| {
            error!("failed to open I2C bus {}: {}", path.display(), err);
            I2cError::DeviceUnavailable(format!("{}: {}", path.display(), err))
        })?;

        Ok(I2cBus {
            path: path.display().to_string(),
            handle: Mutex::new(handle),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl RegisterTransport for I2cBus {
    fn read_byte(&self, device_addr: u8, reg_addr: u8) -> Result<u8, I2cError> {
        let mut buf = [0u8; 1];
        self.read_bytes(device_addr, reg_addr, &mut buf)?;
        Ok(buf[0])
    }

    fn read_bytes(&self, device_addr: u8, reg_addr: u8, buf: &mut [u8]) -> Result<(), I2cError> {
        let out = [reg_addr];
        let mut messages = [
            Message::Write {
                address: device_addr as u16,
                data: &out,
                flags: WriteFlags::default(),
            },
            Message::Read {
                address: device_addr as u16,
                data: buf,
                flags: ReadFlags::default(),
            },
        ];

        // the lock is held only for the duration of the transfer itself
        let result = self.handle.lock().i2c_transfer(&mut messages);
        result.map_err(|err| {
            error!(
                "read from I2C device failed (bus {}, device {:#04x}, register {:#04x}): {}",
                self.path, device_addr, reg_addr, err
            );
            I2cError::HardwareError(format!(
                "read of device {:#04x} register {:#04x}: {}",
                device_addr, reg_addr, err
            ))
        })
    }

    fn write_byte(&self, device_addr: u8, reg_addr: u8, value: u8) -> Result<(), I2cError> {
        let out = [reg_addr, value];
        let mut messages = [Message::Write {
            address: device_addr as u16,
            data: &out,
            flags: WriteFlags::default(),
        }];

        let result = self.handle.lock().i2c_transfer(&mut messages);
        result.map_err(|err| {
            error!(
                "write to I2C device failed (bus {}, device {:#04x}, register {:#04x}): {}",
                self.path, device_addr, reg_addr, err
            );
            I2cError::HardwareError(format!(
                "write of device {:#04x} register {:#04x}: {}",
                device_addr, reg_addr, err
            ))
        })
    }
}

/// A logical peripheral on a shared bus: a transport reference scoped to one
/// 7-bit device address. Every call forwards to the transport.
///
/// The device borrows its transport, so it cannot outlive the bus handle.
pub struct I2cDevice<'a> {
    bus: &'a dyn RegisterTransport,
    address: u8,
}

impl<'a> I2cDevice<'a> {
    pub fn new(bus: &'a dyn RegisterTransport, address: u8) -> Self {
        I2cDevice { bus, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn read_byte(&self, reg_addr: u8) -> Result<u8, I2cError> {
        self.bus.read_byte(self.address, reg_addr)
    }

    pub fn read_bytes(&self, reg_addr: u8, buf: &mut [u8]) -> Result<(), I2cError> {
        self.bus.read_bytes(self.address, reg_addr, buf)
    }

    pub fn read_bits(&self, reg_addr: u8, bit_start: u8, length: u8) -> Result<u8, I2cError> {
        self.bus.read_bits(self.address, reg_addr, bit_start, length)
    }

    pub fn write_byte(&self, reg_addr: u8, value: u8) -> Result<(), I2cError> {
        self.bus.write_byte(self.address, reg_addr, value)
    }

    pub fn write_bits(
        &self,
        reg_addr: u8,
        bit_start: u8,
        length: u8,
        value: u8,
    ) -> Result<(), I2cError> {
        self.bus
            .write_bits(self.address, reg_addr, bit_start, length, value)
    }

    pub fn write_bit(&self, reg_addr: u8, bit_num: u8, value: bool) -> Result<(), I2cError> {
        self.bus.write_bit(self.address, reg_addr, bit_num, value)
    }
}
