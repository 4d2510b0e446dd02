use crate::i2c::{I2cError, RegisterTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Default)]
struct FakeState {
    registers: HashMap<(u8, u8), u8>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory register map standing in for a hardware bus. Burst reads walk
/// consecutive register addresses, like an auto-incrementing peripheral.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preset(&self, device_addr: u8, reg_addr: u8, value: u8) {
        self.state
            .lock()
            .registers
            .insert((device_addr, reg_addr), value);
    }

    pub fn preset_block(&self, device_addr: u8, start_reg: u8, values: &[u8]) {
        let mut state = self.state.lock();
        for (offset, value) in values.iter().enumerate() {
            state
                .registers
                .insert((device_addr, start_reg + offset as u8), *value);
        }
    }

    pub fn register(&self, device_addr: u8, reg_addr: u8) -> u8 {
        self.state
            .lock()
            .registers
            .get(&(device_addr, reg_addr))
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl RegisterTransport for FakeTransport {
    fn read_byte(&self, device_addr: u8, reg_addr: u8) -> Result<u8, I2cError> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(I2cError::HardwareError("injected read failure".to_string()));
        }

        Ok(state
            .registers
            .get(&(device_addr, reg_addr))
            .copied()
            .unwrap_or(0))
    }

    fn read_bytes(&self, device_addr: u8, reg_addr: u8, buf: &mut [u8]) -> Result<(), I2cError> {
        let state = self.state.lock();
        if state.fail_reads {
            return Err(I2cError::HardwareError("injected read failure".to_string()));
        }

        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = state
                .registers
                .get(&(device_addr, reg_addr + offset as u8))
                .copied()
                .unwrap_or(0);
        }
        Ok(())
    }

    fn write_byte(&self, device_addr: u8, reg_addr: u8, value: u8) -> Result<(), I2cError> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(I2cError::HardwareError(
                "injected write failure".to_string(),
            ));
        }

        state.registers.insert((device_addr, reg_addr), value);
        Ok(())
    }
}

/// Create a scratch file in the system temp directory. Callers clean up with
/// [`fs::remove_file`] where it matters; leaked files land in tmpfs.
pub fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("gpiohelper-test-{}-{}", std::process::id(), name));
    fs::write(&path, contents).unwrap();
    path
}
