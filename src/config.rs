use log::warn;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Display;
use std::fs;
use std::path::Path;

#[derive(Debug, PartialEq)]
pub enum ConfigError {
    SerializeError(String),
    InvalidEntry(String),
    IoError(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&match self {
            ConfigError::SerializeError(msg) => format!("serialize/parse error: {}", msg),
            ConfigError::InvalidEntry(msg) => format!("invalid config entry: {}", msg),
            ConfigError::IoError(msg) => format!("config I/O error: {}", msg),
        })
    }
}

impl Error for ConfigError {}

/// Settings for the console sampler. The core objects take their parameters
/// directly; this struct only feeds the demo binary.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct SamplerConfig {
    pub i2c_bus: String,
    pub sensor_address: u8,
    pub sample_interval_ms: u64,
    pub upside_down_mounting: bool,
    pub fusion_enabled: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
            sensor_address: 0x69,
            sample_interval_ms: 500,
            upside_down_mounting: false,
            fusion_enabled: true,
        }
    }
}

impl SamplerConfig {
    /// Load from a JSON file. A missing file is not an error: the default
    /// config is written there so there is something to edit.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            let text = serde_json::to_string_pretty(&config)
                .map_err(|err| ConfigError::SerializeError(err.to_string()))?;
            if let Err(err) = fs::write(path, text) {
                warn!("failed to write default configuration: {}", err);
            }
            return Ok(config);
        }

        let text = fs::read_to_string(path)
            .map_err(|err| ConfigError::IoError(format!("{}: {}", path.display(), err)))?;
        let config: SamplerConfig = serde_json::from_str(&text)
            .map_err(|err| ConfigError::SerializeError(format!("invalid config json: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.i2c_bus.trim().is_empty() {
            return Err(ConfigError::InvalidEntry(
                "i2c_bus cannot be empty".to_string(),
            ));
        }

        if self.sensor_address > 0x7F {
            return Err(ConfigError::InvalidEntry(format!(
                "sensor address {:#04x} is not a valid 7-bit address",
                self.sensor_address
            )));
        }

        if self.sample_interval_ms == 0 {
            return Err(ConfigError::InvalidEntry(
                "sample_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
