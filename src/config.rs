use anyhow::{anyhow, Context, Result};
use modbus_dev_host::dev_t::MINOR_MASK;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DriverError;

/// Name used for the device region and as the node name prefix.
pub const DEVICE_NAME: &str = "modbus_dev";
/// Class the node is listed under, i.e. `/sys/class/modbus_class/modbus_dev0`.
pub const CLASS_NAME: &str = "modbus_class";
/// Exactly one minor number is ever allocated.
pub const MINOR_COUNT: u32 = 1;
/// Largest Modbus RTU application data unit.
pub const DEFAULT_RX_BUFFER_CAPACITY: usize = 256;

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Region name and node name prefix
    pub device_name: String,
    /// Device class name
    pub class_name: String,
    /// First minor number requested from the host
    pub first_minor: u32,
    /// Bytes reserved for each open instance's receive buffer
    pub rx_buffer_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            class_name: CLASS_NAME.to_string(),
            first_minor: 0,
            rx_buffer_capacity: DEFAULT_RX_BUFFER_CAPACITY,
        }
    }
}

impl DriverConfig {
    /// Parse configuration from a TOML string. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DriverConfig =
            toml::from_str(content).context("Failed to parse driver configuration")?;
        config
            .validate()
            .map_err(|err| anyhow!("Invalid driver configuration: {err}"))?;
        Ok(config)
    }

    /// Read configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize driver configuration")
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        fn valid_name(name: &str) -> bool {
            !name.is_empty() && !name.contains('/') && !name.contains(char::is_whitespace)
        }

        if !valid_name(&self.device_name) {
            return Err(DriverError::InvalidConfig {
                reason: "device_name must be a non-empty path component",
            });
        }
        if !valid_name(&self.class_name) {
            return Err(DriverError::InvalidConfig {
                reason: "class_name must be a non-empty path component",
            });
        }
        if u64::from(self.first_minor) + u64::from(MINOR_COUNT) > u64::from(MINOR_MASK) + 1 {
            return Err(DriverError::InvalidConfig {
                reason: "first_minor does not fit in a device number",
            });
        }
        Ok(())
    }

    /// Node name for a given minor: `<device_name><minor>`.
    pub fn node_name(&self, minor: u32) -> String {
        format!("{}{}", self.device_name, minor)
    }
}
