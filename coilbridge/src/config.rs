//! Configuration for the coilbridge.
//!
//! The file carries process-wide sections (`zenoh`, `logging`, `runtime`)
//! and a `devices` mapping keyed by device name. Device entries stay raw
//! until [`DeviceEntry::load`] decodes the one selected by `runtime.name`:
//! a malformed entry disables that device without failing process startup.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use coilbridge_common::{KEY_PREFIX, LoggingConfig, ZenohConfig};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),

    #[error("Device '{0}' not present in configuration")]
    UnknownDevice(String),

    #[error("Invalid device entry: {0}")]
    Device(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Process runtime parameters.
    pub runtime: RuntimeConfig,

    /// Device entries keyed by device name, decoded on demand.
    #[serde(default)]
    pub devices: HashMap<String, serde_json::Value>,
}

impl BridgeConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: BridgeConfig = json5::from_str(&content)?;
        Ok(config)
    }
}

/// Process runtime parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name of the device entry to load.
    pub name: String,

    /// Key expression prefix (default: "coilbridge").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Node-level timeout in seconds. Declared for compatibility with the
    /// deployed parameter files; the device link uses its own fixed
    /// connect timeout and never consults this value.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Command channel capacity.
    #[serde(default = "default_sub_queue_size")]
    pub sub_queue_size: usize,

    /// Declared for compatibility with the deployed parameter files;
    /// report publishing has no queue on the bridge side.
    #[serde(default = "default_pub_queue_size")]
    pub pub_queue_size: usize,

    /// Enable verbose device session tracing.
    #[serde(default)]
    pub debug: bool,
}

fn default_key_prefix() -> String {
    KEY_PREFIX.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_sub_queue_size() -> usize {
    10
}

fn default_pub_queue_size() -> usize {
    1
}

/// Configuration entry for a single Modbus TCP device.
///
/// `input` and `output` are nested `type -> name -> address` mappings, e.g.
///
/// ```json5
/// input:  { digital: { conveyor_running: 0 } },
/// output: { digital: { conveyor_start: 4 } },
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceEntry {
    /// Host address (IP or hostname).
    pub address: String,

    /// TCP port.
    pub port: u16,

    /// Poll rate in Hz; the poll period is its inverse.
    pub publish_frequency: f64,

    /// Declared but not consulted by the dispatch paths.
    #[serde(default)]
    pub publish_on_timer: bool,

    /// Declared but not consulted by the dispatch paths.
    #[serde(default)]
    pub publish_on_event: bool,

    /// Enable verbose session tracing for this device.
    #[serde(default)]
    pub debug: bool,

    /// Input points: type -> name -> address.
    pub input: BTreeMap<String, BTreeMap<String, u16>>,

    /// Output points: type -> name -> address.
    pub output: BTreeMap<String, BTreeMap<String, u16>>,
}

impl DeviceEntry {
    /// Decode and validate the named device entry.
    ///
    /// Any missing required key, undecodable field, or failed validation
    /// rejects the entry as a whole; no partial entry is produced.
    pub fn load(config: &BridgeConfig, name: &str) -> Result<Self, ConfigError> {
        let raw = config
            .devices
            .get(name)
            .ok_or_else(|| ConfigError::UnknownDevice(name.to_string()))?;

        let entry: DeviceEntry = serde_json::from_value(raw.clone())?;
        entry.validate(name)?;

        Ok(entry)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Device '{}': address cannot be empty",
                name
            )));
        }

        if !self.publish_frequency.is_finite() || self.publish_frequency <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "Device '{}': publish_frequency must be > 0 (got {})",
                name, self.publish_frequency
            )));
        }

        Ok(())
    }

    /// Poll period derived from `publish_frequency`.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.publish_frequency)
    }
}
