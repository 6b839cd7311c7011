//! Coilbridge Common Library
//!
//! Shared types and utilities for the coilbridge device bridge:
//!
//! - [`message`] - Command/report message model and payload encoding
//! - [`config`] - Zenoh and logging configuration, JSON5 loading
//! - [`bus`] - Zenoh session establishment and key expression layout
//! - [`error`] - Error types

pub mod bus;
pub mod config;
pub mod error;
pub mod message;

// Re-export commonly used types at the crate root
pub use bus::{KEY_PREFIX, command_key, connect, report_key, status_key};
pub use config::{LogFormat, LoggingConfig, ZenohConfig, load_config, parse_config};
pub use error::{Error, Result};
pub use message::{Command, Format, PointValue, Report, decode, decode_auto, encode};

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
