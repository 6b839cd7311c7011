//! Zenoh session establishment and key expression layout.
//!
//! Key expressions follow the pattern:
//!
//! ```text
//! <prefix>/<device>/command   - inbound coil write commands
//! <prefix>/<device>/report    - outbound polled device state
//! <prefix>/@/status           - bridge lifecycle status
//! ```
//!
//! The `@` segment marks the administrative channel.

use zenoh::Session;

use crate::config::ZenohConfig;
use crate::error::{Error, Result};

/// Default key expression prefix.
pub const KEY_PREFIX: &str = "coilbridge";

/// Key expression carrying commands for a device.
pub fn command_key(prefix: &str, device: &str) -> String {
    format!("{}/{}/command", prefix, device)
}

/// Key expression carrying reports from a device.
pub fn report_key(prefix: &str, device: &str) -> String {
    format!("{}/{}/report", prefix, device)
}

/// Key expression for bridge status.
pub fn status_key(prefix: &str) -> String {
    format!("{}/@/status", prefix)
}

/// Connect to Zenoh using the provided configuration.
pub async fn connect(config: &ZenohConfig) -> Result<Session> {
    let mut zenoh_config = zenoh::Config::default();

    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(Error::Config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| Error::Config(format!("Failed to set mode: {}", e)))?;

    if !config.connect.is_empty() {
        let endpoints_json = serde_json::to_string(&config.connect)?;
        zenoh_config
            .insert_json5("connect/endpoints", &endpoints_json)
            .map_err(|e| Error::Config(format!("Failed to set connect endpoints: {}", e)))?;
    }

    if !config.listen.is_empty() {
        let endpoints_json = serde_json::to_string(&config.listen)?;
        zenoh_config
            .insert_json5("listen/endpoints", &endpoints_json)
            .map_err(|e| Error::Config(format!("Failed to set listen endpoints: {}", e)))?;
    }

    tracing::info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    tracing::info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}
