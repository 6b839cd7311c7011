//! Zenoh command/report bridge for a Modbus TCP field device.
//!
//! Loads one named device entry from configuration, subscribes to the
//! device command key, and runs the dispatcher until shutdown.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use coilbridge::config::{BridgeConfig, DeviceEntry};
use coilbridge::dispatch::Dispatcher;
use coilbridge::link::TcpLink;
use coilbridge::points::IoTable;
use coilbridge_common::message::{Command, Format, decode_auto};
use coilbridge_common::{LoggingConfig, command_key, report_key, status_key};

/// Zenoh command/report bridge for a Modbus TCP field device.
#[derive(Parser, Debug)]
#[command(name = "coilbridge")]
#[command(about = "Bridges Zenoh commands and reports to a Modbus TCP device")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "coilbridge.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = BridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    // Initialize logging
    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    coilbridge_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting coilbridge");
    info!("Loaded configuration from {:?}", args.config);

    // Connect to Zenoh
    let session = coilbridge_common::connect(&config.zenoh)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to Zenoh: {}", e))?;

    let device = config.runtime.name.clone();
    let prefix = config.runtime.key_prefix.clone();

    // Decode the selected device entry. A rejected entry disables the
    // device for the process lifetime but keeps the bridge running.
    let dispatcher = match DeviceEntry::load(&config, &device) {
        Ok(entry) => {
            let table = IoTable::build(&entry);
            info!(
                device = %device,
                address = %entry.address,
                port = entry.port,
                "Configured device"
            );
            info!(device = %device, points = ?table.names(), "Configured I/O points");

            let link = TcpLink::new(entry.address.clone(), entry.port);
            Dispatcher::ready(
                device.as_str(),
                entry.debug || config.runtime.debug,
                entry.period(),
                table,
                link,
            )
        }
        Err(e) => {
            error!(device = %device, error = %e, "Device configuration not valid");
            Dispatcher::unconfigured(device.as_str())
        }
    };

    // Forward inbound command payloads to the dispatcher task
    let (tx, rx) = mpsc::channel::<Command>(config.runtime.sub_queue_size);
    let cmd_key = command_key(&prefix, &device);
    let subscriber = session
        .declare_subscriber(&cmd_key)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to subscribe to '{}': {}", cmd_key, e))?;

    info!(key = %cmd_key, "Listening for commands");

    tokio::spawn(async move {
        while let Ok(sample) = subscriber.recv_async().await {
            let payload = sample.payload().to_bytes();
            match decode_auto::<Command>(&payload) {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Undecodable command payload, dropping"),
            }
        }
    });

    let dispatch_task = tokio::spawn(dispatcher.run(
        session.clone(),
        report_key(&prefix, &device),
        Format::Json,
        rx,
    ));

    // Publish bridge status
    let status_key = status_key(&prefix);
    let status = serde_json::json!({
        "bridge": "coilbridge",
        "version": env!("CARGO_PKG_VERSION"),
        "device": device,
        "status": "running"
    });

    if let Err(e) = session.put(&status_key, status.to_string()).await {
        error!("Failed to publish bridge status: {}", e);
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    dispatch_task.abort();

    // Publish offline status
    let status = serde_json::json!({
        "bridge": "coilbridge",
        "status": "offline"
    });
    let _ = session.put(&status_key, status.to_string()).await;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Coilbridge stopped");

    Ok(())
}
