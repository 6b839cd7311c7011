//! Device link: a thin session wrapper around one Modbus TCP connection.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;

/// Fixed connect timeout for the device session.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Error type for device link operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Link is not open")]
    NotOpen,

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Write failed: {0}")]
    Write(String),
}

/// The transport seam between the dispatcher and the device.
///
/// One implementation talks Modbus TCP; tests substitute a recording
/// mock. Every operation is a single attempt; retry policy is the
/// caller's concern and the caller has none.
#[async_trait]
pub trait CoilLink {
    /// Establish the TCP session. Idempotent if already open.
    async fn open(&mut self) -> Result<(), LinkError>;

    /// Whether a session is currently established.
    fn is_open(&self) -> bool;

    /// Read `count` coils starting at `start`.
    async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>, LinkError>;

    /// Write a single coil.
    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), LinkError>;

    /// Tear down the session, if any.
    async fn close(&mut self);
}

/// A Modbus TCP device link bound to one (host, port).
pub struct TcpLink {
    host: String,
    port: u16,
    ctx: Option<Context>,
}

impl TcpLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ctx: None,
        }
    }
}

#[async_trait]
impl CoilLink for TcpLink {
    async fn open(&mut self) -> Result<(), LinkError> {
        if self.ctx.is_some() {
            return Ok(());
        }

        let addr: SocketAddr = format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| LinkError::Connection(format!("Invalid address: {}", e)))?;

        let ctx = tokio::time::timeout(CONNECT_TIMEOUT, tcp::connect(addr))
            .await
            .map_err(|_| LinkError::Connection("Connection timeout".to_string()))?
            .map_err(|e| LinkError::Connection(e.to_string()))?;

        self.ctx = Some(ctx);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.ctx.is_some()
    }

    async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>, LinkError> {
        let ctx = self.ctx.as_mut().ok_or(LinkError::NotOpen)?;

        let coils = ctx
            .read_coils(start, count)
            .await
            .map_err(|e| LinkError::Read(e.to_string()))?
            .map_err(|e| LinkError::Read(format!("Exception: {:?}", e)))?;

        Ok(coils)
    }

    async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), LinkError> {
        let ctx = self.ctx.as_mut().ok_or(LinkError::NotOpen)?;

        ctx.write_single_coil(address, value)
            .await
            .map_err(|e| LinkError::Write(e.to_string()))?
            .map_err(|e| LinkError::Write(format!("Exception: {:?}", e)))?;

        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = ctx.disconnect().await;
        }
    }
}
