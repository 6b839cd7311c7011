//! Zenoh command/report bridge for a Modbus TCP field device.
//!
//! The bridge loads one named device entry from configuration, builds an
//! I/O table binding symbolic point names to Modbus addresses, and drives
//! two dispatch paths against the device:
//!
//! - a timer-driven poll that reads a fixed coil window and reports it,
//! - a command-driven path that writes named output coils.
//!
//! # Key Expressions
//!
//! ```text
//! coilbridge/<device>/command   - inbound coil write commands
//! coilbridge/<device>/report    - outbound polled device state
//! coilbridge/@/status           - bridge lifecycle status
//! ```

pub mod config;
pub mod dispatch;
pub mod link;
pub mod points;
