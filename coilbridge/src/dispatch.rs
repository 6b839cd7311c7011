//! The dispatcher: consumes the I/O table and the device link on two
//! independent triggers, a periodic poll and inbound commands. Both run
//! on one single-owner task, so link access is serialized by
//! construction.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use zenoh::Session;

use coilbridge_common::message::{Command, Format, PointValue, Report, encode};

use crate::link::CoilLink;
use crate::points::{Direction, IoTable, PointKind};

/// Start of the fixed coil window polled every tick.
pub const POLL_WINDOW_START: u16 = 0;

/// Size of the fixed coil window polled every tick. The window is not
/// derived from the I/O table; every tick re-reads the same raw range.
pub const POLL_WINDOW_COUNT: u16 = 16;

/// Poll period used while the device has no valid configuration.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Configuration outcome for a device, fixed for the process lifetime.
///
/// An invalid device entry leaves the dispatcher `Unconfigured`: every
/// dispatch entry point matches on this state and degrades to a warning.
pub enum DeviceState<L> {
    Unconfigured,
    Ready { table: IoTable, link: L },
}

/// Drives the poll/publish and command/write paths for one device.
pub struct Dispatcher<L> {
    device: String,
    debug: bool,
    period: Duration,
    state: DeviceState<L>,
}

impl<L> Dispatcher<L> {
    /// Dispatcher for a device whose configuration was rejected. The
    /// poll timer still runs so the condition stays visible in the logs.
    pub fn unconfigured(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            debug: false,
            period: DEFAULT_POLL_PERIOD,
            state: DeviceState::Unconfigured,
        }
    }

    /// Dispatcher for a configured device.
    pub fn ready(
        device: impl Into<String>,
        debug: bool,
        period: Duration,
        table: IoTable,
        link: L,
    ) -> Self {
        Self {
            device: device.into(),
            debug,
            period,
            state: DeviceState::Ready { table, link },
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, DeviceState::Ready { .. })
    }

    pub fn state(&self) -> &DeviceState<L> {
        &self.state
    }
}

impl<L: CoilLink + Send> Dispatcher<L> {
    /// One poll cycle: open, read the fixed coil window, close.
    ///
    /// The close is issued whether or not the read succeeded. Returns the
    /// report built from the window, or `None` when the device is
    /// unconfigured or the read failed.
    pub async fn poll_tick(&mut self) -> Option<Report> {
        let (table, link) = match &mut self.state {
            DeviceState::Unconfigured => {
                warn!(
                    device = %self.device,
                    "Current config not valid, waiting for new parameters"
                );
                return None;
            }
            DeviceState::Ready { table, link } => (table, link),
        };

        if let Err(e) = link.open().await {
            warn!(device = %self.device, error = %e, "Device link open failed");
        }

        if self.debug {
            debug!(
                device = %self.device,
                open = link.is_open(),
                "Polling coil window"
            );
        }

        let report = match link.read_coils(POLL_WINDOW_START, POLL_WINDOW_COUNT).await {
            Ok(window) => {
                for (index, value) in window.iter().copied().enumerate() {
                    debug!(device = %self.device, index, value, "Coil state");
                }
                Some(build_report(&self.device, table, &window))
            }
            Err(e) => {
                warn!(device = %self.device, error = %e, "Coil window read failed");
                None
            }
        };

        link.close().await;

        report
    }

    /// Apply one inbound command, pair by pair.
    ///
    /// Each `(coil, value)` pair is validated and written independently;
    /// a failing pair is logged and never aborts the rest of the batch.
    pub async fn handle_command(&mut self, command: &Command) {
        let (table, link) = match &mut self.state {
            DeviceState::Unconfigured => {
                warn!(
                    device = %self.device,
                    "Current config not valid, dropping command"
                );
                return;
            }
            DeviceState::Ready { table, link } => (table, link),
        };

        if !command.is_balanced() {
            warn!(
                device = %self.device,
                coils = command.coils.len(),
                values = command.values.len(),
                "Command arrays have mismatched lengths, extra entries ignored"
            );
        }

        for (coil, value) in command.pairs() {
            let Some(point) = table.get(coil) else {
                warn!(device = %self.device, coil, "Coil not declared, skipping");
                continue;
            };

            if point.direction != Direction::Output {
                warn!(device = %self.device, coil, "Coil is not set as output, skipping");
                continue;
            }

            match &point.kind {
                PointKind::Digital => {
                    let bit = value.truthy();
                    if let Err(e) = link.open().await {
                        warn!(device = %self.device, coil, error = %e, "Device link open failed");
                    }
                    if let Err(e) = link.write_single_coil(point.address, bit).await {
                        error!(
                            device = %self.device,
                            coil,
                            value = bit,
                            raw = %value,
                            error = %e,
                            "Failed to set coil, skipping"
                        );
                    }
                }
                PointKind::Analog => {
                    // TODO: route analog points through write_single_register
                    // once the device map distinguishes register addresses
                    if let Err(e) = link.open().await {
                        warn!(device = %self.device, coil, error = %e, "Device link open failed");
                    }
                    if let Err(e) = link.write_single_coil(point.address, value.truthy()).await {
                        error!(
                            device = %self.device,
                            coil,
                            value = %value,
                            error = %e,
                            "Failed to set coil, skipping"
                        );
                    }
                }
                PointKind::Other(label) => {
                    warn!(
                        device = %self.device,
                        coil,
                        kind = %label,
                        "Unsupported output type, skipping"
                    );
                }
            }
        }
    }

    /// Run both dispatch paths on one task until the command channel
    /// closes. Every failure is logged here and goes no further.
    pub async fn run(
        mut self,
        session: Session,
        report_key: String,
        format: Format,
        mut commands: mpsc::Receiver<Command>,
    ) {
        info!(
            device = %self.device,
            period = ?self.period,
            configured = self.is_configured(),
            "Starting dispatcher"
        );

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(report) = self.poll_tick().await {
                        match encode(&report, format) {
                            Ok(payload) => {
                                if let Err(e) = session.put(&report_key, payload).await {
                                    warn!(device = %self.device, error = %e, "Failed to publish report");
                                }
                            }
                            Err(e) => {
                                warn!(device = %self.device, error = %e, "Failed to encode report");
                            }
                        }
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(&command).await,
                    None => break,
                },
            }
        }

        info!(device = %self.device, "Dispatcher stopped");
    }
}

/// Build a report from the polled window, keyed by the declared digital
/// input points whose address falls inside it.
pub fn build_report(device: &str, table: &IoTable, window: &[bool]) -> Report {
    let mut coils = Vec::new();
    let mut values = Vec::new();

    for (name, point) in table.iter() {
        if point.direction != Direction::Input || point.kind != PointKind::Digital {
            continue;
        }
        if let Some(state) = window.get(point.address as usize) {
            coils.push(name.clone());
            values.push(PointValue::Bool(*state));
        }
    }

    Report {
        timestamp: Utc::now().timestamp_millis(),
        device: device.to_string(),
        coils,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEntry;
    use crate::link::LinkError;
    use async_trait::async_trait;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Open,
        Read(u16, u16),
        Write(u16, bool),
        Close,
    }

    #[derive(Default)]
    struct MockLink {
        calls: Vec<Call>,
        open: bool,
        fail_read: bool,
        fail_writes: Vec<u16>,
    }

    #[async_trait]
    impl CoilLink for MockLink {
        async fn open(&mut self) -> Result<(), LinkError> {
            self.calls.push(Call::Open);
            self.open = true;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        async fn read_coils(&mut self, start: u16, count: u16) -> Result<Vec<bool>, LinkError> {
            self.calls.push(Call::Read(start, count));
            if self.fail_read {
                return Err(LinkError::Read("read refused".to_string()));
            }
            // only coil 0 is energized
            Ok((0..count).map(|i| i == 0).collect())
        }

        async fn write_single_coil(&mut self, address: u16, value: bool) -> Result<(), LinkError> {
            self.calls.push(Call::Write(address, value));
            if self.fail_writes.contains(&address) {
                return Err(LinkError::Write("write refused".to_string()));
            }
            Ok(())
        }

        async fn close(&mut self) {
            self.calls.push(Call::Close);
            self.open = false;
        }
    }

    fn table() -> IoTable {
        let entry: DeviceEntry = serde_json::from_str(
            r#"{
                "address": "192.168.1.10",
                "port": 502,
                "publish_frequency": 1.0,
                "input": {
                    "digital": {"running": 0, "fault": 2},
                    "analog": {"temperature": 5}
                },
                "output": {
                    "digital": {"start": 4, "stop": 3},
                    "analog": {"speed": 8},
                    "string_register": {"label": 9}
                }
            }"#,
        )
        .unwrap();
        IoTable::build(&entry)
    }

    fn dispatcher(link: MockLink) -> Dispatcher<MockLink> {
        Dispatcher::ready("automat1", false, Duration::from_secs(1), table(), link)
    }

    fn calls(dispatcher: &Dispatcher<MockLink>) -> &[Call] {
        match dispatcher.state() {
            DeviceState::Ready { link, .. } => &link.calls,
            DeviceState::Unconfigured => panic!("dispatcher is not ready"),
        }
    }

    fn command(pairs: &[(&str, i64)]) -> Command {
        Command {
            coils: pairs.iter().map(|(c, _)| c.to_string()).collect(),
            values: pairs.iter().map(|(_, v)| PointValue::Integer(*v)).collect(),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_poll_skips_device() {
        let mut dispatcher = Dispatcher::<MockLink>::unconfigured("automat1");
        assert!(!dispatcher.is_configured());
        assert!(dispatcher.poll_tick().await.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_command_is_dropped() {
        let mut dispatcher = Dispatcher::<MockLink>::unconfigured("automat1");
        dispatcher.handle_command(&command(&[("start", 1)])).await;
    }

    #[tokio::test]
    async fn test_poll_issues_open_read_close() {
        let mut dispatcher = dispatcher(MockLink::default());

        let report = dispatcher.poll_tick().await;

        assert!(report.is_some());
        assert_eq!(
            calls(&dispatcher),
            &[Call::Open, Call::Read(0, 16), Call::Close]
        );
    }

    #[tokio::test]
    async fn test_poll_closes_after_failed_read() {
        let mut dispatcher = dispatcher(MockLink {
            fail_read: true,
            ..Default::default()
        });

        let report = dispatcher.poll_tick().await;

        assert!(report.is_none());
        assert_eq!(
            calls(&dispatcher),
            &[Call::Open, Call::Read(0, 16), Call::Close]
        );
    }

    #[tokio::test]
    async fn test_poll_report_resolves_digital_inputs() {
        let mut dispatcher = dispatcher(MockLink::default());

        let report = dispatcher.poll_tick().await.unwrap();

        // digital inputs only, in name order; outputs and analog inputs
        // are absent from the coil window report
        assert_eq!(report.device, "automat1");
        assert_eq!(report.coils, vec!["fault", "running"]);
        assert_eq!(
            report.values,
            vec![PointValue::Bool(false), PointValue::Bool(true)]
        );
    }

    #[tokio::test]
    async fn test_report_skips_points_outside_window() {
        let entry: DeviceEntry = serde_json::from_str(
            r#"{
                "address": "192.168.1.10",
                "port": 502,
                "publish_frequency": 1.0,
                "input": {"digital": {"near": 1, "far": 40}},
                "output": {}
            }"#,
        )
        .unwrap();
        let table = IoTable::build(&entry);

        let report = build_report("automat1", &table, &vec![false; 16]);

        assert_eq!(report.coils, vec!["near"]);
    }

    #[tokio::test]
    async fn test_write_unknown_coil_touches_nothing() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("mystery", 1)])).await;

        assert!(calls(&dispatcher).is_empty());
    }

    #[tokio::test]
    async fn test_write_input_direction_touches_nothing() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("running", 1)])).await;

        assert!(calls(&dispatcher).is_empty());
    }

    #[tokio::test]
    async fn test_write_unsupported_kind_touches_nothing() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("label", 1)])).await;

        assert!(calls(&dispatcher).is_empty());
    }

    #[tokio::test]
    async fn test_digital_write_coerces_zero_to_false() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("start", 0)])).await;

        assert_eq!(calls(&dispatcher), &[Call::Open, Call::Write(4, false)]);
    }

    #[tokio::test]
    async fn test_digital_write_coerces_nonzero_to_true() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("start", 5)])).await;

        assert_eq!(calls(&dispatcher), &[Call::Open, Call::Write(4, true)]);
    }

    #[tokio::test]
    async fn test_analog_write_goes_through_coil_write() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher.handle_command(&command(&[("speed", 1)])).await;

        assert_eq!(calls(&dispatcher), &[Call::Open, Call::Write(8, true)]);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_abort_batch() {
        let mut dispatcher = dispatcher(MockLink {
            fail_writes: vec![3],
            ..Default::default()
        });

        dispatcher
            .handle_command(&command(&[("stop", 1), ("start", 1)]))
            .await;

        let writes: Vec<_> = calls(&dispatcher)
            .iter()
            .filter(|c| matches!(c, Call::Write(..)))
            .cloned()
            .collect();
        assert_eq!(writes, vec![Call::Write(3, true), Call::Write(4, true)]);
    }

    #[tokio::test]
    async fn test_duplicate_pairs_processed_in_order() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher
            .handle_command(&command(&[("start", 1), ("start", 0)]))
            .await;

        let writes: Vec<_> = calls(&dispatcher)
            .iter()
            .filter(|c| matches!(c, Call::Write(..)))
            .cloned()
            .collect();
        assert_eq!(writes, vec![Call::Write(4, true), Call::Write(4, false)]);
    }

    #[tokio::test]
    async fn test_mixed_batch_skips_invalid_pairs_only() {
        let mut dispatcher = dispatcher(MockLink::default());

        dispatcher
            .handle_command(&command(&[
                ("mystery", 1),
                ("running", 1),
                ("start", 1),
                ("label", 1),
            ]))
            .await;

        let writes: Vec<_> = calls(&dispatcher)
            .iter()
            .filter(|c| matches!(c, Call::Write(..)))
            .cloned()
            .collect();
        assert_eq!(writes, vec![Call::Write(4, true)]);
    }
}
