//! Discovery, connection, and polling loop
//!
//! Each cycle consumes at most one pending hotplug event, scans for devices,
//! picks a target (the mouse if present, otherwise the receiver), makes sure
//! a connection to it is open and identified, and polls it. The outcome is
//! reported to a [`StatusSink`] and decides the next [`Backoff`] state.
//!
//! All connection mutation happens on the loop's own thread. The hotplug
//! side only bumps the shared counter, and stopping only sets a flag and
//! rings the same doorbell the sleep waits on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use squeak_detect::{DeviceRegistry, HotplugEvents, PortCandidate, ScanResult};
use squeak_protocol::{PollStrategy, Role};
use tracing::{debug, info, warn};

use crate::backoff::{Backoff, BackoffConfig, BackoffState};
use crate::client::ProtocolClient;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::error::LinkError;
use crate::events::{StatusEvent, StatusSink};

/// Monitor loop configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub backoff: BackoffConfig,
    /// Longest single wait while sleeping, bounding stop latency
    pub sleep_tick_ms: u64,
}

impl MonitorConfig {
    pub fn sleep_tick(&self) -> Duration {
        Duration::from_millis(self.sleep_tick_ms.max(1))
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            sleep_tick_ms: 250,
        }
    }
}

/// Order scan results by preference: mouse first, then receiver
pub fn select_targets(scan: &ScanResult) -> Vec<PortCandidate> {
    [Role::Mouse, Role::Receiver]
        .into_iter()
        .filter_map(|role| {
            scan.port_for(role).map(|port| PortCandidate {
                role,
                port: port.to_string(),
            })
        })
        .collect()
}

/// Requests a running loop to stop
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
    doorbell: Arc<HotplugEvents>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.doorbell.ring();
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The monitor loop and its collaborators
pub struct MonitorLoop<S> {
    registry: DeviceRegistry,
    connection: Arc<ConnectionManager>,
    client: ProtocolClient,
    hotplug: Arc<HotplugEvents>,
    sink: S,
    backoff: Backoff,
    config: MonitorConfig,
    stop: StopHandle,
    /// Consecutive scans that found nothing to connect to
    idle_scans: u32,
}

impl<S: StatusSink> MonitorLoop<S> {
    pub fn new(
        registry: DeviceRegistry,
        connection: Arc<ConnectionManager>,
        client: ProtocolClient,
        hotplug: Arc<HotplugEvents>,
        sink: S,
        config: MonitorConfig,
    ) -> Self {
        let stop = StopHandle {
            flag: Arc::new(AtomicBool::new(false)),
            doorbell: hotplug.clone(),
        };
        Self {
            registry,
            connection,
            client,
            hotplug,
            sink,
            backoff: Backoff::new(config.backoff),
            config,
            stop,
            idle_scans: 0,
        }
    }

    /// Delay before the next cycle
    pub fn wait_time(&self) -> Duration {
        self.backoff.wait_time()
    }

    pub fn backoff_state(&self) -> BackoffState {
        self.backoff.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// Run one cycle without sleeping first; returns the reported event
    pub fn run_cycle(&mut self) -> StatusEvent {
        let after_hotplug = self.hotplug.take_one();
        if after_hotplug {
            info!("Device change detected, rescanning");
            if self.hotplug.take_suspect() {
                self.connection.require_probe();
            }
        }

        let targets = select_targets(&self.registry.scan());
        if targets.is_empty() {
            if self.connection.view().state != ConnectionState::Disconnected {
                info!("Connected device is no longer present");
                self.connection.disconnect();
            }
            self.idle_scans = self.idle_scans.saturating_add(1);
            debug!("No device found (scan {})", self.idle_scans);
            self.backoff.on_no_candidate(self.idle_scans == 1);
            return self.report_disconnected();
        }
        self.idle_scans = 0;

        if !self.ensure_connected(&targets) {
            self.backoff.on_failure();
            return self.report_disconnected();
        }

        if !self.connection.is_identified() {
            match self.client.probe(&self.connection) {
                Ok(Role::None) => {
                    debug!("Device has not announced its role yet");
                    self.backoff.on_unidentified();
                    return self.report_disconnected();
                }
                Ok(role) => info!("Identified {} on {}", role, self.port_label()),
                Err(e) => {
                    warn!("Probe failed: {}", e);
                    self.connection.disconnect();
                    self.backoff.on_failure();
                    return self.report_disconnected();
                }
            }
        }

        match self.client.poll(&self.connection) {
            Ok(snapshot) => {
                let view = self.connection.view();
                let records_history =
                    PollStrategy::for_role(view.role).is_some_and(|s| s.records_history());
                debug!(role = %view.role, "Status: {}", snapshot);
                self.backoff.on_success(after_hotplug);
                let event = StatusEvent::connected(
                    view.role,
                    view.port.unwrap_or_default(),
                    snapshot,
                    records_history,
                );
                self.sink.on_status(event.clone());
                event
            }
            Err(e) => {
                warn!("Poll failed: {}", e);
                self.connection.disconnect();
                self.backoff.on_failure();
                self.report_disconnected()
            }
        }
    }

    /// Cycle until stopped, sleeping `wait_time` between cycles
    pub fn run(&mut self) {
        info!("Monitor loop started");
        loop {
            self.sleep(self.wait_time());
            if self.stop.is_stopped() {
                break;
            }
            self.run_cycle();
        }
        self.connection.disconnect();
        info!("Monitor loop stopped");
    }

    /// Sleep up to `wait`, waking early for stop or a pending hotplug event
    fn sleep(&self, wait: Duration) {
        let deadline = Instant::now() + wait;
        let mut seen = self.hotplug.sequence();
        loop {
            if self.stop.is_stopped() || self.hotplug.pending() > 0 {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let remaining = (deadline - now).min(self.config.sleep_tick());
            seen = self.hotplug.wait_after(seen, remaining);
        }
    }

    /// Keep the current connection if it is the preferred target, otherwise
    /// connect to the first target that opens
    fn ensure_connected(&mut self, targets: &[PortCandidate]) -> bool {
        let view = self.connection.view();
        if view.is_connected() && view.port.as_deref() == Some(targets[0].port.as_str()) {
            return true;
        }

        if view.is_connected() {
            info!(
                "Switching from {} on {} to {}",
                view.role,
                view.port.as_deref().unwrap_or("?"),
                targets[0].role
            );
            self.connection.disconnect();
        }

        for target in targets {
            if self.stop.is_stopped() {
                return false;
            }
            match self.connection.connect(target.role, &target.port) {
                Ok(()) => return true,
                Err(LinkError::Busy) => {
                    debug!("Connect already in progress");
                    return false;
                }
                Err(e) => warn!(
                    "Could not connect to {} on {}: {}",
                    target.role, target.port, e
                ),
            }
        }
        false
    }

    fn port_label(&self) -> String {
        self.connection.port().unwrap_or_else(|| "?".into())
    }

    fn report_disconnected(&mut self) -> StatusEvent {
        let event = StatusEvent::disconnected(self.connection.snapshot());
        self.sink.on_status(event.clone());
        event
    }
}

impl<S: StatusSink + 'static> MonitorLoop<S> {
    /// Run the loop on its own thread
    pub fn spawn(mut self) -> Result<MonitorHandle, LinkError> {
        let stop = self.stop_handle();
        let thread = std::thread::Builder::new()
            .name("squeak-monitor".into())
            .spawn(move || self.run())?;
        Ok(MonitorHandle {
            stop,
            thread: Some(thread),
        })
    }
}

/// Handle to a monitor loop running on its own thread
pub struct MonitorHandle {
    stop: StopHandle,
    thread: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the loop to stop without waiting
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stop the loop and wait for its thread to exit
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Monitor thread panicked");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_prefers_mouse() {
        let scan = ScanResult {
            mouse: Some("COM5".into()),
            receiver: Some("COM7".into()),
        };
        let targets = select_targets(&scan);
        assert_eq!(
            targets,
            vec![
                PortCandidate {
                    role: Role::Mouse,
                    port: "COM5".into()
                },
                PortCandidate {
                    role: Role::Receiver,
                    port: "COM7".into()
                },
            ]
        );
    }

    #[test]
    fn test_select_receiver_only() {
        let scan = ScanResult {
            mouse: None,
            receiver: Some("/dev/ttyACM1".into()),
        };
        let targets = select_targets(&scan);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].role, Role::Receiver);
    }

    #[test]
    fn test_select_nothing() {
        assert!(select_targets(&ScanResult::default()).is_empty());
    }

    #[test]
    fn test_stop_handle_rings_doorbell() {
        let doorbell = Arc::new(HotplugEvents::new());
        let stop = StopHandle {
            flag: Arc::new(AtomicBool::new(false)),
            doorbell: doorbell.clone(),
        };
        let seen = doorbell.sequence();
        stop.stop();
        assert!(stop.is_stopped());
        assert_ne!(doorbell.sequence(), seen);
        // Stopping rings but queues no hotplug event
        assert_eq!(doorbell.pending(), 0);
    }

    #[test]
    fn test_monitor_config_partial_json() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"backoff": {"failure_secs": 3}}"#).unwrap();
        assert_eq!(config.sleep_tick(), Duration::from_millis(250));
        assert_eq!(config.backoff.failure_secs, 3);
        assert_eq!(config.backoff.baseline_secs, 60);
    }
}
