//! Status reporting
//!
//! Turns the monitor loop's per-cycle events into log lines and history
//! rows. Connection transitions are logged once each; steady state goes to
//! debug.

use chrono::{DateTime, Local};
use squeak_link::StatusEvent;
use tracing::{debug, info, warn};

use crate::history::HistoryStore;

pub struct Reporter {
    history: Option<HistoryStore>,
    low_battery_percent: u32,
    connected: Option<bool>,
    last_reading: Option<DateTime<Local>>,
    battery_warned: bool,
}

impl Reporter {
    pub fn new(history: Option<HistoryStore>, low_battery_percent: u32) -> Self {
        Self {
            history,
            low_battery_percent,
            connected: None,
            last_reading: None,
            battery_warned: false,
        }
    }

    pub fn handle(&mut self, event: &StatusEvent) {
        self.handle_at(event, Local::now());
    }

    fn handle_at(&mut self, event: &StatusEvent, now: DateTime<Local>) {
        if self.connected != Some(event.connected) {
            self.log_transition(event);
            self.connected = Some(event.connected);
        }

        if !event.connected {
            return;
        }

        debug!("{}", event.snapshot);
        self.check_battery(event.snapshot.battery_percent);

        if event.records_history {
            if let Some(history) = &self.history {
                if let Err(e) = history.append(&event.snapshot, &now) {
                    warn!("Could not record reading: {}", e);
                }
            }
        }
        self.last_reading = Some(now);
    }

    /// Time of the last successful reading
    pub fn last_reading(&self) -> Option<DateTime<Local>> {
        self.last_reading
    }

    fn log_transition(&self, event: &StatusEvent) {
        if event.connected {
            info!(
                "Connected to {} on {}: {}",
                event.role,
                event.port.as_deref().unwrap_or("?"),
                event.snapshot
            );
            return;
        }
        match self.last_reading {
            Some(at) => info!(
                "Mouse disconnected (last reading {})",
                at.format("%Y-%m-%d %H:%M:%S")
            ),
            None => info!("Waiting for mouse"),
        }
    }

    fn check_battery(&mut self, percent: u32) {
        if percent < self.low_battery_percent {
            if !self.battery_warned {
                warn!("Mouse battery low: {}%", percent);
                self.battery_warned = true;
            }
        } else {
            self.battery_warned = false;
        }
    }
}
