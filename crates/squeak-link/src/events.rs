//! Status events for the outside world
//!
//! The monitor loop emits one [`StatusEvent`] per cycle through a
//! [`StatusSink`]. Display, logging, and history live on the other side of
//! the sink.

use std::sync::mpsc;

use squeak_protocol::{Role, StatusSnapshot};

/// Outcome of one monitor cycle
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    /// Role of the connection (`Role::None` when disconnected)
    pub role: Role,
    /// Active port, if any
    pub port: Option<String>,
    /// Whether the cycle ended with a working connection
    pub connected: bool,
    /// Last known device status
    pub snapshot: StatusSnapshot,
    /// Whether this reading belongs in the click history
    pub records_history: bool,
}

impl StatusEvent {
    /// Event for a successful poll
    pub fn connected(
        role: Role,
        port: String,
        snapshot: StatusSnapshot,
        records_history: bool,
    ) -> Self {
        Self {
            role,
            port: Some(port),
            connected: true,
            snapshot,
            records_history,
        }
    }

    /// Event for a cycle that ended without a usable connection
    pub fn disconnected(snapshot: StatusSnapshot) -> Self {
        Self {
            role: Role::None,
            port: None,
            connected: false,
            snapshot,
            records_history: false,
        }
    }
}

/// Receiver of per-cycle status events
pub trait StatusSink: Send {
    fn on_status(&mut self, event: StatusEvent);
}

impl<F> StatusSink for F
where
    F: FnMut(StatusEvent) + Send,
{
    fn on_status(&mut self, event: StatusEvent) {
        self(event)
    }
}

/// Forwards events over a channel; a closed receiver drops them
impl StatusSink for mpsc::Sender<StatusEvent> {
    fn on_status(&mut self, event: StatusEvent) {
        let _ = self.send(event);
    }
}
