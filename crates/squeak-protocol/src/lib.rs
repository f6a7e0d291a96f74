//! Squeak Protocol Library
//!
//! This crate provides parsing and formatting for the line-oriented status
//! protocol spoken by the Cool mouse and its wireless receiver over their
//! USB serial ports.
//!
//! # Requests
//!
//! - **Probe**: a single newline byte. The device answers with a banner of the
//!   form `---- MOUSE COM PORT ----` or `---- RECEIVER COM PORT ----`.
//! - **Poll**: a single `'1'` byte. The device answers with a status report,
//!   one `Name: value` field per line.
//!
//! Every field in a status report is optional. Parsing produces a
//! [`StatusUpdate`] holding only the fields that were present and well formed,
//! which is then applied to a long-lived [`StatusSnapshot`].
//!
//! # Example
//!
//! ```rust
//! use squeak_protocol::{detect_role, parse_report, Role, StatusSnapshot};
//!
//! assert_eq!(detect_role(b"---- MOUSE COM PORT ----\r\n"), Role::Mouse);
//!
//! let mut snapshot = StatusSnapshot::default();
//! let parsed = parse_report("Left clicks: 42\r\nBattery level: -120mV = 55%\r\n");
//! snapshot.apply(&parsed.update);
//!
//! assert_eq!(snapshot.left_clicks, 42);
//! assert_eq!(snapshot.battery_mv, -120);
//! assert_eq!(snapshot.battery_percent, 55);
//! ```

pub mod banner;
pub mod display;
pub mod error;
pub mod fields;
pub mod status;
pub mod strategy;

pub use banner::{banner_subject, detect_role};
pub use display::format_report;
pub use error::FieldError;
pub use fields::{parse_report, Field, ReportParse};
pub use status::{StatusSnapshot, StatusUpdate};
pub use strategy::PollStrategy;

/// Request sent to find out which device answers on a port
pub const PROBE_REQUEST: &[u8] = b"\n";

/// Request sent to ask an identified device for its status report
pub const POLL_REQUEST: &[u8] = b"1";

/// Upper bound on the bytes read in answer to a probe
pub const PROBE_RESPONSE_LIMIT: usize = 2000;

/// Upper bound on the bytes read in answer to a poll
pub const POLL_RESPONSE_LIMIT: usize = 1024;

/// Logical identity of whatever is connected on the active port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Nothing identified (always the case while disconnected)
    #[default]
    None,
    /// The mouse itself, attached by cable
    Mouse,
    /// The wireless receiver, reporting on behalf of the mouse
    Receiver,
}

impl Role {
    /// Returns a human-readable name for the role
    pub fn name(&self) -> &'static str {
        match self {
            Role::None => "none",
            Role::Mouse => "mouse",
            Role::Receiver => "receiver",
        }
    }

    /// Map a banner subject (`MOUSE`, `RECEIVER`) to a role
    pub fn from_subject(subject: &str) -> Self {
        match subject {
            "MOUSE" => Role::Mouse,
            "RECEIVER" => Role::Receiver,
            _ => Role::None,
        }
    }

    /// The subject this role announces in its banner
    pub fn subject(&self) -> Option<&'static str> {
        match self {
            Role::None => None,
            Role::Mouse => Some("MOUSE"),
            Role::Receiver => Some("RECEIVER"),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Role::None)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_subject() {
        assert_eq!(Role::from_subject("MOUSE"), Role::Mouse);
        assert_eq!(Role::from_subject("RECEIVER"), Role::Receiver);
        assert_eq!(Role::from_subject("mouse"), Role::None);
        assert_eq!(Role::from_subject("KEYBOARD"), Role::None);
    }

    #[test]
    fn test_role_subject_round_trip() {
        for role in [Role::Mouse, Role::Receiver] {
            assert_eq!(Role::from_subject(role.subject().unwrap()), role);
        }
        assert_eq!(Role::None.subject(), None);
    }

    #[test]
    fn test_request_bytes() {
        assert_eq!(PROBE_REQUEST, b"\n");
        assert_eq!(POLL_REQUEST, b"1");
    }
}
