//! Per-role poll strategy
//!
//! Once a port's role is known, the poll strategy for that role decides what
//! to send, how much to read back, how to parse it, and whether the result
//! belongs in the click history.

use crate::fields::{parse_report, ReportParse};
use crate::{Role, POLL_REQUEST, POLL_RESPONSE_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollStrategy {
    /// Status read straight from the mouse
    Mouse,
    /// Status relayed by the receiver
    Receiver,
}

impl PollStrategy {
    /// Strategy for an identified role; `None` for [`Role::None`]
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::Mouse => Some(PollStrategy::Mouse),
            Role::Receiver => Some(PollStrategy::Receiver),
            Role::None => None,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            PollStrategy::Mouse => Role::Mouse,
            PollStrategy::Receiver => Role::Receiver,
        }
    }

    /// Bytes that request a status report
    pub fn request(&self) -> &'static [u8] {
        POLL_REQUEST
    }

    /// Upper bound on the response size
    pub fn response_limit(&self) -> usize {
        POLL_RESPONSE_LIMIT
    }

    /// Parse a status report
    pub fn parse(&self, response: &[u8]) -> ReportParse {
        parse_report(&String::from_utf8_lossy(response))
    }

    /// Whether successful polls are appended to the click history
    ///
    /// Only readings taken directly from the mouse are recorded.
    pub fn records_history(&self) -> bool {
        matches!(self, PollStrategy::Mouse)
    }
}
