//! Error types for the serial session

use thiserror::Error;

/// Errors from opening, configuring, or talking to the port
#[derive(Debug, Error)]
pub enum LinkError {
    /// Port is missing or held by someone else
    #[error("failed to open port {port}: {reason}")]
    Open { port: String, reason: String },

    /// Line parameters could not be applied
    #[error("failed to configure port {port}: {reason}")]
    Config { port: String, reason: String },

    /// Another connect is already in progress
    #[error("a connection attempt is already in progress")]
    Busy,

    /// A disconnect overtook the connect in progress
    #[error("connection attempt to {0} was interrupted")]
    Interrupted(String),

    /// The device sent nothing back
    #[error("no response from device")]
    NoResponse,

    /// I/O error mid-session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a probe or poll
#[derive(Debug, Error)]
pub enum PollError {
    /// No session to poll
    #[error("not connected")]
    NotConnected,

    /// The connected device has not announced its role yet
    #[error("device role not established")]
    Unidentified,

    /// The session failed
    #[error(transparent)]
    Link(#[from] LinkError),
}
