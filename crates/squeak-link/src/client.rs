//! Probe and poll over an open session
//!
//! The client writes a request, then collects the answer until the port has
//! been quiet for one read timeout, the response limit is reached, or the
//! response deadline passes. It never opens or closes ports: on an I/O
//! failure it returns the error and leaves recovery to the monitor loop.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use squeak_protocol::{
    detect_role, PollStrategy, Role, StatusSnapshot, PROBE_REQUEST, PROBE_RESPONSE_LIMIT,
};
use tracing::{debug, trace, warn};

use crate::connection::ConnectionManager;
use crate::error::{LinkError, PollError};
use crate::transport::SerialLink;

/// Client configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound on the time spent collecting one response
    pub response_deadline_ms: u64,
}

impl ClientConfig {
    pub fn response_deadline(&self) -> Duration {
        Duration::from_millis(self.response_deadline_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_deadline_ms: 2000,
        }
    }
}

/// What a poll changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollOutcome {
    /// Snapshot fields written
    pub updated: usize,
    /// Recognized lines whose values were rejected
    pub rejected: usize,
}

/// Speaks the probe/poll protocol over a [`SerialLink`]
#[derive(Debug, Clone, Default)]
pub struct ProtocolClient {
    config: ClientConfig,
}

impl ProtocolClient {
    /// Create a client with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a client with custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask whatever is on `link` to announce its role
    ///
    /// Silence or an unrecognized answer yields [`Role::None`]; only I/O
    /// failures are errors.
    pub fn probe_link(&self, link: &mut dyn SerialLink) -> Result<Role, LinkError> {
        trace!("Sending probe");
        send(link, PROBE_REQUEST)?;

        let response = self.read_response(link, PROBE_RESPONSE_LIMIT)?;
        if response.is_empty() {
            debug!("No answer to probe");
            return Ok(Role::None);
        }

        let role = detect_role(&response);
        if role.is_none() {
            debug!(
                "Probe answer without banner: {:?}",
                String::from_utf8_lossy(&response)
            );
        }
        Ok(role)
    }

    /// Request a status report and apply it to `snapshot`
    ///
    /// Fields missing from the report keep their previous values. Rejected
    /// field values are logged and skipped.
    pub fn poll_link(
        &self,
        link: &mut dyn SerialLink,
        strategy: PollStrategy,
        snapshot: &mut StatusSnapshot,
    ) -> Result<PollOutcome, LinkError> {
        trace!(role = %strategy.role(), "Sending poll");
        send(link, strategy.request())?;

        let response = self.read_response(link, strategy.response_limit())?;
        if response.is_empty() {
            return Err(LinkError::NoResponse);
        }

        let parsed = strategy.parse(&response);
        for error in &parsed.errors {
            warn!("Ignoring {} in status report: {}", error.field(), error);
        }

        let outcome = PollOutcome {
            updated: snapshot.apply(&parsed.update),
            rejected: parsed.errors.len(),
        };
        debug!(
            updated = outcome.updated,
            rejected = outcome.rejected,
            unrecognized = parsed.unrecognized,
            "Status report applied"
        );
        Ok(outcome)
    }

    /// Probe the connected device and record its role
    pub fn probe(&self, connection: &ConnectionManager) -> Result<Role, PollError> {
        let mut session = connection.checkout().ok_or(PollError::NotConnected)?;
        let role = self.probe_link(session.link())?;
        session.confirm_role(role);
        Ok(role)
    }

    /// Poll the identified device and store the updated snapshot
    pub fn poll(&self, connection: &ConnectionManager) -> Result<StatusSnapshot, PollError> {
        if !connection.is_identified() {
            return Err(PollError::Unidentified);
        }
        let mut session = connection.checkout().ok_or(PollError::NotConnected)?;
        let strategy = PollStrategy::for_role(session.role()).ok_or(PollError::Unidentified)?;

        let mut snapshot = session.snapshot();
        self.poll_link(session.link(), strategy, &mut snapshot)?;

        if !session.commit_snapshot(snapshot.clone()) {
            return Err(PollError::NotConnected);
        }
        Ok(snapshot)
    }

    /// Collect bytes until the port goes quiet, `limit` is reached, or the
    /// response deadline passes
    fn read_response(&self, link: &mut dyn SerialLink, limit: usize) -> Result<Vec<u8>, LinkError> {
        let deadline = Instant::now() + self.config.response_deadline();
        let mut response = Vec::with_capacity(limit.min(256));
        let mut buf = [0u8; 256];

        while response.len() < limit && Instant::now() < deadline {
            let want = (limit - response.len()).min(buf.len());
            match link.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => response.extend_from_slice(&buf[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(LinkError::Io(e)),
            }
        }

        trace!("Read {} byte response", response.len());
        Ok(response)
    }
}

fn send(link: &mut dyn SerialLink, request: &[u8]) -> Result<(), LinkError> {
    link.write_all(request)?;
    link.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};

    /// Scripted link: each write queues the next canned answer
    struct Scripted {
        answers: VecDeque<Vec<u8>>,
        pending: VecDeque<u8>,
        written: Vec<u8>,
        fail_writes: bool,
        fail_reads: bool,
    }

    impl Scripted {
        fn new(answers: &[&[u8]]) -> Self {
            Self {
                answers: answers.iter().map(|a| a.to_vec()).collect(),
                pending: VecDeque::new(),
                written: Vec::new(),
                fail_writes: false,
                fail_reads: false,
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fail_reads {
                return Err(ErrorKind::BrokenPipe.into());
            }
            if self.pending.is_empty() {
                return Err(ErrorKind::TimedOut.into());
            }
            // Dribble out a few bytes at a time like a real port
            let n = buf.len().min(self.pending.len()).min(7);
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap_or_default();
            }
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_writes {
                return Err(ErrorKind::BrokenPipe.into());
            }
            self.written.extend_from_slice(buf);
            if let Some(answer) = self.answers.pop_front() {
                self.pending.extend(answer);
            }
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_probe_mouse_banner() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[b"---- MOUSE COM PORT ----\r\n"]);
        assert_eq!(client.probe_link(&mut link).unwrap(), Role::Mouse);
        assert_eq!(link.written, b"\n");
    }

    #[test]
    fn test_probe_receiver_banner_with_noise() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[b"boot ok\r\n---- RECEIVER COM PORT ----\r\nready\r\n"]);
        assert_eq!(client.probe_link(&mut link).unwrap(), Role::Receiver);
    }

    #[test]
    fn test_probe_silence_and_garbage_are_none() {
        let client = ProtocolClient::new();
        assert_eq!(client.probe_link(&mut Scripted::new(&[])).unwrap(), Role::None);
        assert_eq!(
            client
                .probe_link(&mut Scripted::new(&[b"---- KEYBOARD COM PORT ----\r\n"]))
                .unwrap(),
            Role::None
        );
    }

    #[test]
    fn test_probe_write_failure_is_io() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[]);
        link.fail_writes = true;
        assert!(matches!(client.probe_link(&mut link), Err(LinkError::Io(_))));
    }

    #[test]
    fn test_poll_updates_only_reported_fields() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[b"Left clicks: 42\r\nBattery level: -120mV = 55%\r\n"]);
        let mut snapshot = StatusSnapshot {
            right_clicks: 7,
            current_dpi: 1600,
            ..Default::default()
        };

        let outcome = client
            .poll_link(&mut link, PollStrategy::Mouse, &mut snapshot)
            .unwrap();

        assert_eq!(link.written, b"1");
        assert_eq!(outcome.rejected, 0);
        assert_eq!(snapshot.left_clicks, 42);
        assert_eq!(snapshot.battery_mv, -120);
        assert_eq!(snapshot.battery_percent, 55);
        assert_eq!(snapshot.right_clicks, 7);
        assert_eq!(snapshot.current_dpi, 1600);
    }

    #[test]
    fn test_poll_rejected_field_is_not_a_failure() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[b"Left clicks: lots\r\nRight clicks: 3\r\n"]);
        let mut snapshot = StatusSnapshot {
            left_clicks: 10,
            ..Default::default()
        };

        let outcome = client
            .poll_link(&mut link, PollStrategy::Receiver, &mut snapshot)
            .unwrap();
        assert_eq!(outcome.rejected, 1);
        assert_eq!(snapshot.left_clicks, 10);
        assert_eq!(snapshot.right_clicks, 3);
    }

    #[test]
    fn test_poll_silence_is_no_response() {
        let client = ProtocolClient::new();
        let mut snapshot = StatusSnapshot::default();
        assert!(matches!(
            client.poll_link(&mut Scripted::new(&[]), PollStrategy::Mouse, &mut snapshot),
            Err(LinkError::NoResponse)
        ));
    }

    #[test]
    fn test_poll_read_failure_is_io() {
        let client = ProtocolClient::new();
        let mut link = Scripted::new(&[b"Left clicks: 1\r\n"]);
        link.fail_reads = true;
        let mut snapshot = StatusSnapshot::default();
        assert!(matches!(
            client.poll_link(&mut link, PollStrategy::Mouse, &mut snapshot),
            Err(LinkError::Io(_))
        ));
        assert_eq!(snapshot.left_clicks, 0);
    }

    #[test]
    fn test_response_limit_is_respected() {
        let client = ProtocolClient::new();
        let long = vec![b'x'; 5000];
        let mut link = Scripted::new(&[long.as_slice()]);
        let response = client.read_response(&mut link, 1024).unwrap();
        assert_eq!(response.len(), 1024);
    }

    #[test]
    fn test_client_config_partial_json() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.response_deadline(), Duration::from_secs(2));
    }
}
