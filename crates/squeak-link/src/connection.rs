//! Connection lifecycle
//!
//! [`ConnectionManager`] owns the single serial session. Its state, role,
//! port handle, and the device's status snapshot live together behind one
//! lock, which is held only for state transitions. Opening the port and all
//! reads and writes happen outside it.
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──open ok──► Connected
//!      ▲                          │                       │
//!      └────────open failed───────┘                       │
//!      └───────────────────────disconnect()───────────────┘
//! ```
//!
//! I/O code borrows the handle with [`ConnectionManager::checkout`]. The
//! returned [`SessionGuard`] hands the handle back when dropped, unless a
//! `disconnect()` happened in the meantime, in which case the handle is
//! closed instead.

use std::sync::Arc;

use parking_lot::Mutex;
use squeak_protocol::{Role, StatusSnapshot};
use tracing::{debug, info, trace, warn};

use crate::error::LinkError;
use crate::transport::{LineSettings, PortOpener, SerialLink, SystemOpener};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

enum Handle {
    Absent,
    Idle(Box<dyn SerialLink>),
    OnLoan,
}

struct Session {
    state: ConnectionState,
    role: Role,
    port: Option<String>,
    handle: Handle,
    identified: bool,
    /// Bumped on every reset so stale guards can tell they were overtaken
    generation: u64,
    snapshot: StatusSnapshot,
}

impl Session {
    /// Return to Disconnected, yielding the handle if one was parked
    fn reset(&mut self) -> Option<Box<dyn SerialLink>> {
        self.state = ConnectionState::Disconnected;
        self.role = Role::None;
        self.port = None;
        self.identified = false;
        self.generation = self.generation.wrapping_add(1);
        match std::mem::replace(&mut self.handle, Handle::Absent) {
            Handle::Idle(link) => Some(link),
            Handle::Absent | Handle::OnLoan => None,
        }
    }
}

/// Consistent view of the session at one instant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub state: ConnectionState,
    pub role: Role,
    pub port: Option<String>,
    /// Whether a probe has confirmed the role on this connection
    pub identified: bool,
}

impl SessionView {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Owner of the single active serial session
pub struct ConnectionManager {
    opener: Arc<dyn PortOpener>,
    settings: LineSettings,
    session: Mutex<Session>,
}

impl ConnectionManager {
    /// Create a manager that opens ports through `opener`
    pub fn new(opener: Arc<dyn PortOpener>, settings: LineSettings) -> Self {
        Self {
            opener,
            settings,
            session: Mutex::new(Session {
                state: ConnectionState::Disconnected,
                role: Role::None,
                port: None,
                handle: Handle::Absent,
                identified: false,
                generation: 0,
                snapshot: StatusSnapshot::default(),
            }),
        }
    }

    /// Create a manager for the system's serial ports
    pub fn system(settings: LineSettings) -> Self {
        Self::new(Arc::new(SystemOpener), settings)
    }

    /// Open `path` for `role`, replacing any current session
    ///
    /// On failure the session is left Disconnected.
    pub fn connect(&self, role: Role, path: &str) -> Result<(), LinkError> {
        if role.is_none() {
            return Err(LinkError::Open {
                port: path.to_string(),
                reason: "no target role".into(),
            });
        }

        let (generation, previous) = {
            let mut session = self.session.lock();
            if session.state == ConnectionState::Connecting {
                return Err(LinkError::Busy);
            }
            let previous = session.reset();
            session.state = ConnectionState::Connecting;
            session.role = role;
            session.port = Some(path.to_string());
            (session.generation, previous)
        };
        drop(previous);

        debug!(port = path, role = %role, "Opening port");
        let opened = self.opener.open(path, &self.settings);

        let mut session = self.session.lock();
        if session.generation != generation {
            debug!("Connect to {} overtaken by disconnect", path);
            return Err(LinkError::Interrupted(path.to_string()));
        }

        match opened {
            Ok(link) => {
                session.state = ConnectionState::Connected;
                session.handle = Handle::Idle(link);
                info!(port = path, role = %role, "Connected");
                Ok(())
            }
            Err(e) => {
                let _ = session.reset();
                warn!(port = path, "Connect failed: {}", e);
                Err(e)
            }
        }
    }

    /// Release the session; safe to call when already disconnected
    pub fn disconnect(&self) {
        let (link, port) = {
            let mut session = self.session.lock();
            if session.state == ConnectionState::Disconnected {
                trace!("Disconnect while already disconnected");
                return;
            }
            let port = session.port.take();
            (session.reset(), port)
        };
        drop(link);
        info!("Disconnected from {}", port.as_deref().unwrap_or("?"));
    }

    pub fn state(&self) -> ConnectionState {
        self.session.lock().state
    }

    pub fn current_role(&self) -> Role {
        self.session.lock().role
    }

    pub fn port(&self) -> Option<String> {
        self.session.lock().port.clone()
    }

    pub fn is_identified(&self) -> bool {
        self.session.lock().identified
    }

    /// State, role, port, and identification read under one lock
    pub fn view(&self) -> SessionView {
        let session = self.session.lock();
        SessionView {
            state: session.state,
            role: session.role,
            port: session.port.clone(),
            identified: session.identified,
        }
    }

    /// Copy of the last known device status
    pub fn snapshot(&self) -> StatusSnapshot {
        self.session.lock().snapshot.clone()
    }

    /// Require the connected device to be probed again before polling
    pub fn require_probe(&self) {
        let mut session = self.session.lock();
        if session.state == ConnectionState::Connected && session.identified {
            debug!("Connection marked for re-probe");
            session.identified = false;
        }
    }

    /// Borrow the port handle for I/O
    ///
    /// Returns `None` when not connected or when the handle is already
    /// borrowed.
    pub fn checkout(&self) -> Option<SessionGuard<'_>> {
        let mut session = self.session.lock();
        if session.state != ConnectionState::Connected {
            return None;
        }
        match std::mem::replace(&mut session.handle, Handle::OnLoan) {
            Handle::Idle(link) => Some(SessionGuard {
                manager: self,
                link,
                role: session.role,
                port: session.port.clone().unwrap_or_default(),
                generation: session.generation,
            }),
            other => {
                session.handle = other;
                None
            }
        }
    }

    fn checkin(&self, generation: u64, link: Box<dyn SerialLink>) {
        let stale = {
            let mut session = self.session.lock();
            if session.generation == generation
                && session.state == ConnectionState::Connected
                && matches!(session.handle, Handle::OnLoan)
            {
                session.handle = Handle::Idle(link);
                None
            } else {
                Some(link)
            }
        };
        if stale.is_some() {
            debug!("Closing handle of a session that ended while in use");
        }
    }
}

/// Exclusive loan of the port handle
///
/// Dropping the guard returns the handle to the manager.
pub struct SessionGuard<'a> {
    manager: &'a ConnectionManager,
    link: Box<dyn SerialLink>,
    role: Role,
    port: String,
    generation: u64,
}

impl SessionGuard<'_> {
    /// Role recorded for this session
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn link(&mut self) -> &mut dyn SerialLink {
        self.link.as_mut()
    }

    /// Whether the session this guard belongs to is still the current one
    pub fn is_current(&self) -> bool {
        let session = self.manager.session.lock();
        session.generation == self.generation && session.state == ConnectionState::Connected
    }

    /// Copy of the manager's status snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.manager.snapshot()
    }

    /// Store a new status snapshot; ignored if the session has ended
    pub fn commit_snapshot(&self, snapshot: StatusSnapshot) -> bool {
        let mut session = self.manager.session.lock();
        if session.generation != self.generation {
            return false;
        }
        session.snapshot = snapshot;
        true
    }

    /// Record the role a probe reported and mark the session identified
    ///
    /// `Role::None` leaves the session unidentified. Returns false if the
    /// session has ended.
    pub fn confirm_role(&mut self, role: Role) -> bool {
        let mut session = self.manager.session.lock();
        if session.generation != self.generation {
            return false;
        }
        if role.is_none() {
            session.identified = false;
            return true;
        }
        if session.role != role {
            warn!(
                port = %self.port,
                "Port announced itself as {} (expected {})",
                role,
                session.role
            );
            session.role = role;
            self.role = role;
        }
        session.identified = true;
        true
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let link = std::mem::replace(&mut self.link, Box::new(std::io::empty()));
        self.manager.checkin(self.generation, link);
    }
}
