//! Serial session and monitor loop for the Cool mouse
//!
//! - [`ConnectionManager`] owns the one open port and the device's
//!   [`StatusSnapshot`](squeak_protocol::StatusSnapshot).
//! - [`ProtocolClient`] probes and polls over the open port.
//! - [`MonitorLoop`] ties discovery, connection, and polling together with an
//!   adaptive [`Backoff`], reporting each cycle to a [`StatusSink`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::{mpsc, Arc};
//!
//! use squeak_detect::{DeviceRegistry, HotplugEvents};
//! use squeak_link::{ConnectionManager, LineSettings, MonitorConfig, MonitorLoop, ProtocolClient};
//!
//! let (tx, rx) = mpsc::channel();
//! let monitor = MonitorLoop::new(
//!     DeviceRegistry::new(),
//!     Arc::new(ConnectionManager::system(LineSettings::default())),
//!     ProtocolClient::new(),
//!     Arc::new(HotplugEvents::new()),
//!     tx,
//!     MonitorConfig::default(),
//! );
//! let handle = monitor.spawn()?;
//!
//! for event in rx.iter().take(3) {
//!     println!("connected={} {}", event.connected, event.snapshot);
//! }
//! handle.join();
//! # Ok::<(), squeak_link::LinkError>(())
//! ```

pub mod backoff;
pub mod client;
pub mod connection;
pub mod error;
pub mod events;
pub mod monitor;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig, BackoffState};
pub use client::{ClientConfig, PollOutcome, ProtocolClient};
pub use connection::{ConnectionManager, ConnectionState, SessionGuard, SessionView};
pub use error::{LinkError, PollError};
pub use events::{StatusEvent, StatusSink};
pub use monitor::{select_targets, MonitorConfig, MonitorHandle, MonitorLoop, StopHandle};
pub use transport::{LineSettings, PortOpener, SerialLink, SystemOpener};
