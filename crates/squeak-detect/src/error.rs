//! Error types for device detection

use thiserror::Error;

/// Errors that can occur during detection
///
/// None of these abort a scan; they are logged and the scan returns what it
/// could find.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// A single device could not be inspected
    #[error("cannot inspect {port}: {reason}")]
    Inspect { port: String, reason: String },

    /// The hotplug watcher thread could not be started
    #[error("failed to start hotplug watcher: {0}")]
    WatcherSpawn(#[source] std::io::Error),

    /// libusb failed
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// libusb offers no hotplug notifications here
    #[error("USB hotplug notifications not supported")]
    HotplugUnsupported,

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
