//! Serial transport
//!
//! The session code talks to a [`SerialLink`], which is any blocking
//! `Read + Write` byte stream with bounded timeouts. [`SystemOpener`] opens
//! real serial ports through the `serialport` crate; tests substitute
//! simulated devices through the same [`PortOpener`] seam.

use std::io::{Read, Write};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::debug;

use crate::error::LinkError;

/// A blocking byte stream to the device
///
/// Reads must return within the configured timeout, either with data or
/// with an `io::ErrorKind::TimedOut` error.
pub trait SerialLink: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> SerialLink for T {}

/// Line parameters applied to every connection (always 8N1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Read and write timeout in milliseconds
    pub timeout_ms: u64,
}

impl LineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout_ms: 50,
        }
    }
}

/// Opens ports by path
pub trait PortOpener: Send + Sync {
    /// Open `path` exclusively and apply `settings`
    fn open(&self, path: &str, settings: &LineSettings) -> Result<Box<dyn SerialLink>, LinkError>;
}

/// Opens the operating system's serial ports
///
/// Ports are opened exclusively: Windows never shares COM handles, and on
/// Unix the `serialport` crate takes `TIOCEXCL` on open.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl PortOpener for SystemOpener {
    fn open(&self, path: &str, settings: &LineSettings) -> Result<Box<dyn SerialLink>, LinkError> {
        let mut port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout())
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::InvalidInput => LinkError::Config {
                    port: path.to_string(),
                    reason: e.to_string(),
                },
                _ => LinkError::Open {
                    port: path.to_string(),
                    reason: e.to_string(),
                },
            })?;

        configure(port.as_mut(), settings).map_err(|e| LinkError::Config {
            port: path.to_string(),
            reason: e.to_string(),
        })?;

        // CDC firmware usually stays silent until DTR is asserted
        if let Err(e) = port.write_data_terminal_ready(true) {
            debug!("Could not assert DTR on {}: {}", path, e);
        }

        Ok(Box::new(port))
    }
}

/// Apply and verify line parameters on an open port
fn configure(port: &mut dyn SerialPort, settings: &LineSettings) -> serialport::Result<()> {
    port.set_baud_rate(settings.baud_rate)?;
    port.set_data_bits(DataBits::Eight)?;
    port.set_stop_bits(StopBits::One)?;
    port.set_parity(Parity::None)?;
    port.set_flow_control(FlowControl::None)?;
    port.set_timeout(settings.timeout())?;

    let actual = port.baud_rate()?;
    if actual != settings.baud_rate {
        return Err(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            format!("baud rate {} not accepted (got {})", settings.baud_rate, actual),
        ));
    }
    Ok(())
}
