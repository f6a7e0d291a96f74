//! Cool Mouse Serial Port Detection Library
//!
//! This crate finds the serial ports belonging to the Cool mouse and its
//! receiver, and watches for devices arriving or leaving, through libusb
//! hotplug notifications where available.
//!
//! # Example
//!
//! ```rust,no_run
//! use squeak_detect::DeviceRegistry;
//!
//! let registry = DeviceRegistry::new();
//! let found = registry.scan();
//!
//! if let Some(port) = found.mouse {
//!     println!("Mouse on {}", port);
//! }
//! ```

pub mod error;
pub mod hotplug;
pub mod scanner;
pub mod usb_events;
pub mod usb_ids;

pub use error::DetectError;
pub use hotplug::{
    system_source, DeviceChange, DeviceEventSource, HotplugEvents, HotplugWatcher, PortSetDiff,
};
pub use scanner::{
    DeviceRegistry, PortCandidate, PortEnumerator, ScanResult, ScannerConfig, SerialPortInfo,
    SystemPorts,
};
pub use usb_events::UsbHotplug;
pub use usb_ids::DeviceIdentity;
