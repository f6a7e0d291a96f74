//! Simulated serial bus
//!
//! [`SimulatedBus`] stands in for the operating system's port list. Devices
//! are attached under a port name with the USB identity of their role, and
//! can be detached again to simulate unplugging. The bus implements
//! [`PortEnumerator`] so a `DeviceRegistry` can scan it, and
//! [`SimulatedBus::open`] hands out port handles the way the OS would.

use std::io::{self, ErrorKind};

use parking_lot::Mutex;
use squeak_detect::scanner::PortEntry;
use squeak_detect::usb_ids::identity_for;
use squeak_detect::{DetectError, PortEnumerator, SerialPortInfo};
use squeak_protocol::Role;
use tracing::debug;

use crate::mouse::{MouseControl, VirtualMouse};

#[derive(Debug)]
enum Slot {
    /// A device whose identity can be read
    Device {
        info: SerialPortInfo,
        control: Option<MouseControl>,
    },
    /// A device the enumerator cannot inspect
    Uninspectable { reason: String },
}

#[derive(Debug)]
struct BusPort {
    port: String,
    slot: Slot,
}

/// Port list with attachable simulated devices
#[derive(Debug, Default)]
pub struct SimulatedBus {
    ports: Mutex<Vec<BusPort>>,
    fail_enumeration: Mutex<Option<String>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new simulated device for `role` at `port`
    pub fn attach(&self, port: &str, role: Role) -> MouseControl {
        let control = MouseControl::new(role);
        self.attach_control(port, role, control.clone());
        control
    }

    /// Attach an existing device at `port`, identified as `role` over USB
    pub fn attach_control(&self, port: &str, role: Role, control: MouseControl) {
        if !control.is_plugged() {
            control.replug();
        }
        let mut info = SerialPortInfo {
            port: port.to_string(),
            ..Default::default()
        };
        if let Some(identity) = identity_for(role) {
            info.vid = Some(identity.vid);
            info.pid = Some(identity.pid);
            info.revision = Some(identity.revision);
            info.product = Some(identity.description.to_string());
        }
        self.insert(
            port,
            Slot::Device {
                info,
                control: Some(control),
            },
        );
    }

    /// Attach a port that is not one of ours (enumerated, never opened)
    pub fn attach_foreign(&self, info: SerialPortInfo) {
        let port = info.port.clone();
        self.insert(&port, Slot::Device { info, control: None });
    }

    /// Attach a port whose identity cannot be read
    pub fn attach_uninspectable(&self, port: &str, reason: &str) {
        self.insert(
            port,
            Slot::Uninspectable {
                reason: reason.to_string(),
            },
        );
    }

    /// Remove `port`, unplugging its device
    pub fn detach(&self, port: &str) -> Option<MouseControl> {
        let mut ports = self.ports.lock();
        let index = ports.iter().position(|p| p.port == port)?;
        let removed = ports.remove(index);
        debug!("Bus: detached {}", port);
        match removed.slot {
            Slot::Device {
                control: Some(control),
                ..
            } => {
                control.unplug();
                Some(control)
            }
            _ => None,
        }
    }

    /// Make every enumeration fail until cleared with `None`
    pub fn fail_enumeration(&self, reason: Option<&str>) {
        *self.fail_enumeration.lock() = reason.map(str::to_string);
    }

    pub fn port_names(&self) -> Vec<String> {
        self.ports.lock().iter().map(|p| p.port.clone()).collect()
    }

    /// Open `path` as the OS would
    pub fn open(&self, path: &str) -> io::Result<VirtualMouse> {
        let ports = self.ports.lock();
        let entry = ports
            .iter()
            .find(|p| p.port == path)
            .ok_or_else(|| io::Error::new(ErrorKind::NotFound, format!("{path}: no such port")))?;
        match &entry.slot {
            Slot::Device {
                control: Some(control),
                ..
            } => control.open(),
            _ => Err(io::Error::new(
                ErrorKind::PermissionDenied,
                format!("{path}: access denied"),
            )),
        }
    }

    fn insert(&self, port: &str, slot: Slot) {
        let mut ports = self.ports.lock();
        ports.retain(|p| p.port != port);
        ports.push(BusPort {
            port: port.to_string(),
            slot,
        });
        debug!("Bus: attached {}", port);
    }
}

impl PortEnumerator for SimulatedBus {
    fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
        if let Some(reason) = self.fail_enumeration.lock().clone() {
            return Err(DetectError::EnumerationFailed(reason));
        }
        Ok(self
            .ports
            .lock()
            .iter()
            .map(|p| match &p.slot {
                Slot::Device { info, .. } => Ok(info.clone()),
                Slot::Uninspectable { reason } => Err(DetectError::Inspect {
                    port: p.port.clone(),
                    reason: reason.clone(),
                }),
            })
            .collect())
    }
}
