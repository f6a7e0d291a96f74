//! Serial port scanner
//!
//! This module enumerates serial ports and picks out the ones whose USB
//! identity belongs to the mouse or the receiver.

use std::sync::Arc;

use serialport::{available_ports, SerialPortType};
use squeak_protocol::Role;
use tracing::{debug, warn};

use crate::error::DetectError;
use crate::usb_ids::{self, MOUSE, RECEIVER};

/// Information about a serial port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyACM0, COM5)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB device release number, when the platform reports it
    pub revision: Option<u16>,
    /// Raw hardware ID string, when the platform reports one
    pub hardware_id: Option<String>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
                ..Default::default()
            },
            _ => Self {
                port: name,
                ..Default::default()
            },
        }
    }

    /// Which of our devices this port belongs to, if any
    pub fn role(&self) -> Role {
        if let (Some(vid), Some(pid)) = (self.vid, self.pid) {
            return usb_ids::role_for(vid, pid, self.revision);
        }
        match self.hardware_id.as_deref() {
            Some(id) if MOUSE.matches_hardware_id(id) => Role::Mouse,
            Some(id) if RECEIVER.matches_hardware_id(id) => Role::Receiver,
            _ => Role::None,
        }
    }
}

/// One enumerated device, or the reason it could not be inspected
pub type PortEntry = Result<SerialPortInfo, DetectError>;

/// Source of serial port listings
pub trait PortEnumerator: Send + Sync {
    /// List every serial-capable device currently visible
    fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError>;
}

/// The operating system's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
        entries(available_ports())
    }
}

fn entries(
    listing: serialport::Result<Vec<serialport::SerialPortInfo>>,
) -> Result<Vec<PortEntry>, DetectError> {
    Ok(listing?
        .into_iter()
        .map(|p| Ok(SerialPortInfo::from_serialport(p.port_name, &p.port_type)))
        .collect())
}

/// A port matched to a role during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    pub role: Role,
    pub port: String,
}

/// Outcome of one discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub mouse: Option<String>,
    pub receiver: Option<String>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.mouse.is_none() && self.receiver.is_none()
    }

    /// Port found for `role`
    pub fn port_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Mouse => self.mouse.as_deref(),
            Role::Receiver => self.receiver.as_deref(),
            Role::None => None,
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

/// Finds the mouse and receiver among the system's serial ports
pub struct DeviceRegistry {
    config: ScannerConfig,
    enumerator: Arc<dyn PortEnumerator>,
}

impl DeviceRegistry {
    /// Create a registry over the system's serial ports
    pub fn new() -> Self {
        Self::with_enumerator(Arc::new(SystemPorts))
    }

    /// Create a registry over a custom port source
    pub fn with_enumerator(enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec![
                    // Bluetooth ports on macOS
                    "Bluetooth".to_string(),
                ],
            },
            enumerator,
        }
    }

    /// Create a registry with custom configuration
    pub fn with_config(config: ScannerConfig, enumerator: Arc<dyn PortEnumerator>) -> Self {
        Self { config, enumerator }
    }

    /// Enumerate all inspectable serial ports
    ///
    /// Devices that cannot be inspected are skipped.
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        let entries = self.enumerator.enumerate()?;

        let result: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(info) => Some(info),
                Err(e) => {
                    debug!("Skipping device: {}", e);
                    None
                }
            })
            .filter(|p| !self.should_skip_port(p))
            .collect();

        debug!("Found {} serial port(s)", result.len());
        Ok(result)
    }

    /// All ports that belong to one of our devices, in enumeration order
    pub fn candidates(&self) -> Vec<PortCandidate> {
        let ports = match self.enumerate_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .filter_map(|info| {
                let role = info.role();
                if role.is_none() {
                    return None;
                }
                debug!(
                    port = %info.port,
                    role = %role,
                    product = info.product.as_deref().unwrap_or("Unknown"),
                    "Matched device"
                );
                Some(PortCandidate {
                    role,
                    port: info.port,
                })
            })
            .collect()
    }

    /// Find the mouse and receiver ports
    ///
    /// Never fails: enumeration problems yield an empty result. When a
    /// role matches several ports, the first one enumerated is used.
    pub fn scan(&self) -> ScanResult {
        let mut result = ScanResult::default();
        for candidate in self.candidates() {
            let slot = match candidate.role {
                Role::Mouse => &mut result.mouse,
                Role::Receiver => &mut result.receiver,
                Role::None => continue,
            };
            if let Some(existing) = slot.as_deref() {
                debug!(
                    "Ignoring extra {} port {} (using {})",
                    candidate.role, candidate.port, existing
                );
                continue;
            }
            *slot = Some(candidate.port);
        }
        result
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &SerialPortInfo) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.port.contains(pattern.as_str()))
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb_ids::VID;
    use serialport::UsbPortInfo;

    struct FixedPorts(Vec<(String, Option<(u16, u16)>)>);

    impl PortEnumerator for FixedPorts {
        fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
            Ok(self
                .0
                .iter()
                .map(|(port, ids)| {
                    Ok(SerialPortInfo {
                        port: port.clone(),
                        vid: ids.map(|(v, _)| v),
                        pid: ids.map(|(_, p)| p),
                        ..Default::default()
                    })
                })
                .collect())
        }
    }

    struct FailingPorts;

    impl PortEnumerator for FailingPorts {
        fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
            Err(DetectError::EnumerationFailed("access denied".into()))
        }
    }

    struct PartlyBroken;

    impl PortEnumerator for PartlyBroken {
        fn enumerate(&self) -> Result<Vec<PortEntry>, DetectError> {
            Ok(vec![
                Err(DetectError::Inspect {
                    port: "COM3".into(),
                    reason: "permission denied".into(),
                }),
                Ok(SerialPortInfo {
                    port: "COM7".into(),
                    vid: Some(VID),
                    pid: Some(0x0002),
                    ..Default::default()
                }),
            ])
        }
    }

    fn registry(ports: Vec<(&str, Option<(u16, u16)>)>) -> DeviceRegistry {
        let ports = ports.into_iter().map(|(p, ids)| (p.to_string(), ids)).collect();
        DeviceRegistry::with_enumerator(Arc::new(FixedPorts(ports)))
    }

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x2FE3,
            pid: 0x0003,
            serial_number: Some("12345".to_string()),
            manufacturer: Some("Cool".to_string()),
            product: Some("Cool mouse".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyACM0".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x2FE3));
        assert_eq!(info.pid, Some(0x0003));
        assert_eq!(info.revision, None);
        assert_eq!(info.product.as_deref(), Some("Cool mouse"));
        assert_eq!(info.role(), Role::Mouse);
    }

    #[test]
    fn test_system_listing_errors_surface_as_serial_port_errors() {
        let failed = entries(Err(serialport::Error::new(
            serialport::ErrorKind::NoDevice,
            "no tty class",
        )));
        assert!(matches!(failed, Err(DetectError::SerialPort(_))));

        let listed = entries(Ok(vec![serialport::SerialPortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: SerialPortType::Unknown,
        }]))
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].as_ref().unwrap().port, "/dev/ttyACM0");
    }

    #[test]
    fn test_non_usb_port_has_no_role() {
        let info = SerialPortInfo::from_serialport("/dev/ttyS0".into(), &SerialPortType::Unknown);
        assert_eq!(info.role(), Role::None);
    }

    #[test]
    fn test_role_from_hardware_id() {
        let info = SerialPortInfo {
            port: "COM4".into(),
            hardware_id: Some(r"USB\VID_2FE3&PID_0002&REV_0303".into()),
            ..Default::default()
        };
        assert_eq!(info.role(), Role::Receiver);
    }

    #[test]
    fn test_scan_empty_device_list() {
        let result = registry(vec![]).scan();
        assert_eq!(result, ScanResult::default());
        assert!(result.is_empty());
    }

    #[test]
    fn test_scan_finds_both_roles() {
        let result = registry(vec![
            ("/dev/ttyS0", None),
            ("/dev/ttyUSB0", Some((0x0403, 0x6001))),
            ("/dev/ttyACM0", Some((VID, 0x0002))),
            ("/dev/ttyACM1", Some((VID, 0x0003))),
        ])
        .scan();

        assert_eq!(result.mouse.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(result.receiver.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(result.port_for(Role::Mouse), Some("/dev/ttyACM1"));
        assert_eq!(result.port_for(Role::None), None);
    }

    #[test]
    fn test_scan_first_match_wins() {
        let result = registry(vec![
            ("COM5", Some((VID, 0x0003))),
            ("COM6", Some((VID, 0x0003))),
        ])
        .scan();
        assert_eq!(result.mouse.as_deref(), Some("COM5"));
        assert_eq!(result.receiver, None);
    }

    #[test]
    fn test_enumeration_failure_yields_empty_scan() {
        let registry = DeviceRegistry::with_enumerator(Arc::new(FailingPorts));
        assert!(registry.scan().is_empty());
        assert!(registry.enumerate_ports().is_err());
    }

    #[test]
    fn test_uninspectable_devices_are_skipped() {
        let registry = DeviceRegistry::with_enumerator(Arc::new(PartlyBroken));
        let result = registry.scan();
        assert_eq!(result.receiver.as_deref(), Some("COM7"));
        assert_eq!(result.mouse, None);
    }

    #[test]
    fn test_skip_patterns() {
        let registry = registry(vec![(
            "/dev/tty.Bluetooth-Incoming-Port",
            Some((VID, 0x0003)),
        )]);
        assert!(registry.scan().is_empty());
    }
}
