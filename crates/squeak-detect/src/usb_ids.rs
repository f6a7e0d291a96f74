//! USB identities of the Cool mouse devices
//!
//! Both devices enumerate as USB CDC serial ports under the same vendor ID.
//! Windows reports them with hardware IDs such as
//! `USB\VID_2FE3&PID_0003&REV_0303`; other platforms expose the same numbers
//! through the serial port's USB descriptor.

use squeak_protocol::Role;

/// Vendor ID shared by the mouse and the receiver
pub const VID: u16 = 0x2FE3;

/// USB identity of one device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vid: u16,
    pub pid: u16,
    /// Device release number (bcdDevice)
    pub revision: u16,
    /// Product description
    pub description: &'static str,
}

impl DeviceIdentity {
    pub const fn new(vid: u16, pid: u16, revision: u16, description: &'static str) -> Self {
        Self {
            vid,
            pid,
            revision,
            description,
        }
    }

    /// Windows-style hardware ID, e.g. `VID_2FE3&PID_0003&REV_0303`
    pub fn hardware_id(&self) -> String {
        format!(
            "VID_{:04X}&PID_{:04X}&REV_{:04X}",
            self.vid, self.pid, self.revision
        )
    }

    /// Match enumerated USB numbers
    ///
    /// The revision is only compared when the platform reports one.
    pub fn matches(&self, vid: u16, pid: u16, revision: Option<u16>) -> bool {
        self.vid == vid && self.pid == pid && revision.is_none_or(|rev| rev == self.revision)
    }

    /// Match a hardware ID string containing this identity (case-insensitive)
    pub fn matches_hardware_id(&self, hardware_id: &str) -> bool {
        hardware_id
            .to_ascii_uppercase()
            .contains(&self.hardware_id())
    }
}

/// The mouse, attached by cable
pub const MOUSE: DeviceIdentity = DeviceIdentity::new(VID, 0x0003, 0x0303, "Cool mouse");

/// The wireless receiver
pub const RECEIVER: DeviceIdentity =
    DeviceIdentity::new(VID, 0x0002, 0x0303, "Cool mouse receiver");

/// Identity expected for a role
pub fn identity_for(role: Role) -> Option<&'static DeviceIdentity> {
    match role {
        Role::Mouse => Some(&MOUSE),
        Role::Receiver => Some(&RECEIVER),
        Role::None => None,
    }
}

/// Role of a device with the given USB numbers
pub fn role_for(vid: u16, pid: u16, revision: Option<u16>) -> Role {
    if MOUSE.matches(vid, pid, revision) {
        Role::Mouse
    } else if RECEIVER.matches(vid, pid, revision) {
        Role::Receiver
    } else {
        Role::None
    }
}
