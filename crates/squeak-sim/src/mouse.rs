//! Virtual mouse firmware
//!
//! A [`VirtualMouse`] is one open port handle onto a simulated device. It
//! answers a newline with its banner and `'1'` with a status report, the way
//! the mouse and receiver firmware do. A [`MouseControl`] is the test's side
//! of the same device: click buttons, change the battery, or pull the cable.

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use squeak_protocol::{format_report, Field, Role, StatusSnapshot};
use tracing::trace;

#[derive(Debug)]
struct Firmware {
    role: Role,
    status: StatusSnapshot,
    plugged: bool,
    /// Bumped on every replug; handles from older plug-ins are dead
    plug_generation: u64,
    /// Plug generation of the handle currently holding the port open
    held_by: Option<u64>,
    banner_override: Option<Vec<u8>>,
    report_override: Option<Vec<u8>>,
    silent: bool,
    probes: u64,
    polls: u64,
}

impl Firmware {
    fn banner(&self) -> Vec<u8> {
        if let Some(banner) = &self.banner_override {
            return banner.clone();
        }
        match self.role.subject() {
            Some(subject) => format!("---- {subject} COM PORT ----\r\n").into_bytes(),
            None => Vec::new(),
        }
    }

    fn report(&self) -> Vec<u8> {
        match &self.report_override {
            Some(report) => report.clone(),
            None => format_report(&self.status).into_bytes(),
        }
    }

    fn alive(&self, generation: u64) -> bool {
        self.plugged && self.plug_generation == generation
    }
}

/// An open port handle onto a simulated device
#[derive(Debug)]
pub struct VirtualMouse {
    firmware: Arc<Mutex<Firmware>>,
    generation: u64,
    output: VecDeque<u8>,
}

impl VirtualMouse {
    /// A plugged-in device announcing `role`, with a default status
    pub fn new(role: Role) -> Self {
        Self::with_status(role, default_status())
    }

    pub fn with_status(role: Role, status: StatusSnapshot) -> Self {
        let firmware = Arc::new(Mutex::new(Firmware {
            role,
            status,
            plugged: true,
            plug_generation: 0,
            held_by: Some(0),
            banner_override: None,
            report_override: None,
            silent: false,
            probes: 0,
            polls: 0,
        }));
        Self {
            firmware,
            generation: 0,
            output: VecDeque::new(),
        }
    }

    pub fn control(&self) -> MouseControl {
        MouseControl {
            firmware: self.firmware.clone(),
        }
    }
}

impl Read for VirtualMouse {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.firmware.lock().alive(self.generation) {
            return Err(ErrorKind::BrokenPipe.into());
        }
        if self.output.is_empty() {
            return Err(ErrorKind::TimedOut.into());
        }
        let n = buf.len().min(self.output.len());
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for VirtualMouse {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut firmware = self.firmware.lock();
        if !firmware.alive(self.generation) {
            return Err(ErrorKind::BrokenPipe.into());
        }
        for &byte in buf {
            let answer = match byte {
                b'\n' => {
                    firmware.probes += 1;
                    firmware.banner()
                }
                b'1' => {
                    firmware.polls += 1;
                    firmware.report()
                }
                _ => continue,
            };
            trace!(
                "Virtual {} answers {:?} with {} bytes",
                firmware.role,
                byte as char,
                answer.len()
            );
            if !firmware.silent {
                self.output.extend(answer);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for VirtualMouse {
    fn drop(&mut self) {
        let mut firmware = self.firmware.lock();
        if firmware.held_by == Some(self.generation) {
            firmware.held_by = None;
        }
    }
}

/// Test-side handle onto a simulated device
#[derive(Debug, Clone)]
pub struct MouseControl {
    firmware: Arc<Mutex<Firmware>>,
}

impl MouseControl {
    /// A plugged-in device with nothing holding its port open
    pub fn new(role: Role) -> Self {
        // The temporary handle releases the port when dropped
        VirtualMouse::new(role).control()
    }

    /// Open a new port handle, exclusively
    pub fn open(&self) -> io::Result<VirtualMouse> {
        let mut firmware = self.firmware.lock();
        if !firmware.plugged {
            return Err(io::Error::new(ErrorKind::NotFound, "device not present"));
        }
        let generation = firmware.plug_generation;
        if firmware.held_by == Some(generation) {
            return Err(io::Error::new(
                ErrorKind::PermissionDenied,
                "port is already open",
            ));
        }
        firmware.held_by = Some(generation);
        Ok(VirtualMouse {
            firmware: self.firmware.clone(),
            generation,
            output: VecDeque::new(),
        })
    }

    /// Change the role the banner announces
    pub fn set_role(&self, role: Role) {
        self.firmware.lock().role = role;
    }

    pub fn status(&self) -> StatusSnapshot {
        self.firmware.lock().status.clone()
    }

    pub fn update_status(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        f(&mut self.firmware.lock().status);
    }

    /// Add `count` to a counter field; other fields are ignored
    pub fn click(&self, field: Field, count: u64) {
        let mut firmware = self.firmware.lock();
        let status = &mut firmware.status;
        let counter = match field {
            Field::LeftClicks => &mut status.left_clicks,
            Field::RightClicks => &mut status.right_clicks,
            Field::MiddleClicks => &mut status.middle_clicks,
            Field::BackwardClicks => &mut status.backward_clicks,
            Field::ForwardClicks => &mut status.forward_clicks,
            Field::DownwardScrolls => &mut status.downward_scrolls,
            Field::UpwardScrolls => &mut status.upward_scrolls,
            _ => return,
        };
        *counter = counter.saturating_add(count);
    }

    pub fn set_battery(&self, millivolts: i32, percent: u32) {
        let mut firmware = self.firmware.lock();
        firmware.status.battery_mv = millivolts;
        firmware.status.battery_percent = percent;
    }

    /// Answer probes with `banner` instead of the role banner
    pub fn set_banner(&self, banner: Option<&[u8]>) {
        self.firmware.lock().banner_override = banner.map(<[u8]>::to_vec);
    }

    /// Answer polls with `report` instead of the formatted status
    pub fn set_report(&self, report: Option<&[u8]>) {
        self.firmware.lock().report_override = report.map(<[u8]>::to_vec);
    }

    /// Swallow requests without answering
    pub fn set_silent(&self, silent: bool) {
        self.firmware.lock().silent = silent;
    }

    /// Pull the cable; open handles start failing
    pub fn unplug(&self) {
        let mut firmware = self.firmware.lock();
        firmware.plugged = false;
        firmware.held_by = None;
    }

    /// Plug back in; handles from before the unplug stay dead
    pub fn replug(&self) {
        let mut firmware = self.firmware.lock();
        firmware.plugged = true;
        firmware.plug_generation += 1;
    }

    pub fn is_plugged(&self) -> bool {
        self.firmware.lock().plugged
    }

    /// Whether a live handle holds the port open
    pub fn is_open(&self) -> bool {
        let firmware = self.firmware.lock();
        firmware.plugged && firmware.held_by == Some(firmware.plug_generation)
    }

    /// Probes answered so far
    pub fn probes(&self) -> u64 {
        self.firmware.lock().probes
    }

    /// Polls answered so far
    pub fn polls(&self) -> u64 {
        self.firmware.lock().polls
    }
}

fn default_status() -> StatusSnapshot {
    StatusSnapshot {
        firmware_build_date: "Jan 12 2024 10:31:07".into(),
        battery_mv: 3900,
        battery_percent: 80,
        current_dpi: 1600,
        ..Default::default()
    }
}
