//! Squeak Simulation Library
//!
//! Test doubles for the Cool mouse hardware:
//!
//! - **VirtualMouse**: a port handle onto a simulated mouse or receiver that
//!   answers probes and polls like the firmware
//! - **MouseControl**: the test's side of a simulated device (clicks,
//!   battery, unplug and replug)
//! - **SimulatedBus**: a port list to attach devices to, scannable through
//!   `PortEnumerator`
//!
//! # Example
//!
//! ```rust
//! use std::io::{Read, Write};
//!
//! use squeak_protocol::{detect_role, Field, Role};
//! use squeak_sim::SimulatedBus;
//!
//! let bus = SimulatedBus::new();
//! let mouse = bus.attach("COM5", Role::Mouse);
//! mouse.click(Field::LeftClicks, 3);
//!
//! let mut port = bus.open("COM5").unwrap();
//! port.write_all(b"\n").unwrap();
//! let mut buf = [0u8; 128];
//! let n = port.read(&mut buf).unwrap();
//! assert_eq!(detect_role(&buf[..n]), Role::Mouse);
//! ```

pub mod bus;
pub mod mouse;

pub use bus::SimulatedBus;
pub use mouse::{MouseControl, VirtualMouse};
