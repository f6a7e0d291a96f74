//! Status report formatting
//!
//! Renders a snapshot in the same line layout the firmware uses, so a
//! formatted report parses back into the snapshot it came from.

use std::fmt::Write;

use crate::fields::Field;
use crate::status::StatusSnapshot;

/// Format `snapshot` as a firmware-style status report (CRLF line endings)
pub fn format_report(snapshot: &StatusSnapshot) -> String {
    let mut out = String::with_capacity(320);
    let counters = snapshot.counters();

    // Writing into a String cannot fail
    let _ = write!(
        out,
        "{}: {}\r\n",
        Field::FirmwareBuildDate,
        snapshot.firmware_build_date
    );
    for (field, value) in Field::COUNTERS.iter().zip(counters) {
        let _ = write!(out, "{}: {}\r\n", field, value);
    }
    let _ = write!(
        out,
        "{}: {}mV = {}%\r\n",
        Field::BatteryLevel,
        snapshot.battery_mv,
        snapshot.battery_percent
    );
    let _ = write!(out, "{} []: {}\r\n", Field::CurrentDpi, snapshot.current_dpi);
    out
}
