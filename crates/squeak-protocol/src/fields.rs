//! Status report field extraction
//!
//! A poll response is free text, one field per line:
//!
//! ```text
//! Firmware build date: Mar 14 2025 10:22:01
//! Left clicks: 1520
//! Right clicks: 310
//! Middle clicks: 12
//! Backward clicks: 4
//! Forward clicks: 2
//! Downward scrolls: 870
//! Upward scrolls: 901
//! Battery level: 3912mV = 87%
//! Current DPI [2/4]: 1600
//! ```
//!
//! Each field has its own extractor so that a malformed or reordered line can
//! only affect that one field. Extractors return `None` when the line is not
//! theirs and `Some(Err(..))` when it is theirs but unparseable.

use tracing::trace;

use crate::error::FieldError;
use crate::status::StatusUpdate;

/// Fields the firmware reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    FirmwareBuildDate,
    LeftClicks,
    RightClicks,
    MiddleClicks,
    BackwardClicks,
    ForwardClicks,
    DownwardScrolls,
    UpwardScrolls,
    BatteryLevel,
    CurrentDpi,
}

impl Field {
    /// All fields, in report order
    pub const ALL: [Field; 10] = [
        Field::FirmwareBuildDate,
        Field::LeftClicks,
        Field::RightClicks,
        Field::MiddleClicks,
        Field::BackwardClicks,
        Field::ForwardClicks,
        Field::DownwardScrolls,
        Field::UpwardScrolls,
        Field::BatteryLevel,
        Field::CurrentDpi,
    ];

    /// The seven monotonically increasing counters
    pub const COUNTERS: [Field; 7] = [
        Field::LeftClicks,
        Field::RightClicks,
        Field::MiddleClicks,
        Field::BackwardClicks,
        Field::ForwardClicks,
        Field::DownwardScrolls,
        Field::UpwardScrolls,
    ];

    /// Field name as printed by the firmware
    pub fn label(&self) -> &'static str {
        match self {
            Field::FirmwareBuildDate => "Firmware build date",
            Field::LeftClicks => "Left clicks",
            Field::RightClicks => "Right clicks",
            Field::MiddleClicks => "Middle clicks",
            Field::BackwardClicks => "Backward clicks",
            Field::ForwardClicks => "Forward clicks",
            Field::DownwardScrolls => "Downward scrolls",
            Field::UpwardScrolls => "Upward scrolls",
            Field::BatteryLevel => "Battery level",
            Field::CurrentDpi => "Current DPI",
        }
    }

    pub fn is_counter(&self) -> bool {
        Self::COUNTERS.contains(self)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Text following `label:` on a line that carries that field
fn value_after<'a>(line: &'a str, field: Field) -> Option<&'a str> {
    let label = field.label();
    let at = line.find(label)?;
    let rest = line[at + label.len()..].strip_prefix(':')?;
    Some(rest.trim())
}

fn first_token(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

fn invalid(field: Field, text: &str) -> FieldError {
    FieldError::InvalidNumber {
        field,
        text: text.to_string(),
    }
}

fn malformed(field: Field, text: &str) -> FieldError {
    FieldError::Malformed {
        field,
        text: text.to_string(),
    }
}

/// `Firmware build date: <rest of line>`
pub fn firmware_build_date(line: &str) -> Option<String> {
    value_after(line, Field::FirmwareBuildDate).map(str::to_string)
}

/// `<Counter name>: <u64>` for any of the seven counters
///
/// Returns `None` for non-counter fields.
pub fn counter(line: &str, field: Field) -> Option<Result<u64, FieldError>> {
    if !field.is_counter() {
        return None;
    }
    let value = value_after(line, field)?;
    let token = first_token(value);
    Some(token.parse::<u64>().map_err(|_| invalid(field, token)))
}

/// `Battery level: <i32>mV = <u32>%`
pub fn battery_level(line: &str) -> Option<Result<(i32, u32), FieldError>> {
    let field = Field::BatteryLevel;
    let value = value_after(line, field)?;
    Some(parse_battery(value).unwrap_or_else(|| Err(malformed(field, value))))
}

fn parse_battery(value: &str) -> Option<Result<(i32, u32), FieldError>> {
    let field = Field::BatteryLevel;
    let (mv_text, rest) = value.split_once("mV")?;
    let (percent_text, _) = rest.trim().strip_prefix('=')?.split_once('%')?;

    let mv_text = mv_text.trim();
    let percent_text = percent_text.trim();

    let parsed = mv_text
        .parse::<i32>()
        .map_err(|_| invalid(field, mv_text))
        .and_then(|mv| {
            percent_text
                .parse::<u32>()
                .map(|percent| (mv, percent))
                .map_err(|_| invalid(field, percent_text))
        });
    Some(parsed)
}

/// `Current DPI [<anything>]: <u32>`
pub fn current_dpi(line: &str) -> Option<Result<u32, FieldError>> {
    let field = Field::CurrentDpi;
    let label = field.label();
    let at = line.find(label)?;
    let rest = line[at + label.len()..].trim_start();

    // The bracketed range may itself contain colons
    let value = match rest.strip_prefix('[') {
        Some(bracketed) => bracketed
            .split_once(']')
            .and_then(|(_, after)| after.trim_start().strip_prefix(':')),
        None => rest.strip_prefix(':'),
    };
    let Some(value) = value else {
        return Some(Err(malformed(field, rest.trim())));
    };
    let token = first_token(value);
    Some(token.parse::<u32>().map_err(|_| invalid(field, token)))
}

/// Result of parsing one poll response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportParse {
    /// Fields that parsed cleanly
    pub update: StatusUpdate,
    /// Fields that were present but rejected
    pub errors: Vec<FieldError>,
    /// Non-empty lines that carried no known field
    pub unrecognized: usize,
}

impl ReportParse {
    /// Route one line to the extractor that owns it
    ///
    /// Returns false when no extractor recognised the line.
    pub fn push_line(&mut self, line: &str) -> bool {
        if let Some(date) = firmware_build_date(line) {
            self.update.firmware_build_date = Some(date);
            return true;
        }

        for field in Field::COUNTERS {
            if let Some(result) = counter(line, field) {
                match result {
                    Ok(v) => *self.counter_slot(field) = Some(v),
                    Err(e) => self.errors.push(e),
                }
                return true;
            }
        }

        if let Some(result) = battery_level(line) {
            match result {
                Ok(v) => self.update.battery = Some(v),
                Err(e) => self.errors.push(e),
            }
            return true;
        }

        if let Some(result) = current_dpi(line) {
            match result {
                Ok(v) => self.update.current_dpi = Some(v),
                Err(e) => self.errors.push(e),
            }
            return true;
        }

        false
    }

    fn counter_slot(&mut self, field: Field) -> &mut Option<u64> {
        let u = &mut self.update;
        match field {
            Field::LeftClicks => &mut u.left_clicks,
            Field::RightClicks => &mut u.right_clicks,
            Field::MiddleClicks => &mut u.middle_clicks,
            Field::BackwardClicks => &mut u.backward_clicks,
            Field::ForwardClicks => &mut u.forward_clicks,
            Field::DownwardScrolls => &mut u.downward_scrolls,
            _ => &mut u.upward_scrolls,
        }
    }
}

/// Parse a complete poll response
///
/// Lines may end in `\n`, `\r\n` or a bare `\r`. When a field appears more
/// than once, the last well-formed occurrence wins.
pub fn parse_report(text: &str) -> ReportParse {
    let mut parse = ReportParse::default();
    for line in text.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !parse.push_line(line) {
            trace!("Ignoring report line {:?}", line);
            parse.unrecognized += 1;
        }
    }
    parse
}
