//! Device status tracking
//!
//! [`StatusSnapshot`] is the live cache of everything the device has reported.
//! It is never reset: a poll response that omits a field leaves the previous
//! value in place. [`StatusUpdate`] carries the fields of one response.

/// Last known status of the peripheral
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Firmware build date exactly as reported
    pub firmware_build_date: String,
    pub left_clicks: u64,
    pub right_clicks: u64,
    pub middle_clicks: u64,
    pub backward_clicks: u64,
    pub forward_clicks: u64,
    pub downward_scrolls: u64,
    pub upward_scrolls: u64,
    /// Battery voltage in millivolts (the firmware reports signed values)
    pub battery_mv: i32,
    /// Battery charge in percent
    pub battery_percent: u32,
    /// Active DPI setting
    pub current_dpi: u32,
}

/// Fields extracted from a single poll response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub firmware_build_date: Option<String>,
    pub left_clicks: Option<u64>,
    pub right_clicks: Option<u64>,
    pub middle_clicks: Option<u64>,
    pub backward_clicks: Option<u64>,
    pub forward_clicks: Option<u64>,
    pub downward_scrolls: Option<u64>,
    pub upward_scrolls: Option<u64>,
    /// Battery millivolts and percent always arrive on the same line
    pub battery: Option<(i32, u32)>,
    pub current_dpi: Option<u32>,
}

impl StatusUpdate {
    /// Number of fields present
    pub fn len(&self) -> usize {
        [
            self.firmware_build_date.is_some(),
            self.left_clicks.is_some(),
            self.right_clicks.is_some(),
            self.middle_clicks.is_some(),
            self.backward_clicks.is_some(),
            self.forward_clicks.is_some(),
            self.downward_scrolls.is_some(),
            self.upward_scrolls.is_some(),
            self.battery.is_some(),
            self.current_dpi.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn overwrite<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

impl StatusSnapshot {
    /// Apply the fields present in `update`, keeping everything else
    ///
    /// Returns the number of fields written.
    pub fn apply(&mut self, update: &StatusUpdate) -> usize {
        overwrite(&mut self.firmware_build_date, &update.firmware_build_date);
        overwrite(&mut self.left_clicks, &update.left_clicks);
        overwrite(&mut self.right_clicks, &update.right_clicks);
        overwrite(&mut self.middle_clicks, &update.middle_clicks);
        overwrite(&mut self.backward_clicks, &update.backward_clicks);
        overwrite(&mut self.forward_clicks, &update.forward_clicks);
        overwrite(&mut self.downward_scrolls, &update.downward_scrolls);
        overwrite(&mut self.upward_scrolls, &update.upward_scrolls);
        if let Some((mv, percent)) = update.battery {
            self.battery_mv = mv;
            self.battery_percent = percent;
        }
        overwrite(&mut self.current_dpi, &update.current_dpi);
        update.len()
    }

    /// The seven click and scroll counters, in report order
    pub fn counters(&self) -> [u64; 7] {
        [
            self.left_clicks,
            self.right_clicks,
            self.middle_clicks,
            self.backward_clicks,
            self.forward_clicks,
            self.downward_scrolls,
            self.upward_scrolls,
        ]
    }

    /// Total clicks across all five buttons
    pub fn total_clicks(&self) -> u64 {
        self.counters()[..5]
            .iter()
            .fold(0u64, |acc, c| acc.saturating_add(*c))
    }
}

impl std::fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "L{} R{} M{} B{} F{} down{} up{}, battery {}% ({} mV), {} DPI",
            self.left_clicks,
            self.right_clicks,
            self.middle_clicks,
            self.backward_clicks,
            self.forward_clicks,
            self.downward_scrolls,
            self.upward_scrolls,
            self.battery_percent,
            self.battery_mv,
            self.current_dpi,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_update_changes_nothing() {
        let mut snapshot = StatusSnapshot {
            left_clicks: 7,
            battery_mv: 3900,
            ..Default::default()
        };
        let before = snapshot.clone();

        assert_eq!(snapshot.apply(&StatusUpdate::default()), 0);
        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut snapshot = StatusSnapshot {
            firmware_build_date: "Jan  1 2025".into(),
            left_clicks: 1,
            right_clicks: 2,
            current_dpi: 800,
            ..Default::default()
        };

        let update = StatusUpdate {
            right_clicks: Some(20),
            battery: Some((-120, 55)),
            ..Default::default()
        };

        assert_eq!(snapshot.apply(&update), 2);
        assert_eq!(snapshot.firmware_build_date, "Jan  1 2025");
        assert_eq!(snapshot.left_clicks, 1);
        assert_eq!(snapshot.right_clicks, 20);
        assert_eq!(snapshot.battery_mv, -120);
        assert_eq!(snapshot.battery_percent, 55);
        assert_eq!(snapshot.current_dpi, 800);
    }

    #[test]
    fn test_update_len() {
        let update = StatusUpdate {
            firmware_build_date: Some(String::new()),
            upward_scrolls: Some(0),
            current_dpi: Some(1600),
            ..Default::default()
        };
        assert_eq!(update.len(), 3);
        assert!(!update.is_empty());
        assert!(StatusUpdate::default().is_empty());
    }

    #[test]
    fn test_total_clicks_saturates() {
        let snapshot = StatusSnapshot {
            left_clicks: u64::MAX,
            right_clicks: 5,
            downward_scrolls: 100,
            ..Default::default()
        };
        assert_eq!(snapshot.total_clicks(), u64::MAX);
    }

    #[test]
    fn test_display_summary() {
        let snapshot = StatusSnapshot {
            left_clicks: 42,
            battery_percent: 55,
            battery_mv: -120,
            current_dpi: 800,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.starts_with("L42 R0"));
        assert!(text.contains("battery 55% (-120 mV)"));
        assert!(text.ends_with("800 DPI"));
    }
}
