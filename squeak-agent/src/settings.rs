//! Agent settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use squeak_link::{BackoffConfig, ClientConfig, LineSettings, MonitorConfig};
use tracing::{debug, info, warn};

/// Agent settings, stored as JSON in the user's config directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial baud rate
    pub baud_rate: u32,
    /// Serial read/write timeout in milliseconds
    pub io_timeout_ms: u64,
    /// Longest time spent collecting one probe or poll answer
    pub response_deadline_ms: u64,
    /// Delays between monitor cycles
    pub backoff: BackoffConfig,
    /// How often the port list is checked for hotplug changes
    pub hotplug_tick_ms: u64,
    /// Append each mouse reading to the click history
    pub history_enabled: bool,
    /// History file; defaults to the user's data directory
    pub history_path: Option<PathBuf>,
    /// Battery percentage below which a warning is logged
    pub low_battery_percent: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            io_timeout_ms: 50,
            response_deadline_ms: ClientConfig::default().response_deadline_ms,
            backoff: BackoffConfig::default(),
            hotplug_tick_ms: 500,
            history_enabled: true,
            history_path: None,
            low_battery_percent: 30,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for squeak
    /// Uses $XDG_CONFIG_HOME/squeak, falls back to ~/.config/squeak
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("squeak"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("squeak"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings, writing the defaults out on first run
    pub fn load_or_init() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine settings path, using defaults");
            return Self::default();
        };

        if path.exists() {
            return Self::load_from(&path);
        }

        let settings = Self::default();
        match settings.save_to(&path) {
            Ok(()) => info!("Wrote default settings to {}", path.display()),
            Err(e) => warn!("{:#}", e),
        }
        settings
    }

    /// Load settings from `path`; unreadable or invalid files yield defaults
    pub fn load_from(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                debug!("No settings at {}: {}", path.display(), e);
                return Self::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring invalid settings in {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;
        Ok(())
    }

    pub fn line_settings(&self) -> LineSettings {
        LineSettings {
            baud_rate: self.baud_rate,
            timeout_ms: self.io_timeout_ms,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            response_deadline_ms: self.response_deadline_ms,
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            backoff: self.backoff,
            ..Default::default()
        }
    }

    pub fn hotplug_tick(&self) -> Duration {
        Duration::from_millis(self.hotplug_tick_ms.max(10))
    }

    /// Where readings are recorded, or `None` when history is off
    pub fn history_file(&self) -> Option<PathBuf> {
        if !self.history_enabled {
            return None;
        }
        self.history_path.clone().or_else(|| {
            dirs::data_dir().map(|d| d.join("squeak").join("mouse_stats.csv"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.line_settings(), LineSettings::default());
        assert_eq!(settings.backoff.baseline_secs, 60);
        assert_eq!(settings.backoff.failure_secs, 10);
        assert_eq!(settings.low_battery_percent, 30);
        assert_eq!(settings.hotplug_tick(), Duration::from_millis(500));
        assert_eq!(settings.client_config(), ClientConfig::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            baud_rate: 57_600,
            history_path: Some(dir.path().join("clicks.csv")),
            ..Default::default()
        };
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"backoff": {"baseline_secs": 30}, "history_enabled": false}"#)
            .unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.backoff.baseline_secs, 30);
        assert_eq!(settings.backoff.failure_secs, 10);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.history_file(), None);
        assert_eq!(settings.monitor_config().backoff.baseline_secs, 30);
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
        assert_eq!(
            Settings::load_from(&dir.path().join("missing.json")),
            Settings::default()
        );
    }

    #[test]
    fn test_explicit_history_path() {
        let settings = Settings {
            history_path: Some(PathBuf::from("/tmp/clicks.csv")),
            ..Default::default()
        };
        assert_eq!(settings.history_file(), Some(PathBuf::from("/tmp/clicks.csv")));
    }
}
