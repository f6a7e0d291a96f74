//! Adaptive delay between monitor cycles
//!
//! | State          | Entered when                                   | Default |
//! |----------------|------------------------------------------------|---------|
//! | `Startup`      | before the first cycle                         | 0 s     |
//! | `Baseline`     | a cycle connected and polled successfully      | 60 s    |
//! | `Establishing` | no role established yet, or first empty scan   | 1 s     |
//! | `Hotplug`      | a cycle succeeded right after a hotplug event  | 1 s     |
//! | `Failure`      | connect or poll failed, or nothing to connect  | 10 s    |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackoffState {
    Startup,
    Baseline,
    Establishing,
    Hotplug,
    Failure,
}

impl BackoffState {
    pub fn name(&self) -> &'static str {
        match self {
            BackoffState::Startup => "startup",
            BackoffState::Baseline => "baseline",
            BackoffState::Establishing => "establishing",
            BackoffState::Hotplug => "hotplug",
            BackoffState::Failure => "failure",
        }
    }
}

impl std::fmt::Display for BackoffState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Delay for each backoff state, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub baseline_secs: u64,
    pub establishing_secs: u64,
    pub hotplug_secs: u64,
    pub failure_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            baseline_secs: 60,
            establishing_secs: 1,
            hotplug_secs: 1,
            failure_secs: 10,
        }
    }
}

impl BackoffConfig {
    pub fn delay(&self, state: BackoffState) -> Duration {
        let secs = match state {
            BackoffState::Startup => 0,
            BackoffState::Baseline => self.baseline_secs,
            BackoffState::Establishing => self.establishing_secs,
            BackoffState::Hotplug => self.hotplug_secs,
            BackoffState::Failure => self.failure_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Current backoff state and the transitions between states
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    state: BackoffState,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            state: BackoffState::Startup,
        }
    }

    pub fn state(&self) -> BackoffState {
        self.state
    }

    /// How long to sleep before the next cycle
    pub fn wait_time(&self) -> Duration {
        self.config.delay(self.state)
    }

    /// A cycle connected and polled successfully
    pub fn on_success(&mut self, after_hotplug: bool) {
        self.enter(if after_hotplug {
            BackoffState::Hotplug
        } else {
            BackoffState::Baseline
        });
    }

    /// Connected, but the device has not announced its role
    pub fn on_unidentified(&mut self) {
        self.enter(BackoffState::Establishing);
    }

    /// Connect or poll failed
    pub fn on_failure(&mut self) {
        self.enter(BackoffState::Failure);
    }

    /// Scan found nothing to connect to
    ///
    /// The first empty scan retries quickly; later ones back off.
    pub fn on_no_candidate(&mut self, first_attempt: bool) {
        self.enter(if first_attempt {
            BackoffState::Establishing
        } else {
            BackoffState::Failure
        });
    }

    fn enter(&mut self, state: BackoffState) {
        if self.state != state {
            debug!(
                "Backoff {} -> {} ({:?})",
                self.state,
                state,
                self.config.delay(state)
            );
            self.state = state;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}
