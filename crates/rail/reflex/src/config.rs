//! Reflex action configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied when an action is invoked without an explicit cooldown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    /// How long a suspended job stays suspended.
    pub suspend_cooldown_secs: u64,

    /// Length of a throttle window.
    pub throttle_cooldown_secs: u64,

    /// Fraction of the normal rate allowed while throttled.
    pub throttle_rate_factor: f64,
}

impl ReflexConfig {
    pub fn suspend_cooldown(&self) -> Duration {
        Duration::from_secs(self.suspend_cooldown_secs)
    }

    pub fn throttle_cooldown(&self) -> Duration {
        Duration::from_secs(self.throttle_cooldown_secs)
    }
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            suspend_cooldown_secs: 300,
            throttle_cooldown_secs: 120,
            throttle_rate_factor: 0.5,
        }
    }
}
