//! Pacing configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the adaptive rate controller
///
/// The upstream provider's real thresholds are undocumented; these defaults
/// approximate them and are expected to be tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Nominal spacing between call starts
    #[serde(rename = "base-interval-ms")]
    pub base_interval_ms: u64,

    /// Spacing applied when the burst window fills up
    #[serde(rename = "burst-interval-ms")]
    pub burst_interval_ms: u64,

    /// Spacing applied when the sustained window fills up
    #[serde(rename = "sustained-interval-ms")]
    pub sustained_interval_ms: u64,

    /// Hard upper bound on spacing
    #[serde(rename = "max-interval-ms")]
    pub max_interval_ms: u64,

    #[serde(rename = "burst-window-secs")]
    pub burst_window_secs: u64,

    /// Call starts within the burst window that trigger the burst tier
    #[serde(rename = "burst-ceiling")]
    pub burst_ceiling: usize,

    #[serde(rename = "sustained-window-secs")]
    pub sustained_window_secs: u64,

    /// Call starts within the sustained window that trigger the sustained tier
    #[serde(rename = "sustained-ceiling")]
    pub sustained_ceiling: usize,

    /// How long call-start timestamps are retained
    #[serde(rename = "history-window-secs")]
    pub history_window_secs: u64,

    /// Multiplier applied on explicit throttle feedback
    #[serde(rename = "throttle-factor")]
    pub throttle_factor: f64,

    /// Multiplier applied after each successful call while above base
    #[serde(rename = "success-decay")]
    pub success_decay: f64,

    /// Multiplier applied per evaluation when neither window is full
    #[serde(rename = "window-decay")]
    pub window_decay: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 1200,
            burst_interval_ms: 2000,
            sustained_interval_ms: 2500,
            max_interval_ms: 10_000,
            burst_window_secs: 30,
            burst_ceiling: 15,
            sustained_window_secs: 60,
            sustained_ceiling: 40,
            history_window_secs: 120,
            throttle_factor: 1.5,
            success_decay: 0.8,
            window_decay: 0.9,
        }
    }
}

impl PacingConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_millis(self.base_interval_ms)
    }

    pub fn burst_interval(&self) -> Duration {
        Duration::from_millis(self.burst_interval_ms)
    }

    pub fn sustained_interval(&self) -> Duration {
        Duration::from_millis(self.sustained_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn burst_window(&self) -> Duration {
        Duration::from_secs(self.burst_window_secs)
    }

    pub fn sustained_window(&self) -> Duration {
        Duration::from_secs(self.sustained_window_secs)
    }

    pub fn history_window(&self) -> Duration {
        Duration::from_secs(self.history_window_secs)
    }
}
