//! Cancellation registry configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long cancellation records are retained
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CancellationConfig {
    /// Retention for user-initiated cancellations
    #[serde(rename = "user-expiry-secs")]
    pub user_expiry_secs: u64,

    /// Retention for sessions that completed normally
    #[serde(rename = "completion-expiry-secs")]
    pub completion_expiry_secs: u64,
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            user_expiry_secs: 300,
            completion_expiry_secs: 60,
        }
    }
}

impl CancellationConfig {
    pub fn user_expiry(&self) -> Duration {
        Duration::from_secs(self.user_expiry_secs)
    }

    pub fn completion_expiry(&self) -> Duration {
        Duration::from_secs(self.completion_expiry_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CancellationConfig::default();
        assert_eq!(config.user_expiry(), Duration::from_secs(300));
        assert_eq!(config.completion_expiry(), Duration::from_secs(60));
    }
}
