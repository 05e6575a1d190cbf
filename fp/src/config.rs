//! Configuration types for farepacer

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::CacheConfig;
use crate::scheduler::SchedulerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); the CLI flag wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Scheduler, retry, pacing and cancellation settings
    pub scheduler: SchedulerConfig,

    /// Result cache settings
    pub cache: CacheConfig,
}

impl Config {
    /// Check for settings that would stall or break the scheduler
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent == 0 {
            return Err(eyre::eyre!("scheduler.max-concurrent must be at least 1"));
        }
        if self.cache.capacity == 0 {
            return Err(eyre::eyre!("cache.capacity must be at least 1"));
        }
        let pacing = &self.scheduler.pacing;
        if pacing.base_interval_ms > pacing.max_interval_ms {
            return Err(eyre::eyre!(
                "scheduler.pacing.base-interval-ms ({}) exceeds max-interval-ms ({})",
                pacing.base_interval_ms,
                pacing.max_interval_ms
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .farepacer.yml
        let local_config = PathBuf::from(".farepacer.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/farepacer/farepacer.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("farepacer").join("farepacer.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.log_level, None);
        assert_eq!(config.scheduler.max_concurrent, 3);
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.capacity, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

scheduler:
  max-concurrent: 2
  job-timeout-ms: 45000
  retry:
    max-retries: 5
    base-backoff-ms: 1000
    max-backoff-ms: 16000
  pacing:
    base-interval-ms: 800
    max-interval-ms: 6000
    throttle-factor: 2.0
  cancellation:
    user-expiry-secs: 120

cache:
  ttl-secs: 600
  capacity: 500
  sweep-interval-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert_eq!(config.scheduler.job_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(config.scheduler.retry.max_retries, 5);
        assert_eq!(config.scheduler.retry.max_backoff_ms, 16000);
        assert_eq!(config.scheduler.pacing.base_interval_ms, 800);
        assert_eq!(config.scheduler.pacing.throttle_factor, 2.0);
        assert_eq!(config.scheduler.cancellation.user_expiry_secs, 120);
        assert_eq!(config.scheduler.cancellation.completion_expiry_secs, 60);
        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.cache.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
cache:
  ttl-secs: 60
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.cache.ttl_secs, 60);

        // Defaults for unspecified
        assert_eq!(config.cache.capacity, 100_000);
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.scheduler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.cache.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_intervals() {
        let mut config = Config::default();
        config.scheduler.pacing.base_interval_ms = 20_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max-interval-ms"));
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduler:\n  max-concurrent: 7").unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 7);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
