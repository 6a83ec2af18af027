//! Cache configuration.
//!
//! Controls the read-through cache via the `[cache]` section of `delivery-cache.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_SLIDING_EXPIRATION_SECS: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the read-through cache. When off, every read goes upstream.
    pub enabled: bool,
    /// Idle time after which an entry expires (reset on every hit).
    pub sliding_expiration_secs: u64,
    /// Interval for the background sweeper that reclaims dead entries and tags.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sliding_expiration_secs: DEFAULT_SLIDING_EXPIRATION_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            sliding_expiration_secs: settings.sliding_expiration.as_secs(),
            sweep_interval_secs: settings.sweep_interval.as_secs(),
        }
    }
}

impl CacheConfig {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Sliding window, clamped to at least one second.
    pub fn sliding_expiration(&self) -> Duration {
        Duration::from_secs(self.sliding_expiration_secs.max(1))
    }

    /// Sweep interval, clamped to at least one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.sliding_expiration_secs, 60);
        assert_eq!(config.sweep_interval_secs, 300);
    }

    #[test]
    fn is_disabled_when_off() {
        let config = CacheConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!config.is_enabled());
    }

    #[test]
    fn durations_clamp_to_one_second() {
        let config = CacheConfig {
            sliding_expiration_secs: 0,
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.sliding_expiration(), Duration::from_secs(1));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }
}
