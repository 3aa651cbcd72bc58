//! Call signaling and quota configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::call::{DEFAULT_PER_CALL_CEILING_SECS, DEFAULT_RING_TIMEOUT};
use crate::domain::chat::DEFAULT_MAX_MESSAGE_LEN;
use crate::domain::quota::DEFAULT_MONTHLY_CAP_SECS;

/// Timers and limits for the call handshake, live sessions and chat.
///
/// The monthly cap and the per-call ceiling default to the same five
/// minutes but are independent settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CallsConfig {
    /// Seconds a Pending invitation rings before it is Missed
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_secs: u64,

    /// Monthly call budget per matched pair
    #[serde(default = "default_monthly_cap")]
    pub monthly_cap_secs: u32,

    /// Absolute ceiling for a single call
    #[serde(default = "default_per_call_ceiling")]
    pub per_call_ceiling_secs: u32,

    /// Remaining-budget threshold for `quota_warning`
    #[serde(default = "default_quota_warning")]
    pub quota_warning_secs: u32,

    /// Expiry sweep period
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Session tick period
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Maximum chat message length in characters
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl CallsConfig {
    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate call configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ring_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("ring_timeout_secs"));
        }
        if self.monthly_cap_secs == 0 {
            return Err(ValidationError::ZeroDuration("monthly_cap_secs"));
        }
        if self.per_call_ceiling_secs == 0 {
            return Err(ValidationError::ZeroDuration("per_call_ceiling_secs"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration("sweep_interval_ms"));
        }
        if self.tick_interval_ms == 0 {
            return Err(ValidationError::ZeroDuration("tick_interval_ms"));
        }
        if self.quota_warning_secs >= self.monthly_cap_secs {
            return Err(ValidationError::WarningAboveCap);
        }
        if self.max_message_len == 0 {
            return Err(ValidationError::InvalidMessageLength);
        }
        Ok(())
    }
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            ring_timeout_secs: default_ring_timeout(),
            monthly_cap_secs: default_monthly_cap(),
            per_call_ceiling_secs: default_per_call_ceiling(),
            quota_warning_secs: default_quota_warning(),
            sweep_interval_ms: default_sweep_interval(),
            tick_interval_ms: default_tick_interval(),
            max_message_len: default_max_message_len(),
        }
    }
}

fn default_ring_timeout() -> u64 {
    DEFAULT_RING_TIMEOUT.as_secs()
}

fn default_monthly_cap() -> u32 {
    DEFAULT_MONTHLY_CAP_SECS
}

fn default_per_call_ceiling() -> u32 {
    DEFAULT_PER_CALL_CEILING_SECS
}

fn default_quota_warning() -> u32 {
    60
}

fn default_sweep_interval() -> u64 {
    1000
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_max_message_len() -> usize {
    DEFAULT_MAX_MESSAGE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_config_defaults() {
        let config = CallsConfig::default();
        assert_eq!(config.ring_timeout(), Duration::from_secs(60));
        assert_eq!(config.monthly_cap_secs, 300);
        assert_eq!(config.per_call_ceiling_secs, 300);
        assert_eq!(config.quota_warning_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_ring_timeout_rejected() {
        let config = CallsConfig {
            ring_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::ZeroDuration("ring_timeout_secs"))
        );
    }

    #[test]
    fn test_warning_must_be_below_cap() {
        let config = CallsConfig {
            monthly_cap_secs: 60,
            quota_warning_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::WarningAboveCap));
    }

    #[test]
    fn test_ceiling_independent_of_cap() {
        let config = CallsConfig {
            monthly_cap_secs: 600,
            per_call_ceiling_secs: 120,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
