//! Startup wakeup bridge configuration

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for the heartbeat bridge that keeps a blocked main thread live during startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeupConfig {
    /// Pause between two parked-thread checks of a single wakeup job.
    #[serde(default = "default_check_interval_millis")]
    pub check_interval_millis: u64,

    /// Checks a wakeup job performs before it gives up.
    #[serde(default = "default_max_checks")]
    pub max_checks: u32,
}

fn default_check_interval_millis() -> u64 {
    5
}

fn default_max_checks() -> u32 {
    40
}

impl Default for WakeupConfig {
    fn default() -> Self {
        Self {
            check_interval_millis: default_check_interval_millis(),
            max_checks: default_max_checks(),
        }
    }
}

impl WakeupConfig {
    /// Pause between checks.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_millis)
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.check_interval_millis == 0 {
            return Err(ConfigError::Invalid {
                field: "wakeup.check_interval_millis",
                reason: "check interval must be at least 1ms".to_string(),
            });
        }
        if self.max_checks == 0 {
            return Err(ConfigError::Invalid {
                field: "wakeup.max_checks",
                reason: "at least one check is required".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_checks_rejected() {
        let config = WakeupConfig {
            max_checks: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_validate() {
        assert!(WakeupConfig::default().validate().is_ok());
        assert_eq!(
            WakeupConfig::default().check_interval(),
            Duration::from_millis(5)
        );
    }
}
