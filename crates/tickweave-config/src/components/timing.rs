//! Host tick timing

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Length of one host tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Milliseconds per tick. A vanilla game server ticks every 50ms.
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,
}

fn default_tick_millis() -> u64 {
    50
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
        }
    }
}

impl TimingConfig {
    /// Duration of a single tick.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    /// Duration of `n` ticks, saturating on overflow.
    pub fn ticks(&self, n: u64) -> Duration {
        Duration::from_millis(self.tick_millis.saturating_mul(n))
    }

    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.tick_millis == 0 {
            return Err(ConfigError::Invalid {
                field: "timing.tick_millis",
                reason: "tick length must be at least 1ms".to_string(),
            });
        }
        Ok(())
    }
}
