//! Dunning sweep scheduling configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SweepConfig {
    /// Seconds between sweep passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum rows fetched per sweep query
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        if self.batch_limit == 0 {
            return Err(ValidationError::InvalidBatchLimit);
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_limit: default_batch_limit(),
        }
    }
}

fn default_interval_secs() -> u64 {
    3600
}

fn default_batch_limit() -> usize {
    500
}
