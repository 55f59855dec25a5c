//! Billing and dunning configuration

use serde::{Deserialize, Deserializer};

use super::error::ValidationError;
use crate::domain::dunning::DunningPolicy;
use crate::domain::subscription::PauseCycleGuard;

/// Billing configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BillingConfig {
    /// Voluntary pauses allowed before an override is needed. Zero
    /// disables self-service pausing.
    #[serde(default = "default_max_pause_cycles")]
    pub max_pause_cycles: u32,

    #[serde(default)]
    pub dunning: DunningConfig,
}

impl BillingConfig {
    pub fn pause_guard(&self) -> PauseCycleGuard {
        PauseCycleGuard::new(self.max_pause_cycles)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.dunning.validate()
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_pause_cycles: default_max_pause_cycles(),
            dunning: DunningConfig::default(),
        }
    }
}

/// Dunning timing configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DunningConfig {
    /// Days before each retry, e.g. `1,3,7`
    #[serde(default = "default_retry_days", deserialize_with = "deserialize_day_list")]
    pub retry_days: Vec<u32>,

    #[serde(default = "default_initial_grace_hours")]
    pub initial_grace_hours: u32,

    #[serde(default = "default_pause_grace_days")]
    pub pause_grace_days: u32,

    #[serde(default = "default_suspend_after_days")]
    pub suspend_after_days: u32,

    #[serde(default = "default_cancel_after_days")]
    pub cancel_after_days: u32,
}

impl DunningConfig {
    pub fn policy(&self) -> DunningPolicy {
        DunningPolicy {
            retry_days: self.retry_days.clone(),
            initial_grace_hours: self.initial_grace_hours,
            pause_grace_days: self.pause_grace_days,
            suspend_after_days: self.suspend_after_days,
            cancel_after_days: self.cancel_after_days,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.retry_days.is_empty() {
            return Err(ValidationError::EmptyRetrySchedule);
        }
        if self.retry_days.contains(&0) {
            return Err(ValidationError::ZeroRetryDelay);
        }
        if self.retry_days.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(ValidationError::UnsortedRetrySchedule);
        }
        if self.cancel_after_days <= self.suspend_after_days {
            return Err(ValidationError::CancelBeforeSuspend {
                suspend: self.suspend_after_days,
                cancel: self.cancel_after_days,
            });
        }
        Ok(())
    }
}

impl Default for DunningConfig {
    fn default() -> Self {
        Self {
            retry_days: default_retry_days(),
            initial_grace_hours: default_initial_grace_hours(),
            pause_grace_days: default_pause_grace_days(),
            suspend_after_days: default_suspend_after_days(),
            cancel_after_days: default_cancel_after_days(),
        }
    }
}

/// Accepts either a list or a comma-separated string, since environment
/// variables can only carry the latter.
fn deserialize_day_list<'de, D>(deserializer: D) -> Result<Vec<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DayList {
        List(Vec<u32>),
        Text(String),
    }

    match DayList::deserialize(deserializer)? {
        DayList::List(days) => Ok(days),
        DayList::Text(text) => parse_day_list(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_day_list(text: &str) -> Result<Vec<u32>, String> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|e| format!("invalid retry day '{}': {}", part, e))
        })
        .collect()
}

fn default_max_pause_cycles() -> u32 {
    3
}

fn default_retry_days() -> Vec<u32> {
    vec![1, 3, 7]
}

fn default_initial_grace_hours() -> u32 {
    24
}

fn default_pause_grace_days() -> u32 {
    1
}

fn default_suspend_after_days() -> u32 {
    14
}

fn default_cancel_after_days() -> u32 {
    30
}
