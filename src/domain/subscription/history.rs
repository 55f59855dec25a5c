//! Typed records kept alongside a subscription.
//!
//! These replace a free-form metadata blob: each one is persisted in its
//! own column so it can be queried and validated.

use crate::domain::foundation::{PackageCode, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::SubscriptionStatus;

/// One entry in the append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A manual push of `current_period_end` (goodwill credit, outage compensation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodExtension {
    pub days: u32,
    pub reason: String,
    pub previous_period_end: Timestamp,
    pub new_period_end: Timestamp,
    pub extended_at: Timestamp,
}

/// A plan change waiting for the period-end sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlanChange {
    pub to_package_code: PackageCode,
    pub requested_at: Timestamp,
    pub prorate: bool,
}

/// Why a subscription is paused.
///
/// Dunning escalation only ever acts on `NonPayment` pauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Customer or admin asked for it; counts against the pause allowance.
    Voluntary,

    /// Dunning exhausted its retries.
    NonPayment,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::Voluntary => "voluntary",
            PauseReason::NonPayment => "non_payment",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PauseReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voluntary" => Ok(PauseReason::Voluntary),
            "non_payment" => Ok(PauseReason::NonPayment),
            other => Err(format!("unknown pause reason '{}'", other)),
        }
    }
}
