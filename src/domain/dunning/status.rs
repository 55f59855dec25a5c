//! Read-only dunning projection for reporting.

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use serde::{Deserialize, Serialize};

use super::{DunningPolicy, Invoice};

/// How far dunning has escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DunningStage {
    None,
    Retry,
    Paused,
    Suspended,
}

/// What dunning will do next, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NextAction {
    None,
    RetryCharge { at: Timestamp },
    Pause { at: Timestamp },
    Suspend { at: Timestamp },
    Cancel { at: Timestamp },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningStatus {
    pub stage: DunningStage,
    pub days_overdue: i64,
    pub next_action: NextAction,
}

impl DunningStatus {
    /// Derive the status from the subscription, its latest overdue invoice
    /// and the policy. Never mutates anything.
    pub fn project(
        subscription: &Subscription,
        latest_overdue: Option<&Invoice>,
        policy: &DunningPolicy,
        now: Timestamp,
    ) -> Self {
        let latest_overdue = latest_overdue.filter(|invoice| !invoice.status.is_settled());
        let days_overdue = latest_overdue
            .map(|invoice| now.whole_days_since(&invoice.due_at))
            .unwrap_or(0);

        if subscription.is_ended() {
            return Self {
                stage: DunningStage::None,
                days_overdue,
                next_action: NextAction::None,
            };
        }

        if subscription.is_paused_for_non_payment() {
            let paused_at = subscription.paused_at.unwrap_or(subscription.updated_at);
            return match subscription.suspended_at {
                Some(_) => Self {
                    stage: DunningStage::Suspended,
                    days_overdue,
                    next_action: NextAction::Cancel {
                        at: policy.cancellation_due_at(paused_at),
                    },
                },
                None => Self {
                    stage: DunningStage::Paused,
                    days_overdue,
                    next_action: NextAction::Suspend {
                        at: policy.suspension_due_at(paused_at),
                    },
                },
            };
        }

        let in_retry = subscription.status == SubscriptionStatus::PastDue || latest_overdue.is_some();
        if !in_retry {
            return Self {
                stage: DunningStage::None,
                days_overdue: 0,
                next_action: NextAction::None,
            };
        }

        let next_action = match latest_overdue {
            Some(invoice) => match (invoice.next_charge_attempt, invoice.last_charge_attempt) {
                (Some(at), _) => NextAction::RetryCharge { at },
                (None, Some(last)) => NextAction::Pause {
                    at: policy.pause_due_at(last),
                },
                (None, None) => NextAction::None,
            },
            None => NextAction::None,
        };

        Self {
            stage: DunningStage::Retry,
            days_overdue,
            next_action,
        }
    }
}
