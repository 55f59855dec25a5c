//! Retry schedule and escalation thresholds.

use crate::domain::foundation::Timestamp;
use serde::{Deserialize, Serialize};

use super::Invoice;

/// Timing rules for dunning escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DunningPolicy {
    /// Days to wait before each automatic retry, in order.
    pub retry_days: Vec<u32>,

    /// Minimum wait before the first retry after an initial failure.
    pub initial_grace_hours: u32,

    /// Extra days after the last retry before pausing.
    pub pause_grace_days: u32,

    /// Days paused before the entitlement is suspended.
    pub suspend_after_days: u32,

    /// Days paused before the subscription is ended.
    pub cancel_after_days: u32,
}

impl Default for DunningPolicy {
    fn default() -> Self {
        Self {
            retry_days: vec![1, 3, 7],
            initial_grace_hours: 24,
            pause_grace_days: 1,
            suspend_after_days: 14,
            cancel_after_days: 30,
        }
    }
}

impl DunningPolicy {
    /// When to retry after failed attempt number `attempt_index` (0-based).
    ///
    /// `None` once the schedule is used up.
    pub fn calculate_next_retry(&self, attempt_index: usize, now: Timestamp) -> Option<Timestamp> {
        self.retry_days
            .get(attempt_index)
            .map(|days| now.add_days(i64::from(*days)))
    }

    /// First retry after an initial failure. The grace window never
    /// shortens the first configured delay.
    pub fn calculate_initial_retry(&self, now: Timestamp) -> Timestamp {
        let first_retry_hours = self.retry_days.first().copied().unwrap_or(0) * 24;
        now.add_hours(i64::from(self.initial_grace_hours.max(first_retry_hours)))
    }

    /// Length of the whole retry schedule in days.
    pub fn retry_window_days(&self) -> i64 {
        self.retry_days.iter().map(|d| i64::from(*d)).sum()
    }

    /// Moment after which an exhausted invoice triggers a pause.
    pub fn pause_due_at(&self, last_charge_attempt: Timestamp) -> Timestamp {
        last_charge_attempt.add_days(self.retry_window_days() + i64::from(self.pause_grace_days))
    }

    /// True when the invoice has no retries left and the window has passed.
    pub fn is_pause_due(&self, invoice: &Invoice, now: Timestamp) -> bool {
        invoice.retries_exhausted()
            && invoice
                .last_charge_attempt
                .is_some_and(|last| self.pause_due_at(last).is_before(&now))
    }

    pub fn suspension_due_at(&self, paused_at: Timestamp) -> Timestamp {
        paused_at.add_days(i64::from(self.suspend_after_days))
    }

    pub fn cancellation_due_at(&self, paused_at: Timestamp) -> Timestamp {
        paused_at.add_days(i64::from(self.cancel_after_days))
    }

    /// Pauses that started before this instant are due for suspension.
    pub fn suspension_cutoff(&self, now: Timestamp) -> Timestamp {
        now.minus_days(i64::from(self.suspend_after_days))
    }

    /// Pauses that started before this instant are due for cancellation.
    pub fn cancellation_cutoff(&self, now: Timestamp) -> Timestamp {
        now.minus_days(i64::from(self.cancel_after_days))
    }
}
