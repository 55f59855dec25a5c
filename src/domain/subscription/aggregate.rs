//! Subscription aggregate entity.
//!
//! A Subscription links a workspace's package assignment to a recurring
//! billing period. Every mutation takes the current instant explicitly and
//! bumps `version`, which repositories use for compare-and-set writes.
//!
//! # Design Decisions
//!
//! - **Ended is final**: once `ended_at` is set every mutation fails with
//!   `AlreadyEnded`
//! - **Soft cancellation**: `cancelled_at` without `ended_at` means the
//!   subscription runs until period end
//! - **Typed history**: status log, period extensions and pending plan
//!   changes are explicit records

use crate::domain::foundation::{
    PackageAssignmentId, PackageCode, StateMachine, SubscriptionId, Timestamp, WorkspaceId,
};
use serde::{Deserialize, Serialize};

use super::{
    BillingCycle, PauseCycleGuard, PauseReason, PendingPlanChange, PeriodExtension,
    StatusTransition, SubscriptionError, SubscriptionStatus,
};

/// Reason recorded when dunning ends a subscription.
pub const NON_PAYMENT_REASON: &str = "Non-payment";

/// Where the subscription is billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReference {
    /// Gateway name, e.g. "stripe".
    pub name: String,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
}

impl GatewayReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscription_id: None,
            customer_id: None,
        }
    }

    pub fn with_subscription_id(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }

    pub fn with_customer_id(mut self, id: impl Into<String>) -> Self {
        self.customer_id = Some(id.into());
        self
    }
}

/// What `renew` does with a soft cancellation that is still pending.
///
/// Callers must choose; renewal never guesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingCancellation {
    /// Renewal wins and clears the cancellation markers.
    Supersede,

    /// The cancellation stands; renewal is refused.
    Honor,
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `current_period_end > current_period_start`
/// - `ended_at` is set only on a terminal status, and never cleared
/// - `status_history` is append-only
/// - `pause_count` only grows, except through `reset_pause_cycles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub workspace_id: WorkspaceId,

    /// Entitlement record this subscription pays for.
    pub package_assignment_id: PackageAssignmentId,

    /// Package currently billed.
    pub package_code: PackageCode,

    pub gateway: GatewayReference,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,

    /// Soft-cancellation marker; also set on terminal cancellation.
    pub cancelled_at: Option<Timestamp>,
    pub cancellation_reason: Option<String>,

    /// Set only on a terminal transition.
    pub ended_at: Option<Timestamp>,

    pub paused_at: Option<Timestamp>,
    pub pause_reason: Option<PauseReason>,

    /// Set when dunning suspended the entitlement during a non-payment pause.
    pub suspended_at: Option<Timestamp>,

    /// Voluntary pauses taken, forced ones included.
    pub pause_count: u32,

    pub status_history: Vec<StatusTransition>,
    pub period_extensions: Vec<PeriodExtension>,
    pub pending_plan_change: Option<PendingPlanChange>,

    /// Optimistic concurrency counter.
    pub version: u64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Create an active subscription whose first period starts at `now`.
    pub fn create(
        id: SubscriptionId,
        workspace_id: WorkspaceId,
        package_assignment_id: PackageAssignmentId,
        package_code: PackageCode,
        billing_cycle: BillingCycle,
        gateway: GatewayReference,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            workspace_id,
            package_assignment_id,
            package_code,
            gateway,
            status: SubscriptionStatus::Active,
            billing_cycle,
            current_period_start: now,
            current_period_end: now.add_days(billing_cycle.period_days()),
            cancelled_at: None,
            cancellation_reason: None,
            ended_at: None,
            paused_at: None,
            pause_reason: None,
            suspended_at: None,
            pause_count: 0,
            status_history: Vec::new(),
            period_extensions: Vec::new(),
            pending_plan_change: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// True while a period-end cancellation is waiting to be honoured.
    pub fn has_pending_cancellation(&self) -> bool {
        self.cancelled_at.is_some() && self.ended_at.is_none()
    }

    pub fn is_paused_for_non_payment(&self) -> bool {
        self.status == SubscriptionStatus::Paused
            && self.pause_reason == Some(PauseReason::NonPayment)
    }

    /// Whole days left in the current period, zero once it has passed.
    pub fn days_remaining(&self, now: Timestamp) -> i64 {
        self.current_period_end.whole_days_since(&now)
    }

    /// Record that the customer wants to stop at period end.
    ///
    /// Status is unchanged; a period-end sweep later calls `expire`.
    pub fn request_cancellation_at_period_end(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        self.touch(now);
        Ok(())
    }

    /// End the subscription now with status `cancelled`.
    pub fn cancel_immediately(
        &mut self,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        let reason = reason.into();
        self.transition_to(SubscriptionStatus::Cancelled, Some(&reason), now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason);
        self.ended_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Withdraw a pending cancellation.
    ///
    /// Returns `false` (and changes nothing) when there is nothing to
    /// withdraw or the period has already run out.
    pub fn resume(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_ended()?;
        if self.cancelled_at.is_none() || !self.current_period_end.is_after(&now) {
            return Ok(false);
        }
        self.cancelled_at = None;
        self.cancellation_reason = None;
        self.touch(now);
        Ok(true)
    }

    /// Roll the billing period forward by one cycle.
    ///
    /// # Errors
    ///
    /// - `RenewalNotDue` before `current_period_end`, so a repeated call
    ///   cannot extend twice
    /// - `CancellationPending` when the caller chose to honour a pending
    ///   cancellation
    /// - `InvalidTransition` from paused, incomplete or terminal statuses
    pub fn renew(
        &mut self,
        pending: PendingCancellation,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        if now.is_before(&self.current_period_end) {
            return Err(SubscriptionError::RenewalNotDue {
                period_end: self.current_period_end,
            });
        }
        if self.cancelled_at.is_some() && pending == PendingCancellation::Honor {
            return Err(SubscriptionError::CancellationPending(self.id));
        }
        if !self.status.is_renewable() {
            return Err(SubscriptionError::InvalidTransition {
                from: self.status,
                to: SubscriptionStatus::Active,
            });
        }

        self.transition_to(SubscriptionStatus::Active, Some("renewal"), now)?;
        self.current_period_start = self.current_period_end;
        self.current_period_end = self
            .current_period_end
            .add_days(self.billing_cycle.period_days());
        self.cancelled_at = None;
        self.cancellation_reason = None;
        self.touch(now);
        Ok(())
    }

    /// End the subscription with status `expired`.
    pub fn expire(&mut self, reason: Option<&str>, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        self.transition_to(SubscriptionStatus::Expired, reason, now)?;
        self.ended_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Customer or admin pause. Counts against the pause allowance.
    ///
    /// `force` skips the guard but still increments `pause_count`.
    pub fn pause_voluntarily(
        &mut self,
        guard: &PauseCycleGuard,
        force: bool,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        if !force {
            guard.check(self)?;
        }
        self.pause(PauseReason::Voluntary, now)
    }

    /// Involuntary pause from dunning. Leaves `pause_count` alone.
    pub fn pause_for_non_payment(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        self.pause(PauseReason::NonPayment, now)
    }

    fn pause(&mut self, reason: PauseReason, now: Timestamp) -> Result<(), SubscriptionError> {
        self.transition_to(SubscriptionStatus::Paused, Some(reason.as_str()), now)?;
        self.paused_at = Some(now);
        self.pause_reason = Some(reason);
        if reason == PauseReason::Voluntary {
            self.pause_count += 1;
        }
        self.touch(now);
        Ok(())
    }

    /// Return a paused subscription to active.
    pub fn unpause(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        if self.status != SubscriptionStatus::Paused {
            return Err(SubscriptionError::InvalidTransition {
                from: self.status,
                to: SubscriptionStatus::Active,
            });
        }
        self.transition_to(SubscriptionStatus::Active, Some("unpaused"), now)?;
        self.paused_at = None;
        self.pause_reason = None;
        self.suspended_at = None;
        self.touch(now);
        Ok(())
    }

    /// Move to past_due after a failed charge.
    ///
    /// A voluntary pause ends here so dunning can escalate the debt; its
    /// `pause_count` is kept. Returns `false` when the status stays as it
    /// is (already past due, paused for non-payment, or incomplete).
    pub fn mark_past_due(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_ended()?;
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => {
                self.transition_to(SubscriptionStatus::PastDue, Some("payment_failed"), now)?;
                self.touch(now);
                Ok(true)
            }
            SubscriptionStatus::Paused if self.pause_reason != Some(PauseReason::NonPayment) => {
                self.transition_to(SubscriptionStatus::PastDue, Some("payment_failed"), now)?;
                self.paused_at = None;
                self.pause_reason = None;
                self.touch(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Undo dunning after a successful charge.
    ///
    /// Paused subscriptions are unpaused and past-due ones reactivated.
    /// Returns `false` when nothing needed to change.
    pub fn recover_payment(&mut self, now: Timestamp) -> Result<bool, SubscriptionError> {
        self.ensure_not_ended()?;
        match self.status {
            SubscriptionStatus::Paused => {
                self.unpause(now)?;
                Ok(true)
            }
            SubscriptionStatus::PastDue => {
                self.transition_to(SubscriptionStatus::Active, Some("payment_recovered"), now)?;
                self.touch(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Note that dunning suspended the entitlement. Status stays paused.
    pub fn mark_workspace_suspended(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        if !self.is_paused_for_non_payment() {
            return Err(SubscriptionError::validation(
                "status",
                "only subscriptions paused for non-payment can be suspended",
            ));
        }
        self.suspended_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Terminal dunning outcome: expired with a non-payment reason.
    pub fn cancel_for_non_payment(&mut self, now: Timestamp) -> Result<(), SubscriptionError> {
        self.ensure_not_ended()?;
        self.transition_to(SubscriptionStatus::Expired, Some("non_payment"), now)?;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(NON_PAYMENT_REASON.to_string());
        self.ended_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Push `current_period_end` out by `days`.
    pub fn extend_period(
        &mut self,
        days: u32,
        reason: impl Into<String>,
        now: Timestamp,
    ) -> Result<PeriodExtension, SubscriptionError> {
        self.ensure_not_ended()?;
        if days == 0 {
            return Err(SubscriptionError::validation("days", "must be at least 1"));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(SubscriptionError::validation("reason", "cannot be empty"));
        }

        let extension = PeriodExtension {
            days,
            reason,
            previous_period_end: self.current_period_end,
            new_period_end: self.current_period_end.add_days(i64::from(days)),
            extended_at: now,
        };
        self.current_period_end = extension.new_period_end;
        self.period_extensions.push(extension.clone());
        self.touch(now);
        Ok(extension)
    }

    /// Restore the full pause allowance. Returns the count that was cleared.
    pub fn reset_pause_cycles(&mut self, now: Timestamp) -> Result<u32, SubscriptionError> {
        self.ensure_not_ended()?;
        let previous = self.pause_count;
        self.pause_count = 0;
        self.touch(now);
        Ok(previous)
    }

    /// Switch the billed package now. Period boundaries are untouched and
    /// any scheduled change is dropped.
    pub fn change_package(
        &mut self,
        to: PackageCode,
        now: Timestamp,
    ) -> Result<PackageCode, SubscriptionError> {
        self.ensure_not_ended()?;
        self.ensure_different_package(&to)?;
        let previous = std::mem::replace(&mut self.package_code, to);
        self.pending_plan_change = None;
        self.touch(now);
        Ok(previous)
    }

    /// Record a change to apply at period end, replacing any earlier one.
    pub fn schedule_plan_change(
        &mut self,
        to: PackageCode,
        prorate: bool,
        now: Timestamp,
    ) -> Result<PendingPlanChange, SubscriptionError> {
        self.ensure_not_ended()?;
        self.ensure_different_package(&to)?;
        let pending = PendingPlanChange {
            to_package_code: to,
            requested_at: now,
            prorate,
        };
        self.pending_plan_change = Some(pending.clone());
        self.touch(now);
        Ok(pending)
    }

    /// Remove and return the scheduled change, if any.
    pub fn take_pending_plan_change(
        &mut self,
        now: Timestamp,
    ) -> Result<Option<PendingPlanChange>, SubscriptionError> {
        self.ensure_not_ended()?;
        let pending = self.pending_plan_change.take();
        if pending.is_some() {
            self.touch(now);
        }
        Ok(pending)
    }

    fn ensure_not_ended(&self) -> Result<(), SubscriptionError> {
        if self.is_ended() {
            return Err(SubscriptionError::AlreadyEnded(self.id));
        }
        Ok(())
    }

    fn ensure_different_package(&self, to: &PackageCode) -> Result<(), SubscriptionError> {
        if *to == self.package_code {
            return Err(SubscriptionError::validation(
                "package_code",
                format!("subscription is already on package {}", to),
            ));
        }
        Ok(())
    }

    /// Validated status change; appends to history when the status moves.
    fn transition_to(
        &mut self,
        target: SubscriptionStatus,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<(), SubscriptionError> {
        let next = self
            .status
            .transition_to(target)
            .map_err(|_| SubscriptionError::InvalidTransition {
                from: self.status,
                to: target,
            })?;
        if next != self.status {
            self.status_history.push(StatusTransition {
                from: self.status,
                to: next,
                at: now,
                reason: reason.map(str::to_string),
            });
        }
        self.status = next;
        Ok(())
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.version += 1;
    }
}
