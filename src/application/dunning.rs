//! DunningEngine - Payment failure recovery.
//!
//! Drives an invoice and its subscription through
//! retry → pause → suspend → cancel.
//!
//! Sweep transitions may run on several workers at once. Each one reloads
//! its row, re-checks the predicate, and writes with a version
//! compare-and-set. A worker that loses the race reports `Skipped` and
//! sends nothing.
//!
//! Gateway signals write the invoice first and then the subscription. The
//! subscription write is reapplied on a fresh copy when it loses a race, so
//! the two stay in step.

use std::sync::Arc;

use crate::domain::dunning::{
    DunningNotification, DunningPolicy, DunningStatus, Invoice, InvoiceStatus,
};
use crate::domain::foundation::{DomainError, InvoiceId, SubscriptionId, Timestamp};
use crate::domain::subscription::{
    PauseReason, Subscription, SubscriptionError, SubscriptionEvent, SubscriptionEventKind,
    SubscriptionStatus, NON_PAYMENT_REASON,
};
use crate::ports::{
    Clock, EntitlementService, EventPublisher, InvoiceRepository, NotificationDispatcher,
    SubscriptionRepository,
};

use super::publish_event;

/// Default cap on rows fetched by one sweep query.
pub const DEFAULT_BATCH_LIMIT: usize = 500;

/// Attempts at a subscription write before giving up on a busy row.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Result of a dunning transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DunningOutcome {
    Applied,
    Skipped { reason: &'static str },
}

impl DunningOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, DunningOutcome::Applied)
    }
}

pub struct DunningEngine {
    subscriptions: Arc<dyn SubscriptionRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    entitlements: Arc<dyn EntitlementService>,
    notifications: Arc<dyn NotificationDispatcher>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    policy: DunningPolicy,
    batch_limit: usize,
}

impl DunningEngine {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        entitlements: Arc<dyn EntitlementService>,
        notifications: Arc<dyn NotificationDispatcher>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        policy: DunningPolicy,
    ) -> Self {
        Self {
            subscriptions,
            invoices,
            entitlements,
            notifications,
            events,
            clock,
            policy,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn policy(&self) -> &DunningPolicy {
        &self.policy
    }

    // ────────────────────────────────────────────────────────────────────────
    // Retry schedule
    // ────────────────────────────────────────────────────────────────────────

    pub fn calculate_next_retry(&self, attempt_index: usize) -> Option<Timestamp> {
        self.policy
            .calculate_next_retry(attempt_index, self.clock.now())
    }

    pub fn calculate_initial_retry(&self) -> Timestamp {
        self.policy.calculate_initial_retry(self.clock.now())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Gateway signals
    // ────────────────────────────────────────────────────────────────────────

    /// Record a failed charge and move the subscription to past_due.
    ///
    /// Attempt `n` is retried after `retry_days[n - 1]`; once the schedule
    /// runs out no retry is booked.
    pub async fn handle_payment_failure(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<DunningOutcome, SubscriptionError> {
        let mut invoice = self.load_invoice(invoice_id).await?;
        if invoice.status.is_settled() {
            tracing::debug!(invoice_id = %invoice_id, status = %invoice.status, "Ignoring failure for settled invoice");
            return Ok(DunningOutcome::Skipped {
                reason: "invoice already settled",
            });
        }

        let now = self.clock.now();
        let expected = invoice.version;
        let attempt_index = invoice.record_failed_charge(now);
        let next_attempt = self.policy.calculate_next_retry(attempt_index, now);
        invoice.schedule_next_attempt(next_attempt);

        if let Some(outcome) = skip_on_conflict(
            self.invoices.update(&invoice, expected).await,
            "invoice changed concurrently",
        )? {
            return Ok(outcome);
        }

        tracing::info!(
            invoice_id = %invoice.id,
            subscription_id = %invoice.subscription_id,
            charge_attempts = invoice.charge_attempts,
            next_charge_attempt = ?next_attempt,
            "Payment failure recorded"
        );

        let subscription = self.mark_past_due(invoice.subscription_id, now).await?;

        self.notify(DunningNotification::PaymentFailed {
            subscription_id: subscription.id,
            workspace_id: subscription.workspace_id,
            invoice_id: invoice.id,
            amount_due: invoice.amount_due,
            currency: invoice.currency.clone(),
            charge_attempts: invoice.charge_attempts,
            next_charge_attempt: invoice.next_charge_attempt,
        })
        .await;
        self.publish(
            &subscription,
            SubscriptionEventKind::PaymentFailed {
                invoice_id: invoice.id,
                charge_attempts: invoice.charge_attempts,
                next_charge_attempt: invoice.next_charge_attempt,
            },
        )
        .await;
        Ok(DunningOutcome::Applied)
    }

    /// Settle the invoice and undo dunning on the subscription.
    ///
    /// Safe to call again for a paid invoice: if an earlier call settled the
    /// invoice but could not write the subscription, the subscription is
    /// restored now.
    pub async fn handle_payment_recovery(
        &self,
        invoice_id: InvoiceId,
    ) -> Result<DunningOutcome, SubscriptionError> {
        let mut invoice = self.load_invoice(invoice_id).await?;
        if invoice.status.is_settled() {
            return self.finish_interrupted_recovery(&invoice).await;
        }

        let now = self.clock.now();
        let expected = invoice.version;
        invoice.mark_paid(now);
        if let Some(outcome) = skip_on_conflict(
            self.invoices.update(&invoice, expected).await,
            "invoice changed concurrently",
        )? {
            return Ok(outcome);
        }
        tracing::info!(invoice_id = %invoice.id, subscription_id = %invoice.subscription_id, "Payment recovered");

        self.restore_after_payment(&invoice, now).await?;
        Ok(DunningOutcome::Applied)
    }

    /// Paid invoice whose subscription is still in dunning with nothing
    /// else overdue: the subscription write of an earlier recovery was lost.
    async fn finish_interrupted_recovery(
        &self,
        invoice: &Invoice,
    ) -> Result<DunningOutcome, SubscriptionError> {
        const SETTLED: DunningOutcome = DunningOutcome::Skipped {
            reason: "invoice already settled",
        };
        if invoice.status != InvoiceStatus::Paid {
            return Ok(SETTLED);
        }
        let subscription = self.load_subscription(invoice.subscription_id).await?;
        let in_dunning = subscription.status == SubscriptionStatus::PastDue
            || subscription.is_paused_for_non_payment();
        if !in_dunning
            || self
                .invoices
                .find_latest_overdue_for_subscription(&subscription.id)
                .await?
                .is_some()
        {
            return Ok(SETTLED);
        }

        tracing::info!(
            invoice_id = %invoice.id,
            subscription_id = %subscription.id,
            "Completing interrupted payment recovery"
        );
        if self.restore_after_payment(invoice, self.clock.now()).await? {
            Ok(DunningOutcome::Applied)
        } else {
            Ok(SETTLED)
        }
    }

    /// Undo dunning on the subscription of a paid invoice. Returns whether
    /// the subscription changed.
    async fn restore_after_payment(
        &self,
        invoice: &Invoice,
        now: Timestamp,
    ) -> Result<bool, SubscriptionError> {
        let write = self
            .rewrite_subscription(invoice.subscription_id, |subscription| {
                if subscription.is_ended() {
                    return Ok(false);
                }
                subscription.recover_payment(now)
            })
            .await?;
        let subscription = &write.after;

        if subscription.is_ended() {
            tracing::warn!(
                subscription_id = %subscription.id,
                invoice_id = %invoice.id,
                "Payment recovered for an ended subscription"
            );
            return Ok(false);
        }
        if write.changed() {
            tracing::info!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Subscription restored after payment"
            );
        }

        if write.changed() && write.before.suspended_at.is_some() {
            if let Err(err) = self
                .entitlements
                .reactivate(&subscription.package_assignment_id)
                .await
            {
                tracing::error!(subscription_id = %subscription.id, error = %err, "Failed to reactivate entitlement");
            }
        }
        self.publish(
            subscription,
            SubscriptionEventKind::PaymentRecovered {
                invoice_id: invoice.id,
            },
        )
        .await;
        Ok(write.changed())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Sweep queries
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get_invoices_due_for_retry(&self) -> Result<Vec<Invoice>, SubscriptionError> {
        Ok(self
            .invoices
            .find_due_for_retry(self.clock.now(), self.batch_limit)
            .await?)
    }

    /// Past-due subscriptions whose latest overdue invoice has used up its
    /// retries and passed the grace window.
    ///
    /// Pages through every past-due row until `batch_limit` candidates are
    /// found, so rows still inside their retry window never crowd out due
    /// ones.
    pub async fn get_subscriptions_for_pause(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        let now = self.clock.now();
        let mut eligible = Vec::new();
        let mut offset = 0;

        while eligible.len() < self.batch_limit {
            let page = self
                .subscriptions
                .find_by_status(SubscriptionStatus::PastDue, offset, self.batch_limit)
                .await?;
            let fetched = page.len();
            for subscription in page {
                if eligible.len() < self.batch_limit && self.is_pause_due(&subscription, now).await? {
                    eligible.push(subscription);
                }
            }
            if fetched < self.batch_limit {
                break;
            }
            offset += fetched;
        }
        Ok(eligible)
    }

    pub async fn get_subscriptions_for_suspension(
        &self,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let cutoff = self.policy.suspension_cutoff(self.clock.now());
        Ok(self
            .subscriptions
            .find_paused_for_suspension(cutoff, self.batch_limit)
            .await?)
    }

    pub async fn get_subscriptions_for_cancellation(
        &self,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let cutoff = self.policy.cancellation_cutoff(self.clock.now());
        Ok(self
            .subscriptions
            .find_paused_for_non_payment(cutoff, self.batch_limit)
            .await?)
    }

    // ────────────────────────────────────────────────────────────────────────
    // Escalation
    // ────────────────────────────────────────────────────────────────────────

    /// Involuntary pause. Does not touch `pause_count`.
    pub async fn pause_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<DunningOutcome, SubscriptionError> {
        let now = self.clock.now();
        let mut subscription = self.load_subscription(id).await?;
        if subscription.status != SubscriptionStatus::PastDue
            || !self.is_pause_due(&subscription, now).await?
        {
            return Ok(skipped(id, "no longer eligible for pause"));
        }

        let expected = subscription.version;
        subscription.pause_for_non_payment(now)?;
        if let Some(outcome) = skip_on_conflict(
            self.subscriptions.update(&subscription, expected).await,
            "subscription changed concurrently",
        )? {
            return Ok(outcome);
        }

        tracing::info!(subscription_id = %id, "Subscription paused for non-payment");
        self.notify(DunningNotification::SubscriptionPaused {
            subscription_id: id,
            workspace_id: subscription.workspace_id,
            paused_at: now,
        })
        .await;
        self.publish(
            &subscription,
            SubscriptionEventKind::Paused {
                reason: PauseReason::NonPayment,
                pause_count: subscription.pause_count,
            },
        )
        .await;
        Ok(DunningOutcome::Applied)
    }

    /// Suspend the entitlement. The subscription stays paused.
    ///
    /// # Errors
    ///
    /// Returns `Infrastructure` if the entitlement service fails after the
    /// suspension marker was written.
    pub async fn suspend_workspace(
        &self,
        id: SubscriptionId,
    ) -> Result<DunningOutcome, SubscriptionError> {
        let now = self.clock.now();
        let mut subscription = self.load_subscription(id).await?;
        let cutoff = self.policy.suspension_cutoff(now);
        if !paused_before(&subscription, cutoff) || subscription.suspended_at.is_some() {
            return Ok(skipped(id, "no longer eligible for suspension"));
        }

        let expected = subscription.version;
        subscription.mark_workspace_suspended(now)?;
        if let Some(outcome) = skip_on_conflict(
            self.subscriptions.update(&subscription, expected).await,
            "subscription changed concurrently",
        )? {
            return Ok(outcome);
        }

        self.entitlements
            .suspend(&subscription.package_assignment_id)
            .await
            .map_err(|err| {
                tracing::error!(subscription_id = %id, error = %err, "Failed to suspend entitlement");
                SubscriptionError::from(err)
            })?;

        tracing::info!(
            subscription_id = %id,
            package_assignment_id = %subscription.package_assignment_id,
            "Workspace suspended for non-payment"
        );
        self.notify(DunningNotification::AccountSuspended {
            subscription_id: id,
            workspace_id: subscription.workspace_id,
            suspended_at: now,
        })
        .await;
        self.publish(
            &subscription,
            SubscriptionEventKind::WorkspaceSuspended {
                package_assignment_id: subscription.package_assignment_id,
            },
        )
        .await;
        Ok(DunningOutcome::Applied)
    }

    /// End the subscription as expired for non-payment.
    pub async fn cancel_subscription(
        &self,
        id: SubscriptionId,
    ) -> Result<DunningOutcome, SubscriptionError> {
        let now = self.clock.now();
        let mut subscription = self.load_subscription(id).await?;
        let cutoff = self.policy.cancellation_cutoff(now);
        if !paused_before(&subscription, cutoff) {
            return Ok(skipped(id, "no longer eligible for cancellation"));
        }

        let expected = subscription.version;
        subscription.cancel_for_non_payment(now)?;
        if let Some(outcome) = skip_on_conflict(
            self.subscriptions.update(&subscription, expected).await,
            "subscription changed concurrently",
        )? {
            return Ok(outcome);
        }

        tracing::info!(subscription_id = %id, "Subscription cancelled for non-payment");
        if let Err(err) = self
            .entitlements
            .expire(&subscription.package_assignment_id)
            .await
        {
            tracing::error!(subscription_id = %id, error = %err, "Failed to expire entitlement");
        }
        self.notify(DunningNotification::SubscriptionCancelled {
            subscription_id: id,
            workspace_id: subscription.workspace_id,
            cancelled_at: now,
            reason: NON_PAYMENT_REASON.to_string(),
        })
        .await;
        self.publish(
            &subscription,
            SubscriptionEventKind::Cancelled {
                reason: NON_PAYMENT_REASON.to_string(),
            },
        )
        .await;
        Ok(DunningOutcome::Applied)
    }

    /// Read-only dunning projection for reporting.
    pub async fn get_dunning_status(
        &self,
        subscription: &Subscription,
    ) -> Result<DunningStatus, SubscriptionError> {
        let latest = self
            .invoices
            .find_latest_overdue_for_subscription(&subscription.id)
            .await?;
        Ok(DunningStatus::project(
            subscription,
            latest.as_ref(),
            &self.policy,
            self.clock.now(),
        ))
    }

    // ────────────────────────────────────────────────────────────────────────
    // Helpers
    // ────────────────────────────────────────────────────────────────────────

    async fn is_pause_due(
        &self,
        subscription: &Subscription,
        now: Timestamp,
    ) -> Result<bool, SubscriptionError> {
        let latest = self
            .invoices
            .find_latest_overdue_for_subscription(&subscription.id)
            .await?;
        Ok(latest.is_some_and(|invoice| self.policy.is_pause_due(&invoice, now)))
    }

    /// Move to past_due if the status allows it.
    async fn mark_past_due(
        &self,
        id: SubscriptionId,
        now: Timestamp,
    ) -> Result<Subscription, SubscriptionError> {
        let write = self
            .rewrite_subscription(id, |subscription| {
                if subscription.is_ended() {
                    return Ok(false);
                }
                subscription.mark_past_due(now)
            })
            .await?;

        if write.after.is_ended() {
            tracing::warn!(subscription_id = %id, "Payment failed for an ended subscription");
        } else if write.changed() {
            tracing::info!(subscription_id = %id, "Subscription marked past due");
        }
        Ok(write.after)
    }

    /// Apply `change` to the stored subscription and write it back.
    ///
    /// A lost compare-and-set reloads the row and applies `change` again, up
    /// to `MAX_WRITE_ATTEMPTS` times. `change` returns `false` to leave the
    /// row alone.
    async fn rewrite_subscription<F>(
        &self,
        id: SubscriptionId,
        change: F,
    ) -> Result<Rewrite, SubscriptionError>
    where
        F: Fn(&mut Subscription) -> Result<bool, SubscriptionError> + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let before = self.load_subscription(id).await?;
            let mut after = before.clone();
            if !change(&mut after)? {
                return Ok(Rewrite { before, after });
            }
            match self.subscriptions.update(&after, before.version).await {
                Ok(()) => return Ok(Rewrite { before, after }),
                Err(err) if err.is_conflict() && attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(subscription_id = %id, attempt, "Subscription changed underneath, reapplying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn load_subscription(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .find_by_id(&id)
            .await?
            .ok_or(SubscriptionError::NotFound(id))
    }

    async fn load_invoice(&self, id: InvoiceId) -> Result<Invoice, SubscriptionError> {
        self.invoices
            .find_by_id(&id)
            .await?
            .ok_or(SubscriptionError::InvoiceNotFound(id))
    }

    async fn notify(&self, notification: DunningNotification) {
        let name = notification.name();
        let subscription_id = notification.subscription_id();
        if let Err(err) = self.notifications.dispatch(notification).await {
            tracing::warn!(
                notification = name,
                subscription_id = %subscription_id,
                error = %err,
                "Failed to dispatch dunning notification"
            );
        }
    }

    async fn publish(&self, subscription: &Subscription, kind: SubscriptionEventKind) {
        let event = SubscriptionEvent::new(subscription, kind, self.clock.now());
        publish_event(self.events.as_ref(), event, "dunning").await;
    }
}

/// A subscription before and after a rewrite.
struct Rewrite {
    before: Subscription,
    after: Subscription,
}

impl Rewrite {
    fn changed(&self) -> bool {
        self.before.version != self.after.version
    }
}

fn paused_before(subscription: &Subscription, cutoff: Timestamp) -> bool {
    subscription.is_paused_for_non_payment()
        && subscription
            .paused_at
            .is_some_and(|at| at.is_before(&cutoff))
}

fn skipped(id: SubscriptionId, reason: &'static str) -> DunningOutcome {
    tracing::debug!(subscription_id = %id, reason, "Dunning transition skipped");
    DunningOutcome::Skipped { reason }
}

/// Turn a lost compare-and-set into `Skipped`; other errors propagate.
fn skip_on_conflict(
    result: Result<(), DomainError>,
    reason: &'static str,
) -> Result<Option<DunningOutcome>, SubscriptionError> {
    match result {
        Ok(()) => Ok(None),
        Err(err) if err.is_conflict() => {
            tracing::debug!(reason, error = %err, "Dunning write lost a race");
            Ok(Some(DunningOutcome::Skipped { reason }))
        }
        Err(err) => Err(err.into()),
    }
}
