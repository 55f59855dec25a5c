//! End-to-end dunning tests.
//!
//! Drives a failed invoice through the sweep with a fixed clock:
//! 1. Failed charges are retried on the schedule
//! 2. Exhausted invoices pause the subscription
//! 3. Long pauses suspend the workspace, then cancel the subscription
//!
//! And the other way out: a successful retry undoes everything.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal_macros::dec;

use common::{t0, Harness};
use subscription_billing::application::DunningSweep;
use subscription_billing::domain::billing::AssignmentStatus;
use subscription_billing::domain::dunning::{DunningStage, Invoice, InvoiceStatus, NextAction};
use subscription_billing::domain::foundation::{DomainError, EventEnvelope};
use subscription_billing::domain::subscription::{PauseReason, SubscriptionStatus};
use subscription_billing::ports::{ChargeOutcome, EventHandler, EventSubscriber, PaymentGateway};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct AlwaysSucceeds;

#[async_trait]
impl PaymentGateway for AlwaysSucceeds {
    async fn attempt_charge(&self, _invoice: &Invoice) -> Result<ChargeOutcome, DomainError> {
        Ok(ChargeOutcome::Succeeded)
    }
}

struct AlwaysDeclines;

#[async_trait]
impl PaymentGateway for AlwaysDeclines {
    async fn attempt_charge(&self, _invoice: &Invoice) -> Result<ChargeOutcome, DomainError> {
        Ok(ChargeOutcome::Failed {
            reason: "card_declined".into(),
        })
    }
}

/// Stands in for a provisioning service listening for suspensions.
struct SuspensionListener(Arc<AtomicUsize>);

#[async_trait]
impl EventHandler for SuspensionListener {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        assert_eq!(event.aggregate_type, "Subscription");
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SuspensionListener"
    }
}

fn one_second() -> Duration {
    Duration::seconds(1)
}

// =============================================================================
// Escalation
// =============================================================================

#[tokio::test]
async fn unpaid_invoice_escalates_to_cancellation() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    let invoice = h.issue_invoice(&sub, dec!(19)).await;
    let sweep = DunningSweep::new(h.dunning.clone()).with_gateway(Arc::new(AlwaysDeclines));

    // First failure comes from the gateway webhook, the rest from the sweep
    h.dunning.handle_payment_failure(invoice.id).await.unwrap();
    assert_eq!(h.reload(&sub).await.status, SubscriptionStatus::PastDue);
    for expected_next in [t0().add_days(4), t0().add_days(11)] {
        let due = h.reload_invoice(&invoice).await.next_charge_attempt.unwrap();
        h.clock.set(due);
        let report = sweep.run_once().await.unwrap();
        assert_eq!(report.retried.applied, 1);
        assert_eq!(
            h.reload_invoice(&invoice).await.next_charge_attempt,
            Some(expected_next)
        );
    }
    h.clock.set(t0().add_days(11));
    sweep.run_once().await.unwrap();

    let exhausted = h.reload_invoice(&invoice).await;
    assert_eq!(exhausted.charge_attempts, 4);
    assert!(exhausted.retries_exhausted());
    assert_eq!(h.notifications.count_of("PaymentFailed").await, 4);

    // Pause strictly after the retry window plus grace
    h.clock.set(t0().add_days(11 + 11 + 1));
    assert!(sweep.run_once().await.unwrap().is_idle());
    h.clock.advance(one_second());
    let report = sweep.run_once().await.unwrap();
    assert_eq!(report.paused.applied, 1);

    let paused = h.reload(&sub).await;
    assert_eq!(paused.status, SubscriptionStatus::Paused);
    assert_eq!(paused.pause_reason, Some(PauseReason::NonPayment));
    assert_eq!(paused.pause_count, 0);
    let paused_at = paused.paused_at.unwrap();

    // Suspension keeps the subscription paused
    h.clock.set(paused_at.add_days(14));
    assert!(sweep.run_once().await.unwrap().is_idle());
    h.clock.advance(one_second());
    assert_eq!(sweep.run_once().await.unwrap().suspended.applied, 1);

    let suspended = h.reload(&sub).await;
    assert_eq!(suspended.status, SubscriptionStatus::Paused);
    assert!(suspended.suspended_at.is_some());
    assert_eq!(
        h.entitlements
            .get(&sub.package_assignment_id)
            .await
            .unwrap()
            .status,
        AssignmentStatus::Suspended
    );

    // Cancellation is terminal
    h.clock.set(paused_at.add_days(30));
    h.clock.advance(one_second());
    let report = sweep.run_once().await.unwrap();
    assert_eq!(report.cancelled.applied, 1);
    assert_eq!(report.suspended.total(), 0);

    let cancelled = h.reload(&sub).await;
    assert_eq!(cancelled.status, SubscriptionStatus::Expired);
    assert!(cancelled.is_ended());
    assert_eq!(
        h.entitlements
            .get(&sub.package_assignment_id)
            .await
            .unwrap()
            .status,
        AssignmentStatus::Expired
    );
    assert_eq!(h.notifications.count_of("SubscriptionPaused").await, 1);
    assert_eq!(h.notifications.count_of("AccountSuspended").await, 1);
    assert_eq!(h.notifications.count_of("SubscriptionCancelled").await, 1);

    h.clock.advance_days(30);
    assert!(sweep.run_once().await.unwrap().is_idle());
}

#[tokio::test]
async fn dunning_status_tracks_each_stage() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    let invoice = h.issue_invoice(&sub, dec!(19)).await;

    let status = h.dunning.get_dunning_status(&h.reload(&sub).await).await.unwrap();
    assert_eq!(status.stage, DunningStage::None);

    h.dunning.handle_payment_failure(invoice.id).await.unwrap();
    let status = h.dunning.get_dunning_status(&h.reload(&sub).await).await.unwrap();
    assert_eq!(status.stage, DunningStage::Retry);
    assert_eq!(
        status.next_action,
        NextAction::RetryCharge {
            at: t0().add_days(1)
        }
    );

    h.clock.set(t0().add_days(1));
    h.fail_until_exhausted(&invoice).await;
    let status = h.dunning.get_dunning_status(&h.reload(&sub).await).await.unwrap();
    assert_eq!(
        status.next_action,
        NextAction::Pause {
            at: t0().add_days(23)
        }
    );

    h.clock.set(t0().add_days(23));
    h.clock.advance(one_second());
    let sweep = DunningSweep::new(h.dunning.clone());
    sweep.run_once().await.unwrap();
    let status = h.dunning.get_dunning_status(&h.reload(&sub).await).await.unwrap();
    assert_eq!(status.stage, DunningStage::Paused);
    assert_eq!(status.days_overdue, 23);
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn successful_retry_restores_the_subscription() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    let invoice = h.issue_invoice(&sub, dec!(19)).await;
    h.dunning.handle_payment_failure(invoice.id).await.unwrap();

    let sweep = DunningSweep::new(h.dunning.clone()).with_gateway(Arc::new(AlwaysSucceeds));
    h.clock.advance_days(1);
    let report = sweep.run_once().await.unwrap();

    assert_eq!(report.retried.applied, 1);
    assert_eq!(h.reload(&sub).await.status, SubscriptionStatus::Active);
    let paid = h.reload_invoice(&invoice).await;
    assert_eq!(paid.status, InvoiceStatus::Paid);
    assert!(paid.next_charge_attempt.is_none());
    assert!(h.bus.has_event("subscription.payment_recovered.v1"));

    // Nothing left to retry
    h.clock.advance_days(3);
    assert!(sweep.run_once().await.unwrap().is_idle());
}

#[tokio::test]
async fn payment_after_suspension_reactivates_the_workspace() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    let invoice = h.issue_invoice(&sub, dec!(19)).await;
    let sweep = DunningSweep::new(h.dunning.clone());

    h.fail_until_exhausted(&invoice).await;
    h.clock.set(t0().add_days(23));
    h.clock.advance(one_second());
    sweep.run_once().await.unwrap();
    h.clock.advance_days(15);
    sweep.run_once().await.unwrap();
    assert!(h.reload(&sub).await.suspended_at.is_some());

    h.dunning.handle_payment_recovery(invoice.id).await.unwrap();

    let restored = h.reload(&sub).await;
    assert_eq!(restored.status, SubscriptionStatus::Active);
    assert!(restored.paused_at.is_none());
    assert!(restored.suspended_at.is_none());
    assert_eq!(
        h.entitlements
            .get(&sub.package_assignment_id)
            .await
            .unwrap()
            .status,
        AssignmentStatus::Active
    );

    // Well past the cancellation threshold, nothing happens
    h.clock.advance_days(30);
    assert!(sweep.run_once().await.unwrap().is_idle());
}

#[tokio::test]
async fn subscribers_hear_about_suspension() {
    let h = Harness::new(3);
    let heard = Arc::new(AtomicUsize::new(0));
    h.bus.subscribe(
        "subscription.workspace_suspended.v1",
        Arc::new(SuspensionListener(heard.clone())),
    );

    let sub = h.subscribe("starter").await;
    let invoice = h.issue_invoice(&sub, dec!(19)).await;
    let sweep = DunningSweep::new(h.dunning.clone());
    h.fail_until_exhausted(&invoice).await;
    h.clock.set(t0().add_days(23));
    h.clock.advance(one_second());
    sweep.run_once().await.unwrap();
    assert_eq!(heard.load(Ordering::SeqCst), 0);

    h.clock.advance_days(15);
    sweep.run_once().await.unwrap();
    assert_eq!(heard.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_charge_during_voluntary_pause_is_escalated() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    h.lifecycle.pause(sub.id, false).await.unwrap();
    let invoice = h.issue_invoice(&sub, dec!(19)).await;

    h.fail_until_exhausted(&invoice).await;
    let overdue = h.reload(&sub).await;
    assert_eq!(overdue.status, SubscriptionStatus::PastDue);
    assert!(overdue.paused_at.is_none());
    assert_eq!(overdue.pause_count, 1);

    h.clock.set(t0().add_days(23));
    h.clock.advance(one_second());
    let report = DunningSweep::new(h.dunning.clone()).run_once().await.unwrap();
    assert_eq!(report.paused.applied, 1);
    let paused = h.reload(&sub).await;
    assert_eq!(paused.pause_reason, Some(PauseReason::NonPayment));
    assert_eq!(paused.pause_count, 1);
}

#[tokio::test]
async fn sweep_events_carry_the_run_id() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    let created = h.bus.events_of_type("subscription.created.v1");
    assert_eq!(created[0].metadata.actor.as_deref(), Some("lifecycle"));

    let invoice = h.issue_invoice(&sub, dec!(19)).await;
    h.dunning.handle_payment_failure(invoice.id).await.unwrap();
    let failed = h.bus.events_of_type("subscription.payment_failed.v1");
    assert_eq!(failed[0].metadata.actor.as_deref(), Some("dunning"));
    assert!(failed[0].metadata.correlation_id.is_none());

    let sweep = DunningSweep::new(h.dunning.clone()).with_gateway(Arc::new(AlwaysDeclines));
    h.clock.advance_days(1);
    sweep.run_once().await.unwrap();
    h.clock.advance_days(3);
    sweep.run_once().await.unwrap();

    let failed = h.bus.events_of_type("subscription.payment_failed.v1");
    assert_eq!(failed.len(), 3);
    let runs: Vec<&str> = failed[1..]
        .iter()
        .map(|e| {
            assert_eq!(e.metadata.actor.as_deref(), Some("sweep"));
            e.metadata.correlation_id.as_deref().unwrap()
        })
        .collect();
    assert_ne!(runs[0], runs[1]);
}

#[tokio::test]
async fn voluntary_pause_is_never_escalated() {
    let h = Harness::new(3);
    let sub = h.subscribe("starter").await;
    h.lifecycle.pause(sub.id, false).await.unwrap();
    let sweep = DunningSweep::new(h.dunning.clone());

    h.clock.advance_days(90);
    assert!(sweep.run_once().await.unwrap().is_idle());
    let still = h.reload(&sub).await;
    assert_eq!(still.status, SubscriptionStatus::Paused);
    assert_eq!(still.pause_reason, Some(PauseReason::Voluntary));
}
