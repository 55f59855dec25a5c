//! SubscriptionLifecycle - Primary subscription state machine service.
//!
//! Create, cancel (at period end or immediately), resume, renew, expire,
//! pause/unpause, plus the administrative period extension and pause
//! allowance reset.

use std::sync::Arc;

use crate::domain::billing::AssignmentStatus;
use crate::domain::foundation::{PackageAssignmentId, SubscriptionId};
use crate::domain::subscription::{
    BillingCycle, GatewayReference, PauseCycleGuard, PauseReason, PendingCancellation,
    Subscription, SubscriptionError, SubscriptionEvent, SubscriptionEventKind,
};
use crate::ports::{Clock, EntitlementService, EventPublisher, SubscriptionRepository};

use super::publish_event;

/// Command to start a subscription for an existing package assignment.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub package_assignment_id: PackageAssignmentId,
    pub billing_cycle: BillingCycle,
    pub gateway: GatewayReference,
}

/// Result of `resume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The pending cancellation was withdrawn.
    Resumed(Subscription),

    /// Nothing changed: no cancellation was pending, or the period has
    /// already ended and the cancellation stands.
    Unchanged(Subscription),
}

impl ResumeOutcome {
    pub fn subscription(&self) -> &Subscription {
        match self {
            ResumeOutcome::Resumed(s) | ResumeOutcome::Unchanged(s) => s,
        }
    }

    pub fn was_resumed(&self) -> bool {
        matches!(self, ResumeOutcome::Resumed(_))
    }
}

/// Service owning subscription lifecycle transitions.
///
/// A lost compare-and-set surfaces as `ConcurrentModification`; the
/// caller decides whether to reload and retry.
pub struct SubscriptionLifecycle {
    subscriptions: Arc<dyn SubscriptionRepository>,
    entitlements: Arc<dyn EntitlementService>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    pause_guard: PauseCycleGuard,
}

impl SubscriptionLifecycle {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        entitlements: Arc<dyn EntitlementService>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        pause_guard: PauseCycleGuard,
    ) -> Self {
        Self {
            subscriptions,
            entitlements,
            events,
            clock,
            pause_guard,
        }
    }

    pub fn pause_guard(&self) -> &PauseCycleGuard {
        &self.pause_guard
    }

    pub async fn get(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        self.load(id).await
    }

    /// Start an active subscription whose first period begins now.
    pub async fn create(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<Subscription, SubscriptionError> {
        let assignment = self
            .entitlements
            .find_assignment(&cmd.package_assignment_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::PackageNotFound(format!(
                    "package assignment {}",
                    cmd.package_assignment_id
                ))
            })?;
        if assignment.status != AssignmentStatus::Active {
            return Err(SubscriptionError::validation(
                "package_assignment_id",
                format!("assignment is {}, expected active", assignment.status),
            ));
        }

        let now = self.clock.now();
        let subscription = Subscription::create(
            SubscriptionId::new(),
            assignment.workspace_id,
            assignment.id,
            assignment.package_code,
            cmd.billing_cycle,
            cmd.gateway,
            now,
        );
        self.subscriptions.save(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            workspace_id = %subscription.workspace_id,
            billing_cycle = %subscription.billing_cycle,
            "Subscription created"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::Created {
                package_code: subscription.package_code.clone(),
                billing_cycle: subscription.billing_cycle,
                period_end: subscription.current_period_end,
            },
        )
        .await;
        Ok(subscription)
    }

    /// Mark for cancellation at period end. Status is unchanged.
    pub async fn request_cancellation_at_period_end(
        &self,
        id: SubscriptionId,
        reason: impl Into<String>,
    ) -> Result<Subscription, SubscriptionError> {
        let reason = reason.into();
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        subscription.request_cancellation_at_period_end(reason.clone(), now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, %reason, "Cancellation requested for period end");
        self.publish(
            &subscription,
            SubscriptionEventKind::CancellationRequested {
                reason,
                effective_at: subscription.current_period_end,
            },
        )
        .await;
        Ok(subscription)
    }

    /// End the subscription now (administrative action).
    pub async fn cancel_immediately(
        &self,
        id: SubscriptionId,
        reason: impl Into<String>,
    ) -> Result<Subscription, SubscriptionError> {
        let reason = reason.into();
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        subscription.cancel_immediately(reason.clone(), now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, %reason, "Subscription cancelled immediately");
        self.expire_entitlement(&subscription).await;
        self.publish(&subscription, SubscriptionEventKind::Cancelled { reason })
            .await;
        Ok(subscription)
    }

    /// Withdraw a pending cancellation while the period is still running.
    pub async fn resume(&self, id: SubscriptionId) -> Result<ResumeOutcome, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        if !subscription.resume(now)? {
            tracing::debug!(subscription_id = %id, "Resume left subscription unchanged");
            return Ok(ResumeOutcome::Unchanged(subscription));
        }
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, "Pending cancellation withdrawn");
        self.publish(&subscription, SubscriptionEventKind::CancellationWithdrawn)
            .await;
        Ok(ResumeOutcome::Resumed(subscription))
    }

    /// Roll the period forward one cycle.
    ///
    /// `pending` states explicitly whether a pending cancellation is
    /// superseded or honoured.
    pub async fn renew(
        &self,
        id: SubscriptionId,
        pending: PendingCancellation,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        subscription.renew(pending, now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %id,
            period_end = %subscription.current_period_end,
            "Subscription renewed"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::Renewed {
                period_start: subscription.current_period_start,
                period_end: subscription.current_period_end,
            },
        )
        .await;
        Ok(subscription)
    }

    /// End the subscription as expired and expire its entitlement.
    pub async fn expire(
        &self,
        id: SubscriptionId,
        reason: Option<String>,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        subscription.expire(reason.as_deref(), now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, "Subscription expired");
        self.expire_entitlement(&subscription).await;
        self.publish(&subscription, SubscriptionEventKind::Expired { reason })
            .await;
        Ok(subscription)
    }

    /// Voluntary pause. `force` bypasses the pause allowance but is still
    /// counted.
    pub async fn pause(
        &self,
        id: SubscriptionId,
        force: bool,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        subscription.pause_voluntarily(&self.pause_guard, force, now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %id,
            pause_count = subscription.pause_count,
            forced = force,
            "Subscription paused"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::Paused {
                reason: PauseReason::Voluntary,
                pause_count: subscription.pause_count,
            },
        )
        .await;
        Ok(subscription)
    }

    pub async fn unpause(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let was_suspended = subscription.suspended_at.is_some();
        let now = self.clock.now();

        subscription.unpause(now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, "Subscription unpaused");
        if was_suspended {
            if let Err(err) = self
                .entitlements
                .reactivate(&subscription.package_assignment_id)
                .await
            {
                tracing::error!(subscription_id = %id, error = %err, "Failed to reactivate entitlement");
            }
        }
        self.publish(&subscription, SubscriptionEventKind::Unpaused)
            .await;
        Ok(subscription)
    }

    /// Push the period end out by `days`, recording why.
    pub async fn extend_period(
        &self,
        id: SubscriptionId,
        days: u32,
        reason: impl Into<String>,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        let extension = subscription.extend_period(days, reason, now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %id,
            days,
            new_period_end = %extension.new_period_end,
            "Billing period extended"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::PeriodExtended {
                days,
                new_period_end: extension.new_period_end,
            },
        )
        .await;
        Ok(subscription)
    }

    /// Clear `pause_count`, restoring the full pause allowance.
    pub async fn reset_pause_cycles(
        &self,
        id: SubscriptionId,
    ) -> Result<Subscription, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;
        let now = self.clock.now();

        let previous_count = subscription.reset_pause_cycles(now)?;
        self.commit(&subscription, expected).await?;

        tracing::info!(subscription_id = %id, previous_count, "Pause cycles reset");
        self.publish(
            &subscription,
            SubscriptionEventKind::PauseCyclesReset { previous_count },
        )
        .await;
        Ok(subscription)
    }

    /// Pause cycles left before the guard refuses a voluntary pause.
    pub async fn remaining_pause_cycles(&self, id: SubscriptionId) -> Result<u32, SubscriptionError> {
        let subscription = self.load(id).await?;
        Ok(self.pause_guard.remaining_pause_cycles(&subscription))
    }

    async fn load(&self, id: SubscriptionId) -> Result<Subscription, SubscriptionError> {
        self.subscriptions
            .find_by_id(&id)
            .await?
            .ok_or(SubscriptionError::NotFound(id))
    }

    async fn commit(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<(), SubscriptionError> {
        self.subscriptions
            .update(subscription, expected_version)
            .await
            .map_err(SubscriptionError::from)
    }

    async fn expire_entitlement(&self, subscription: &Subscription) {
        if let Err(err) = self
            .entitlements
            .expire(&subscription.package_assignment_id)
            .await
        {
            tracing::error!(
                subscription_id = %subscription.id,
                package_assignment_id = %subscription.package_assignment_id,
                error = %err,
                "Failed to expire entitlement"
            );
        }
    }

    async fn publish(&self, subscription: &Subscription, kind: SubscriptionEventKind) {
        let event = SubscriptionEvent::new(subscription, kind, self.clock.now());
        publish_event(self.events.as_ref(), event, "lifecycle").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::FixedClock;
    use crate::adapters::events::InMemoryEventBus;
    use crate::adapters::memory::{InMemoryEntitlementService, InMemorySubscriptionRepository};
    use crate::domain::billing::PackageAssignment;
    use crate::domain::foundation::{PackageCode, Timestamp, WorkspaceId};
    use crate::domain::subscription::SubscriptionStatus;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixture
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        lifecycle: SubscriptionLifecycle,
        repo: InMemorySubscriptionRepository,
        entitlements: InMemoryEntitlementService,
        bus: Arc<InMemoryEventBus>,
        clock: FixedClock,
        assignment_id: PackageAssignmentId,
    }

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    async fn fixture(max_pause_cycles: u32) -> Fixture {
        let repo = InMemorySubscriptionRepository::new();
        let entitlements = InMemoryEntitlementService::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = FixedClock::new(t0());

        let assignment_id = PackageAssignmentId::new();
        entitlements
            .insert(PackageAssignment {
                id: assignment_id,
                workspace_id: WorkspaceId::new(),
                package_code: PackageCode::new("starter").unwrap(),
                status: AssignmentStatus::Active,
            })
            .await;

        let lifecycle = SubscriptionLifecycle::new(
            Arc::new(repo.clone()),
            Arc::new(entitlements.clone()),
            bus.clone(),
            Arc::new(clock.clone()),
            PauseCycleGuard::new(max_pause_cycles),
        );

        Fixture {
            lifecycle,
            repo,
            entitlements,
            bus,
            clock,
            assignment_id,
        }
    }

    async fn create(f: &Fixture) -> Subscription {
        f.lifecycle
            .create(CreateSubscriptionCommand {
                package_assignment_id: f.assignment_id,
                billing_cycle: BillingCycle::Monthly,
                gateway: GatewayReference::new("stripe"),
            })
            .await
            .unwrap()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn create_persists_and_publishes() {
        let f = fixture(3).await;
        let sub = create(&f).await;

        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.current_period_end, t0().add_days(30));
        assert_eq!(sub.package_code.as_str(), "starter");
        assert!(f.repo.get(&sub.id).await.is_some());
        assert!(f.bus.has_event("subscription.created.v1"));
    }

    #[tokio::test]
    async fn create_fails_for_unknown_assignment() {
        let f = fixture(3).await;
        let err = f
            .lifecycle
            .create(CreateSubscriptionCommand {
                package_assignment_id: PackageAssignmentId::new(),
                billing_cycle: BillingCycle::Monthly,
                gateway: GatewayReference::new("stripe"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn missing_subscription_is_not_found() {
        let f = fixture(3).await;
        let id = SubscriptionId::new();
        assert_eq!(
            f.lifecycle.pause(id, false).await.unwrap_err(),
            SubscriptionError::NotFound(id)
        );
    }

    #[tokio::test]
    async fn pause_limit_then_forced_override() {
        let f = fixture(2).await;
        let sub = create(&f).await;

        for expected in 1..=2 {
            let paused = f.lifecycle.pause(sub.id, false).await.unwrap();
            assert_eq!(paused.pause_count, expected);
            f.lifecycle.unpause(sub.id).await.unwrap();
        }

        let err = f.lifecycle.pause(sub.id, false).await.unwrap_err();
        assert_eq!(err, SubscriptionError::PauseLimitExceeded { max: 2, used: 2 });

        let forced = f.lifecycle.pause(sub.id, true).await.unwrap();
        assert_eq!(forced.pause_count, 3);
        assert_eq!(f.lifecycle.remaining_pause_cycles(sub.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expire_ends_subscription_and_entitlement() {
        let f = fixture(3).await;
        let sub = create(&f).await;
        f.clock.advance_days(30);

        let expired = f
            .lifecycle
            .expire(sub.id, Some("period_end".into()))
            .await
            .unwrap();

        assert_eq!(expired.status, SubscriptionStatus::Expired);
        assert_eq!(expired.ended_at, Some(t0().add_days(30)));
        assert_eq!(
            f.entitlements.get(&f.assignment_id).await.unwrap().status,
            AssignmentStatus::Expired
        );
        assert!(f.bus.has_event("subscription.expired.v1"));
    }

    #[tokio::test]
    async fn operations_after_end_fail_uniformly() {
        let f = fixture(3).await;
        let sub = create(&f).await;
        f.lifecycle.cancel_immediately(sub.id, "chargeback").await.unwrap();

        assert!(matches!(
            f.lifecycle.pause(sub.id, true).await,
            Err(SubscriptionError::AlreadyEnded(_))
        ));
        assert!(matches!(
            f.lifecycle.expire(sub.id, None).await,
            Err(SubscriptionError::AlreadyEnded(_))
        ));
        assert!(matches!(
            f.lifecycle.cancel_immediately(sub.id, "again").await,
            Err(SubscriptionError::AlreadyEnded(_))
        ));
    }

    #[tokio::test]
    async fn resume_reports_whether_anything_changed() {
        let f = fixture(3).await;
        let sub = create(&f).await;
        f.lifecycle
            .request_cancellation_at_period_end(sub.id, "budget")
            .await
            .unwrap();

        f.clock.advance_days(5);
        let outcome = f.lifecycle.resume(sub.id).await.unwrap();
        assert!(outcome.was_resumed());
        assert!(outcome.subscription().cancelled_at.is_none());

        f.lifecycle
            .request_cancellation_at_period_end(sub.id, "budget")
            .await
            .unwrap();
        f.clock.advance_days(30);
        let outcome = f.lifecycle.resume(sub.id).await.unwrap();
        assert!(!outcome.was_resumed());
        assert!(outcome.subscription().cancelled_at.is_some());
    }

    #[tokio::test]
    async fn stale_writer_gets_concurrent_modification() {
        let f = fixture(3).await;
        let sub = create(&f).await;

        // Another writer bumps the stored version behind our back
        let mut other = f.repo.get(&sub.id).await.unwrap();
        other.extend_period(1, "goodwill", t0()).unwrap();
        f.repo.update(&other, 0).await.unwrap();

        let mut stale = sub.clone();
        stale.mark_past_due(t0()).unwrap();
        let err: SubscriptionError = f.repo.update(&stale, 0).await.unwrap_err().into();
        assert!(matches!(err, SubscriptionError::ConcurrentModification(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn reset_pause_cycles_publishes_previous_count() {
        let f = fixture(1).await;
        let sub = create(&f).await;
        f.lifecycle.pause(sub.id, false).await.unwrap();
        f.lifecycle.unpause(sub.id).await.unwrap();

        let reset = f.lifecycle.reset_pause_cycles(sub.id).await.unwrap();
        assert_eq!(reset.pause_count, 0);

        let events = f.bus.events_of_type("subscription.pause_cycles_reset.v1");
        assert_eq!(events[0].payload["previous_count"], 1);
    }
}
