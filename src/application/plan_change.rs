//! PlanChangeScheduler - Immediate and period-end package changes.

use std::sync::Arc;

use crate::domain::billing::ProrationResult;
use crate::domain::foundation::{PackageCode, SubscriptionId};
use crate::domain::subscription::{
    PendingPlanChange, Subscription, SubscriptionError, SubscriptionEvent, SubscriptionEventKind,
};
use crate::ports::{Clock, EntitlementService, EventPublisher, SubscriptionRepository};

use super::{publish_event, ProrationCalculator};

#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub subscription_id: SubscriptionId,
    pub new_package_code: PackageCode,
    pub prorate: bool,
    pub immediate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanChangeOutcome {
    /// Package switched now. `proration` is present when requested; the
    /// caller bills or credits it.
    Applied {
        subscription: Subscription,
        proration: Option<ProrationResult>,
    },

    /// Change recorded for the period-end sweep.
    Scheduled {
        subscription: Subscription,
        pending: PendingPlanChange,
    },
}

impl PlanChangeOutcome {
    pub fn subscription(&self) -> &Subscription {
        match self {
            PlanChangeOutcome::Applied { subscription, .. }
            | PlanChangeOutcome::Scheduled { subscription, .. } => subscription,
        }
    }
}

pub struct PlanChangeScheduler {
    subscriptions: Arc<dyn SubscriptionRepository>,
    entitlements: Arc<dyn EntitlementService>,
    proration: ProrationCalculator,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl PlanChangeScheduler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        entitlements: Arc<dyn EntitlementService>,
        proration: ProrationCalculator,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            entitlements,
            proration,
            events,
            clock,
        }
    }

    /// Change the package now or at period end.
    ///
    /// The target package must exist in the catalog either way, so a
    /// scheduled change can always be applied later.
    pub async fn change_plan(
        &self,
        cmd: ChangePlanCommand,
    ) -> Result<PlanChangeOutcome, SubscriptionError> {
        let subscription = self.load(cmd.subscription_id).await?;
        let new_package = self.proration.resolve_package(&cmd.new_package_code).await?;

        if cmd.immediate {
            let proration = if cmd.prorate {
                Some(self.proration.preview_for(&subscription, &new_package).await?)
            } else {
                None
            };
            let subscription = self
                .apply(subscription, new_package.code, proration.as_ref())
                .await?;
            return Ok(PlanChangeOutcome::Applied {
                subscription,
                proration,
            });
        }

        let mut subscription = subscription;
        let expected = subscription.version;
        let pending =
            subscription.schedule_plan_change(new_package.code, cmd.prorate, self.clock.now())?;
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            to_package = %pending.to_package_code,
            "Plan change scheduled for period end"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::PlanChangeScheduled {
                to: pending.to_package_code.clone(),
            },
        )
        .await;
        Ok(PlanChangeOutcome::Scheduled {
            subscription,
            pending,
        })
    }

    pub async fn has_pending_plan_change(&self, id: SubscriptionId) -> Result<bool, SubscriptionError> {
        Ok(self.load(id).await?.pending_plan_change.is_some())
    }

    pub async fn get_pending_plan_change(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<PendingPlanChange>, SubscriptionError> {
        Ok(self.load(id).await?.pending_plan_change)
    }

    /// Drop a scheduled change. Returns the removed descriptor, if any.
    pub async fn cancel_scheduled_plan_change(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<PendingPlanChange>, SubscriptionError> {
        let mut subscription = self.load(id).await?;
        let expected = subscription.version;

        let Some(pending) = subscription.take_pending_plan_change(self.clock.now())? else {
            return Ok(None);
        };
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %id,
            to_package = %pending.to_package_code,
            "Scheduled plan change cancelled"
        );
        self.publish(
            &subscription,
            SubscriptionEventKind::PlanChangeUnscheduled {
                to: pending.to_package_code.clone(),
            },
        )
        .await;
        Ok(Some(pending))
    }

    /// Apply the scheduled change, if any. Called by the period-end sweep.
    pub async fn apply_pending_plan_change(
        &self,
        id: SubscriptionId,
    ) -> Result<Option<PlanChangeOutcome>, SubscriptionError> {
        let subscription = self.load(id).await?;
        let Some(pending) = subscription.pending_plan_change.clone() else {
            tracing::debug!(subscription_id = %id, "No pending plan change to apply");
            return Ok(None);
        };

        let new_package = self.proration.resolve_package(&pending.to_package_code).await?;
        let proration = if pending.prorate {
            Some(self.proration.preview_for(&subscription, &new_package).await?)
        } else {
            None
        };
        let subscription = self
            .apply(subscription, new_package.code, proration.as_ref())
            .await?;
        Ok(Some(PlanChangeOutcome::Applied {
            subscription,
            proration,
        }))
    }

    async fn apply(
        &self,
        mut subscription: Subscription,
        to: PackageCode,
        proration: Option<&ProrationResult>,
    ) -> Result<Subscription, SubscriptionError> {
        let expected = subscription.version;
        let previous = subscription.change_package(to, self.clock.now())?;
        self.commit(&subscription, expected).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            from_package = %previous,
            to_package = %subscription.package_code,
            "Plan changed"
        );
        if let Err(err) = self
            .entitlements
            .reassign_package(&subscription.package_assignment_id, &subscription.package_code)
            .await
        {
            tracing::error!(
                subscription_id = %subscription.id,
                error = %err,
                "Failed to reassign entitlement package"
            );
        }
        self.publish(
            &subscription,
            SubscriptionEventKind::PlanChanged {
                from: previous,
                to: subscription.package_code.clone(),
                net_amount: proration.map(|p| p.net_amount),
            },
        )
        .await;
        Ok(subscription)
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

    async fn publish(&self, subscription: &Subscription, kind: SubscriptionEventKind) {
        let event = SubscriptionEvent::new(subscription, kind, self.clock.now());
        publish_event(self.events.as_ref(), event, "plan_change").await;
    }
}
