//! Subscription domain events.
//!
//! Named in past tense. Downstream consumers (entitlement provisioning,
//! referral bonuses, reporting) receive them as `EventEnvelope`s.

use crate::domain::foundation::{
    DomainEvent, EventId, InvoiceId, PackageAssignmentId, PackageCode, SubscriptionId, Timestamp,
    WorkspaceId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{BillingCycle, PauseReason, Subscription};

/// What happened to the subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubscriptionEventKind {
    Created {
        package_code: PackageCode,
        billing_cycle: BillingCycle,
        period_end: Timestamp,
    },
    Renewed {
        period_start: Timestamp,
        period_end: Timestamp,
    },
    Paused {
        reason: PauseReason,
        pause_count: u32,
    },
    Unpaused,
    CancellationRequested {
        reason: String,
        effective_at: Timestamp,
    },
    CancellationWithdrawn,
    Cancelled {
        reason: String,
    },
    Expired {
        reason: Option<String>,
    },
    PlanChanged {
        from: PackageCode,
        to: PackageCode,
        net_amount: Option<Decimal>,
    },
    PlanChangeScheduled {
        to: PackageCode,
    },
    PlanChangeUnscheduled {
        to: PackageCode,
    },
    PeriodExtended {
        days: u32,
        new_period_end: Timestamp,
    },
    PauseCyclesReset {
        previous_count: u32,
    },
    PaymentFailed {
        invoice_id: InvoiceId,
        charge_attempts: u32,
        next_charge_attempt: Option<Timestamp>,
    },
    PaymentRecovered {
        invoice_id: InvoiceId,
    },
    WorkspaceSuspended {
        package_assignment_id: PackageAssignmentId,
    },
}

/// A single subscription event with its routing identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub workspace_id: WorkspaceId,
    pub occurred_at: Timestamp,
    #[serde(flatten)]
    pub kind: SubscriptionEventKind,
}

impl SubscriptionEvent {
    pub fn new(subscription: &Subscription, kind: SubscriptionEventKind, occurred_at: Timestamp) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            workspace_id: subscription.workspace_id,
            occurred_at,
            kind,
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        match self.kind {
            SubscriptionEventKind::Created { .. } => "subscription.created.v1",
            SubscriptionEventKind::Renewed { .. } => "subscription.renewed.v1",
            SubscriptionEventKind::Paused { .. } => "subscription.paused.v1",
            SubscriptionEventKind::Unpaused => "subscription.unpaused.v1",
            SubscriptionEventKind::CancellationRequested { .. } => {
                "subscription.cancellation_requested.v1"
            }
            SubscriptionEventKind::CancellationWithdrawn => "subscription.cancellation_withdrawn.v1",
            SubscriptionEventKind::Cancelled { .. } => "subscription.cancelled.v1",
            SubscriptionEventKind::Expired { .. } => "subscription.expired.v1",
            SubscriptionEventKind::PlanChanged { .. } => "subscription.plan_changed.v1",
            SubscriptionEventKind::PlanChangeScheduled { .. } => {
                "subscription.plan_change_scheduled.v1"
            }
            SubscriptionEventKind::PlanChangeUnscheduled { .. } => {
                "subscription.plan_change_unscheduled.v1"
            }
            SubscriptionEventKind::PeriodExtended { .. } => "subscription.period_extended.v1",
            SubscriptionEventKind::PauseCyclesReset { .. } => "subscription.pause_cycles_reset.v1",
            SubscriptionEventKind::PaymentFailed { .. } => "subscription.payment_failed.v1",
            SubscriptionEventKind::PaymentRecovered { .. } => "subscription.payment_recovered.v1",
            SubscriptionEventKind::WorkspaceSuspended { .. } => "subscription.workspace_suspended.v1",
        }
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id.to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    fn event_id(&self) -> EventId {
        self.event_id.clone()
    }
}
