//! Application layer - Services that orchestrate the billing core.
//!
//! Every mutating operation follows the same shape: load the aggregate,
//! apply the domain transition, write with a compare-and-set on `version`,
//! then run side effects (entitlements, notifications, events) only after
//! the write has won.

mod dunning;
mod lifecycle;
mod plan_change;
mod proration;
mod sweep;

pub use dunning::{DunningEngine, DunningOutcome};
pub use lifecycle::{CreateSubscriptionCommand, ResumeOutcome, SubscriptionLifecycle};
pub use plan_change::{ChangePlanCommand, PlanChangeOutcome, PlanChangeScheduler};
pub use proration::ProrationCalculator;
pub use sweep::{DunningSweep, StageTally, SweepReport};

use crate::domain::foundation::{DomainEvent, SerializableDomainEvent};
use crate::domain::subscription::SubscriptionEvent;
use crate::ports::EventPublisher;

/// Publish after a committed write. Failures are logged, not returned:
/// the state change has already happened.
///
/// Inside a sweep run the envelope carries the run id as correlation id and
/// `"sweep"` as actor; otherwise `actor` names the calling service.
async fn publish_event(
    publisher: &dyn EventPublisher,
    event: SubscriptionEvent,
    actor: &'static str,
) {
    let event_type = event.event_type();
    let mut envelope = match event.to_envelope() {
        Ok(envelope) => envelope.with_actor(actor),
        Err(err) => {
            tracing::error!(event_type, error = %err, "Failed to build event envelope");
            return;
        }
    };
    if let Some(run_id) = sweep::current_run_id() {
        envelope = envelope.with_correlation_id(run_id).with_actor("sweep");
    }
    if let Err(err) = publisher.publish(envelope).await {
        tracing::warn!(
            event_type,
            subscription_id = %event.subscription_id,
            error = %err,
            "Failed to publish subscription event"
        );
    }
}
