//! EventSubscriber port - Registration of in-process event consumers.
//!
//! Downstream consumers (entitlement provisioning, referral bonuses) hook
//! into subscription events by type name, e.g. `subscription.expired.v1`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing domain events.
///
/// Handlers must be idempotent: the same event may arrive more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Shown in error messages when the handler fails.
    fn name(&self) -> &'static str;
}

/// Port for subscribing to domain events.
///
/// # Example
///
/// ```ignore
/// subscriber.subscribe("subscription.workspace_suspended.v1", provisioning);
/// subscriber.subscribe_all(&["subscription.renewed.v1", "subscription.expired.v1"], referrals);
/// ```
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    /// Register one handler under several event types.
    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}
