//! Event publisher that writes envelopes to the log.
//!
//! Used by the sweeper binary when no broker is configured.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventPublisher;

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            actor = event.metadata.actor.as_deref(),
            correlation_id = event.metadata.correlation_id.as_deref(),
            payload = %event.payload,
            "domain event"
        );
        Ok(())
    }
}
