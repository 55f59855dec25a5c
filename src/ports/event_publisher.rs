//! EventPublisher port - Interface for publishing domain events.
//!
//! Services publish subscription events after a write has been committed;
//! the transport (in-memory bus, log sink, broker) is an adapter concern.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Sink for committed subscription events.
///
/// Delivery is at-least-once. Callers treat a publish error as a logging
/// matter; the state change it describes has already been written.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish in order, stopping at the first failure.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
