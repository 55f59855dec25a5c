//! Notification dispatcher port.

use crate::domain::dunning::DunningNotification;
use crate::domain::foundation::DomainError;
use async_trait::async_trait;

/// Hands dunning notifications to the delivery channel (email, in-app).
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: DunningNotification) -> Result<(), DomainError>;
}
