//! Notification dispatcher that logs instead of delivering.
//!
//! Delivery (email, in-app) belongs to the notification collaborator; the
//! sweeper binary uses this until one is wired in.

use async_trait::async_trait;

use crate::domain::dunning::DunningNotification;
use crate::domain::foundation::DomainError;
use crate::ports::NotificationDispatcher;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn dispatch(&self, notification: DunningNotification) -> Result<(), DomainError> {
        let payload = serde_json::to_string(&notification).map_err(|e| {
            DomainError::new(
                crate::domain::foundation::ErrorCode::InternalError,
                format!("Failed to serialize notification: {}", e),
            )
        })?;
        tracing::info!(
            notification = notification.name(),
            subscription_id = %notification.subscription_id(),
            %payload,
            "dunning notification"
        );
        Ok(())
    }
}
