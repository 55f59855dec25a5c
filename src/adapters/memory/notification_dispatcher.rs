//! In-memory notification dispatcher.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::dunning::DunningNotification;
use crate::domain::foundation::DomainError;
use crate::ports::NotificationDispatcher;

/// Captures dispatched notifications for assertions.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationDispatcher {
    sent: Arc<RwLock<Vec<DunningNotification>>>,
}

impl InMemoryNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<DunningNotification> {
        self.sent.read().await.clone()
    }

    /// Count by template name, e.g. "SubscriptionPaused".
    pub async fn count_of(&self, name: &str) -> usize {
        self.sent
            .read()
            .await
            .iter()
            .filter(|n| n.name() == name)
            .count()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotificationDispatcher {
    async fn dispatch(&self, notification: DunningNotification) -> Result<(), DomainError> {
        self.sent.write().await.push(notification);
        Ok(())
    }
}
