//! In-memory subscription repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

/// Subscription store backed by a `HashMap`, with the same
/// compare-and-set semantics as the PostgreSQL adapter.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionRepository {
    rows: Arc<RwLock<HashMap<SubscriptionId, Subscription>>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stored copy (for test assertions).
    pub async fn get(&self, id: &SubscriptionId) -> Option<Subscription> {
        self.rows.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&subscription.id) {
            return Err(DomainError::validation(
                "id",
                format!("subscription {} already exists", subscription.id),
            ));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let stored = rows.get(&subscription.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", subscription.id),
            )
        })?;
        if stored.version != expected_version {
            return Err(DomainError::conflict(format!(
                "subscription {} is at version {}, expected {}",
                subscription.id, stored.version, expected_version
            )));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_by_status(
        &self,
        status: SubscriptionStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Subscription> = rows
            .values()
            .filter(|s| s.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|s| (s.updated_at, s.id));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_paused_for_non_payment(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        Ok(self.paused_before(paused_before, limit, |_| true).await)
    }

    async fn find_paused_for_suspension(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        Ok(self
            .paused_before(paused_before, limit, |s| s.suspended_at.is_none())
            .await)
    }
}

impl InMemorySubscriptionRepository {
    async fn paused_before(
        &self,
        paused_before: Timestamp,
        limit: usize,
        keep: impl Fn(&Subscription) -> bool,
    ) -> Vec<Subscription> {
        let rows = self.rows.read().await;
        let mut matching: Vec<Subscription> = rows
            .values()
            .filter(|s| s.is_paused_for_non_payment())
            .filter(|s| s.paused_at.is_some_and(|at| at.is_before(&paused_before)))
            .filter(|s| keep(s))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.paused_at);
        matching.truncate(limit);
        matching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{PackageAssignmentId, PackageCode, WorkspaceId};
    use crate::domain::subscription::{BillingCycle, GatewayReference};

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn subscription() -> Subscription {
        Subscription::create(
            SubscriptionId::new(),
            WorkspaceId::new(),
            PackageAssignmentId::new(),
            PackageCode::new("starter").unwrap(),
            BillingCycle::Monthly,
            GatewayReference::new("stripe"),
            t0(),
        )
    }

    #[tokio::test]
    async fn save_rejects_duplicate_ids() {
        let repo = InMemorySubscriptionRepository::new();
        let sub = subscription();
        repo.save(&sub).await.unwrap();
        assert!(repo.save(&sub).await.is_err());
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let repo = InMemorySubscriptionRepository::new();
        let mut sub = subscription();
        repo.save(&sub).await.unwrap();

        let mut stale = sub.clone();
        sub.mark_past_due(t0()).unwrap();
        repo.update(&sub, 0).await.unwrap();

        stale.pause_for_non_payment(t0()).unwrap();
        let err = repo.update(&stale, 0).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            repo.get(&sub.id).await.unwrap().status,
            SubscriptionStatus::PastDue
        );
    }

    #[tokio::test]
    async fn update_of_unknown_row_is_not_found() {
        let repo = InMemorySubscriptionRepository::new();
        let err = repo.update(&subscription(), 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SubscriptionNotFound);
    }

    #[tokio::test]
    async fn finds_non_payment_pauses_before_cutoff() {
        let repo = InMemorySubscriptionRepository::new();
        let mut old = subscription();
        old.pause_for_non_payment(t0()).unwrap();
        let mut recent = subscription();
        recent.pause_for_non_payment(t0().add_days(10)).unwrap();
        repo.save(&old).await.unwrap();
        repo.save(&recent).await.unwrap();

        let found = repo
            .find_paused_for_non_payment(t0().add_days(5), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, old.id);
    }

    #[tokio::test]
    async fn suspension_query_skips_suspended_rows() {
        let repo = InMemorySubscriptionRepository::new();
        let mut suspended = subscription();
        suspended.pause_for_non_payment(t0()).unwrap();
        suspended.mark_workspace_suspended(t0().add_days(15)).unwrap();
        let mut waiting = subscription();
        waiting.pause_for_non_payment(t0().add_days(1)).unwrap();
        repo.save(&suspended).await.unwrap();
        repo.save(&waiting).await.unwrap();

        let found = repo
            .find_paused_for_suspension(t0().add_days(20), 1)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, waiting.id);
    }

    #[tokio::test]
    async fn status_pages_do_not_overlap() {
        let repo = InMemorySubscriptionRepository::new();
        for _ in 0..3 {
            repo.save(&subscription()).await.unwrap();
        }

        let first = repo
            .find_by_status(SubscriptionStatus::Active, 0, 2)
            .await
            .unwrap();
        let rest = repo
            .find_by_status(SubscriptionStatus::Active, 2, 2)
            .await
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(rest.len(), 1);
        assert!(first.iter().all(|s| s.id != rest[0].id));
    }
}
