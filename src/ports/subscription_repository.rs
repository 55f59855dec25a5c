//! Subscription repository port.
//!
//! Returns fully loaded aggregates; nothing downstream triggers lazy I/O.
//!
//! # Concurrency
//!
//! `update` is a compare-and-set on `version`. Sweeps may run on several
//! workers at once, so a writer that loses the race gets
//! `ErrorCode::ConcurrencyConflict` and must not repeat side effects.

use crate::domain::foundation::{DomainError, SubscriptionId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use async_trait::async_trait;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if the id already exists
    /// - `DatabaseError` on persistence failure
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Write `subscription` only if the stored version equals `expected_version`.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if the row doesn't exist
    /// - `ConcurrencyConflict` if the stored version moved on
    /// - `DatabaseError` on persistence failure
    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// One page of subscriptions in `status`, ordered by `(updated_at, id)`.
    ///
    /// Skips the first `offset` rows and returns at most `limit`.
    async fn find_by_status(
        &self,
        status: SubscriptionStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Non-payment pauses that started strictly before `paused_before`.
    async fn find_paused_for_non_payment(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError>;

    /// Like `find_paused_for_non_payment`, restricted to rows whose
    /// entitlement has not been suspended yet.
    async fn find_paused_for_suspension(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError>;
}
