//! Invoice repository port.
//!
//! The invoicing collaborator owns invoices; this port exposes only what
//! dunning reads and writes. `update` is a compare-and-set on `version`.

use crate::domain::dunning::Invoice;
use crate::domain::foundation::{DomainError, InvoiceId, SubscriptionId, Timestamp};
use async_trait::async_trait;

#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError>;

    /// # Errors
    ///
    /// - `InvoiceNotFound` if the row doesn't exist
    /// - `ConcurrencyConflict` if the stored version moved on
    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError>;

    /// Overdue, unpaid invoices whose `next_charge_attempt <= now`.
    async fn find_due_for_retry(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Invoice>, DomainError>;

    /// Most recent unpaid overdue invoice for the subscription, by due date.
    async fn find_latest_overdue_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Invoice>, DomainError>;
}
