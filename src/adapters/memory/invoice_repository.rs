//! In-memory invoice repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::dunning::{Invoice, InvoiceStatus};
use crate::domain::foundation::{DomainError, ErrorCode, InvoiceId, SubscriptionId, Timestamp};
use crate::ports::InvoiceRepository;

#[derive(Debug, Clone, Default)]
pub struct InMemoryInvoiceRepository {
    rows: Arc<RwLock<HashMap<InvoiceId, Invoice>>>,
}

impl InMemoryInvoiceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &InvoiceId) -> Option<Invoice> {
        self.rows.read().await.get(id).cloned()
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&invoice.id) {
            return Err(DomainError::validation(
                "id",
                format!("invoice {} already exists", invoice.id),
            ));
        }
        rows.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<(), DomainError> {
        let mut rows = self.rows.write().await;
        let stored = rows.get(&invoice.id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::InvoiceNotFound,
                format!("invoice {} not found", invoice.id),
            )
        })?;
        if stored.version != expected_version {
            return Err(DomainError::conflict(format!(
                "invoice {} is at version {}, expected {}",
                invoice.id, stored.version, expected_version
            )));
        }
        rows.insert(invoice.id, invoice.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn find_due_for_retry(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Invoice>, DomainError> {
        let rows = self.rows.read().await;
        let mut due: Vec<Invoice> = rows
            .values()
            .filter(|i| i.is_due_for_retry(now))
            .cloned()
            .collect();
        due.sort_by_key(|i| i.next_charge_attempt);
        due.truncate(limit);
        Ok(due)
    }

    async fn find_latest_overdue_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Invoice>, DomainError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .filter(|i| i.subscription_id == *subscription_id)
            .filter(|i| i.status == InvoiceStatus::Overdue && i.paid_at.is_none())
            .max_by_key(|i| i.due_at)
            .cloned())
    }
}
