//! Payment gateway port.
//!
//! The core never talks to a gateway API itself; the retry sweep asks this
//! port to attempt a charge and feeds the outcome back into dunning.

use crate::domain::dunning::Invoice;
use crate::domain::foundation::DomainError;
use async_trait::async_trait;

/// Resolved result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Succeeded,
    Failed { reason: String },
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Attempt to collect `invoice.amount_due`.
    ///
    /// # Errors
    ///
    /// `ExternalServiceError` when the gateway could not be reached; that
    /// is not a declined charge and must not advance dunning.
    async fn attempt_charge(&self, invoice: &Invoice) -> Result<ChargeOutcome, DomainError>;
}
