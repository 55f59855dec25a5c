//! Subscription-specific error types.
//!
//! Every application service in the billing core returns `SubscriptionError`.
//!
//! | Error | Code |
//! |-------|------|
//! | NotFound | SUBSCRIPTION_NOT_FOUND |
//! | InvoiceNotFound | INVOICE_NOT_FOUND |
//! | PackageNotFound | PACKAGE_NOT_FOUND |
//! | ValidationFailed | VALIDATION_FAILED |
//! | InvalidTransition | INVALID_STATE_TRANSITION |
//! | AlreadyEnded | SUBSCRIPTION_ENDED |
//! | PauseLimitExceeded | PAUSE_LIMIT_EXCEEDED |
//! | RenewalNotDue | RENEWAL_NOT_DUE |
//! | CancellationPending | CANCELLATION_PENDING |
//! | ConcurrentModification | CONCURRENCY_CONFLICT |
//! | Infrastructure | DATABASE_ERROR |

use thiserror::Error;

use crate::domain::foundation::{
    DomainError, ErrorCode, InvoiceId, SubscriptionId, Timestamp, ValidationError,
};

use super::SubscriptionStatus;

/// Errors raised by subscription lifecycle, plan change and dunning operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Subscription not found: {0}")]
    NotFound(SubscriptionId),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    /// Package or package assignment could not be resolved.
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Validation failed for '{field}': {message}")]
    ValidationFailed { field: String, message: String },

    #[error("Cannot move subscription from {from} to {to}")]
    InvalidTransition {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// The subscription has `ended_at` set and no longer accepts changes.
    #[error("Subscription {0} has ended")]
    AlreadyEnded(SubscriptionId),

    /// Recoverable; retry with an administrative override.
    #[error("Pause limit reached: {used} of {max} pause cycles used")]
    PauseLimitExceeded { max: u32, used: u32 },

    #[error("Renewal not due until {period_end}")]
    RenewalNotDue { period_end: Timestamp },

    #[error("Subscription {0} has a pending cancellation")]
    CancellationPending(SubscriptionId),

    /// Another writer changed the row between our read and write.
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::InvoiceNotFound(_) => ErrorCode::InvoiceNotFound,
            SubscriptionError::PackageNotFound(_) => ErrorCode::PackageNotFound,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::InvalidTransition { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::AlreadyEnded(_) => ErrorCode::SubscriptionEnded,
            SubscriptionError::PauseLimitExceeded { .. } => ErrorCode::PauseLimitExceeded,
            SubscriptionError::RenewalNotDue { .. } => ErrorCode::RenewalNotDue,
            SubscriptionError::CancellationPending(_) => ErrorCode::CancellationPending,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrencyConflict,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns true if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::ConcurrentModification(_) | SubscriptionError::Infrastructure(_)
        )
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ConcurrencyConflict => SubscriptionError::ConcurrentModification(err.message),
            ErrorCode::ValidationFailed => SubscriptionError::ValidationFailed {
                field: err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "unknown".to_string()),
                message: err.message,
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        DomainError::from(err).into()
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_and_infrastructure_are_retryable() {
        assert!(SubscriptionError::ConcurrentModification("stale".into()).is_retryable());
        assert!(SubscriptionError::infrastructure("db down").is_retryable());
        assert!(!SubscriptionError::PauseLimitExceeded { max: 3, used: 3 }.is_retryable());
        assert!(!SubscriptionError::AlreadyEnded(SubscriptionId::new()).is_retryable());
    }

    #[test]
    fn conflict_domain_error_becomes_concurrent_modification() {
        let err: SubscriptionError = DomainError::conflict("version 3 is stale").into();
        assert_eq!(
            err,
            SubscriptionError::ConcurrentModification("version 3 is stale".into())
        );
    }

    #[test]
    fn validation_domain_error_keeps_field() {
        let err: SubscriptionError = DomainError::validation("days", "must be positive").into();
        assert_eq!(err, SubscriptionError::validation("days", "must be positive"));
    }

    #[test]
    fn other_domain_errors_are_infrastructure() {
        let err: SubscriptionError = DomainError::database("connection reset").into();
        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
    }

    #[test]
    fn pause_limit_message_names_counts() {
        let err = SubscriptionError::PauseLimitExceeded { max: 2, used: 2 };
        assert_eq!(err.to_string(), "Pause limit reached: 2 of 2 pause cycles used");
        assert_eq!(err.code(), ErrorCode::PauseLimitExceeded);
    }

    #[test]
    fn invalid_transition_uses_storage_names() {
        let err = SubscriptionError::InvalidTransition {
            from: SubscriptionStatus::Paused,
            to: SubscriptionStatus::PastDue,
        };
        assert_eq!(err.to_string(), "Cannot move subscription from paused to past_due");
    }

    #[test]
    fn converts_back_into_domain_error() {
        let err: DomainError = SubscriptionError::CancellationPending(SubscriptionId::new()).into();
        assert_eq!(err.code, ErrorCode::CancellationPending);
    }
}
