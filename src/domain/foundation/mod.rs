//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, errors and event infrastructure
//! that form the vocabulary of the billing domain.

mod errors;
mod events;
mod ids;
mod money;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent};
pub use ids::{InvoiceId, PackageAssignmentId, PackageCode, SubscriptionId, WorkspaceId};
pub use money::{round_money, Currency};
pub use state_machine::{StateMachine, TransitionRejected};
pub use timestamp::Timestamp;
