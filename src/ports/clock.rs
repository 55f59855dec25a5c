//! Clock port - Source of "now".
//!
//! Every retry, pause and suspension decision compares a stored timestamp
//! to the current instant; injecting the clock keeps that arithmetic
//! deterministic under test.

use crate::domain::foundation::Timestamp;

/// Supplies the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
