//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors, events)
//! - `subscription` - Subscription aggregate and lifecycle state machine
//! - `billing` - Package prices and proration
//! - `dunning` - Retry schedule, escalation thresholds, dunning projection

pub mod billing;
pub mod dunning;
pub mod foundation;
pub mod subscription;
