//! Billing module - Package prices and proration arithmetic.

mod package;
mod proration;

pub use package::{AssignmentStatus, Package, PackageAssignment};
pub use proration::{calculate_proration, ProrationResult};
