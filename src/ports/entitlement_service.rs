//! Entitlement service port.
//!
//! Package assignments grant a workspace access to features. Dunning and
//! plan changes adjust them here; provisioning itself is external.

use crate::domain::billing::PackageAssignment;
use crate::domain::foundation::{DomainError, PackageAssignmentId, PackageCode};
use async_trait::async_trait;

#[async_trait]
pub trait EntitlementService: Send + Sync {
    async fn find_assignment(
        &self,
        id: &PackageAssignmentId,
    ) -> Result<Option<PackageAssignment>, DomainError>;

    /// Withdraw access while keeping the assignment.
    async fn suspend(&self, id: &PackageAssignmentId) -> Result<(), DomainError>;

    /// Restore a suspended assignment.
    async fn reactivate(&self, id: &PackageAssignmentId) -> Result<(), DomainError>;

    /// End the assignment for good.
    async fn expire(&self, id: &PackageAssignmentId) -> Result<(), DomainError>;

    /// Point the assignment at a different package.
    async fn reassign_package(
        &self,
        id: &PackageAssignmentId,
        package_code: &PackageCode,
    ) -> Result<(), DomainError>;
}
