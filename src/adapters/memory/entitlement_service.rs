//! In-memory entitlement service.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::{AssignmentStatus, PackageAssignment};
use crate::domain::foundation::{DomainError, ErrorCode, PackageAssignmentId, PackageCode};
use crate::ports::EntitlementService;

/// Keeps assignments in memory and records every status change.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementService {
    assignments: Arc<RwLock<HashMap<PackageAssignmentId, PackageAssignment>>>,
    changes: Arc<RwLock<Vec<(PackageAssignmentId, AssignmentStatus)>>>,
}

impl InMemoryEntitlementService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, assignment: PackageAssignment) {
        self.assignments
            .write()
            .await
            .insert(assignment.id, assignment);
    }

    pub async fn get(&self, id: &PackageAssignmentId) -> Option<PackageAssignment> {
        self.assignments.read().await.get(id).cloned()
    }

    /// How many times the assignment was moved into `status`.
    pub async fn change_count(&self, id: &PackageAssignmentId, status: AssignmentStatus) -> usize {
        self.changes
            .read()
            .await
            .iter()
            .filter(|(changed, to)| changed == id && *to == status)
            .count()
    }

    async fn set_status(
        &self,
        id: &PackageAssignmentId,
        status: AssignmentStatus,
    ) -> Result<(), DomainError> {
        let mut assignments = self.assignments.write().await;
        let assignment = assignments.get_mut(id).ok_or_else(|| not_found(id))?;
        assignment.status = status;
        self.changes.write().await.push((*id, status));
        Ok(())
    }
}

fn not_found(id: &PackageAssignmentId) -> DomainError {
    DomainError::new(
        ErrorCode::PackageNotFound,
        format!("package assignment {} not found", id),
    )
}

#[async_trait]
impl EntitlementService for InMemoryEntitlementService {
    async fn find_assignment(
        &self,
        id: &PackageAssignmentId,
    ) -> Result<Option<PackageAssignment>, DomainError> {
        Ok(self.assignments.read().await.get(id).cloned())
    }

    async fn suspend(&self, id: &PackageAssignmentId) -> Result<(), DomainError> {
        self.set_status(id, AssignmentStatus::Suspended).await
    }

    async fn reactivate(&self, id: &PackageAssignmentId) -> Result<(), DomainError> {
        self.set_status(id, AssignmentStatus::Active).await
    }

    async fn expire(&self, id: &PackageAssignmentId) -> Result<(), DomainError> {
        self.set_status(id, AssignmentStatus::Expired).await
    }

    async fn reassign_package(
        &self,
        id: &PackageAssignmentId,
        package_code: &PackageCode,
    ) -> Result<(), DomainError> {
        let mut assignments = self.assignments.write().await;
        let assignment = assignments.get_mut(id).ok_or_else(|| not_found(id))?;
        assignment.package_code = package_code.clone();
        Ok(())
    }
}
