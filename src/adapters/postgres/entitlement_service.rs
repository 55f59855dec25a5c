//! PostgreSQL implementation of EntitlementService.
//!
//! Writes straight to `workspace_package_assignments`. Status changes are
//! idempotent: suspending an already suspended assignment succeeds.

use crate::domain::billing::{AssignmentStatus, PackageAssignment};
use crate::domain::foundation::{
    DomainError, ErrorCode, PackageAssignmentId, PackageCode, WorkspaceId,
};
use crate::ports::EntitlementService;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, parse_column};

pub struct PostgresEntitlementService {
    pool: PgPool,
}

impl PostgresEntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn set_status(
        &self,
        id: &PackageAssignmentId,
        status: AssignmentStatus,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE workspace_package_assignments
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update package assignment", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        tracing::debug!(package_assignment_id = %id, status = %status, "Package assignment updated");
        Ok(())
    }
}

fn not_found(id: &PackageAssignmentId) -> DomainError {
    DomainError::new(
        ErrorCode::PackageNotFound,
        format!("package assignment {} not found", id),
    )
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    workspace_id: Uuid,
    package_code: String,
    status: String,
}

impl TryFrom<AssignmentRow> for PackageAssignment {
    type Error = DomainError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(PackageAssignment {
            id: PackageAssignmentId::from_uuid(row.id),
            workspace_id: WorkspaceId::from_uuid(row.workspace_id),
            package_code: PackageCode::new(row.package_code).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid package_code: {}", e))
            })?,
            status: parse_column("status", &row.status)?,
        })
    }
}

#[async_trait]
impl EntitlementService for PostgresEntitlementService {
    async fn find_assignment(
        &self,
        id: &PackageAssignmentId,
    ) -> Result<Option<PackageAssignment>, DomainError> {
        let row: Option<AssignmentRow> = sqlx::query_as(
            r#"
            SELECT id, workspace_id, package_code, status
            FROM workspace_package_assignments
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find package assignment", e))?;

        row.map(PackageAssignment::try_from).transpose()
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
        let result = sqlx::query(
            r#"
            UPDATE workspace_package_assignments
            SET package_code = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(package_code.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("reassign package", e))?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        Ok(())
    }
}
