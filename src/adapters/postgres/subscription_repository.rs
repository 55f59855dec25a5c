//! PostgreSQL implementation of SubscriptionRepository.
//!
//! History records are stored as JSONB columns; everything the sweeps
//! filter on is a plain column.

use crate::domain::foundation::{
    DomainError, ErrorCode, PackageAssignmentId, PackageCode, SubscriptionId, Timestamp,
    WorkspaceId,
};
use crate::domain::subscription::{
    BillingCycle, GatewayReference, PauseReason, PendingPlanChange, PeriodExtension,
    StatusTransition, Subscription, SubscriptionStatus,
};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, from_db_count, from_db_version, parse_column, to_db_count, to_db_version};

const SELECT_COLUMNS: &str = r#"
    SELECT id, workspace_id, package_assignment_id, package_code,
           gateway_name, gateway_subscription_id, gateway_customer_id,
           status, billing_cycle, current_period_start, current_period_end,
           cancelled_at, cancellation_reason, ended_at, paused_at, pause_reason,
           suspended_at, pause_count, status_history, period_extensions,
           pending_plan_change, version, created_at, updated_at
    FROM subscriptions
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: &SubscriptionId) -> Result<bool, DomainError> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM subscriptions WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("check subscription", e))
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    workspace_id: Uuid,
    package_assignment_id: Uuid,
    package_code: String,
    gateway_name: String,
    gateway_subscription_id: Option<String>,
    gateway_customer_id: Option<String>,
    status: String,
    billing_cycle: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    cancellation_reason: Option<String>,
    ended_at: Option<DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
    pause_reason: Option<String>,
    suspended_at: Option<DateTime<Utc>>,
    pause_count: i32,
    status_history: Json<Vec<StatusTransition>>,
    period_extensions: Json<Vec<PeriodExtension>>,
    pending_plan_change: Option<Json<PendingPlanChange>>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let package_code = PackageCode::new(row.package_code).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid package_code: {}", e))
        })?;
        let pause_reason = row
            .pause_reason
            .as_deref()
            .map(|s| parse_column::<PauseReason>("pause_reason", s))
            .transpose()?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            workspace_id: WorkspaceId::from_uuid(row.workspace_id),
            package_assignment_id: PackageAssignmentId::from_uuid(row.package_assignment_id),
            package_code,
            gateway: GatewayReference {
                name: row.gateway_name,
                subscription_id: row.gateway_subscription_id,
                customer_id: row.gateway_customer_id,
            },
            status: parse_column("status", &row.status)?,
            billing_cycle: parse_column::<BillingCycle>("billing_cycle", &row.billing_cycle)?,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            cancellation_reason: row.cancellation_reason,
            ended_at: row.ended_at.map(Timestamp::from_datetime),
            paused_at: row.paused_at.map(Timestamp::from_datetime),
            pause_reason,
            suspended_at: row.suspended_at.map(Timestamp::from_datetime),
            pause_count: from_db_count("pause_count", row.pause_count)?,
            status_history: row.status_history.0,
            period_extensions: row.period_extensions.0,
            pending_plan_change: row.pending_plan_change.map(|json| json.0),
            version: from_db_version(row.version)?,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn to_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, workspace_id, package_assignment_id, package_code,
                gateway_name, gateway_subscription_id, gateway_customer_id,
                status, billing_cycle, current_period_start, current_period_end,
                cancelled_at, cancellation_reason, ended_at, paused_at, pause_reason,
                suspended_at, pause_count, status_history, period_extensions,
                pending_plan_change, version, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.workspace_id.as_uuid())
        .bind(subscription.package_assignment_id.as_uuid())
        .bind(subscription.package_code.as_str())
        .bind(&subscription.gateway.name)
        .bind(&subscription.gateway.subscription_id)
        .bind(&subscription.gateway.customer_id)
        .bind(subscription.status.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(to_datetime(subscription.cancelled_at))
        .bind(&subscription.cancellation_reason)
        .bind(to_datetime(subscription.ended_at))
        .bind(to_datetime(subscription.paused_at))
        .bind(subscription.pause_reason.map(|r| r.as_str()))
        .bind(to_datetime(subscription.suspended_at))
        .bind(to_db_count("pause_count", subscription.pause_count)?)
        .bind(Json(&subscription.status_history))
        .bind(Json(&subscription.period_extensions))
        .bind(subscription.pending_plan_change.as_ref().map(Json))
        .bind(to_db_version(subscription.version)?)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some("subscriptions_pkey") {
                    return DomainError::validation(
                        "id",
                        format!("subscription {} already exists", subscription.id),
                    );
                }
            }
            db_error("save subscription", e)
        })?;

        Ok(())
    }

    async fn update(
        &self,
        subscription: &Subscription,
        expected_version: u64,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                package_code = $3,
                gateway_name = $4,
                gateway_subscription_id = $5,
                gateway_customer_id = $6,
                status = $7,
                billing_cycle = $8,
                current_period_start = $9,
                current_period_end = $10,
                cancelled_at = $11,
                cancellation_reason = $12,
                ended_at = $13,
                paused_at = $14,
                pause_reason = $15,
                suspended_at = $16,
                pause_count = $17,
                status_history = $18,
                period_extensions = $19,
                pending_plan_change = $20,
                version = $21,
                updated_at = $22
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(to_db_version(expected_version)?)
        .bind(subscription.package_code.as_str())
        .bind(&subscription.gateway.name)
        .bind(&subscription.gateway.subscription_id)
        .bind(&subscription.gateway.customer_id)
        .bind(subscription.status.as_str())
        .bind(subscription.billing_cycle.as_str())
        .bind(subscription.current_period_start.as_datetime())
        .bind(subscription.current_period_end.as_datetime())
        .bind(to_datetime(subscription.cancelled_at))
        .bind(&subscription.cancellation_reason)
        .bind(to_datetime(subscription.ended_at))
        .bind(to_datetime(subscription.paused_at))
        .bind(subscription.pause_reason.map(|r| r.as_str()))
        .bind(to_datetime(subscription.suspended_at))
        .bind(to_db_count("pause_count", subscription.pause_count)?)
        .bind(Json(&subscription.status_history))
        .bind(Json(&subscription.period_extensions))
        .bind(subscription.pending_plan_change.as_ref().map(Json))
        .bind(to_db_version(subscription.version)?)
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update subscription", e))?;

        if result.rows_affected() == 0 {
            if self.exists(&subscription.id).await? {
                return Err(DomainError::conflict(format!(
                    "subscription {} was modified since version {}",
                    subscription.id, expected_version
                )));
            }
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                format!("subscription {} not found", subscription.id),
            ));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| db_error("find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_status(
        &self,
        status: SubscriptionStatus,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE status = $1 ORDER BY updated_at ASC, id ASC LIMIT $2 OFFSET $3",
            SELECT_COLUMNS
        ))
        .bind(status.as_str())
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find subscriptions by status", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn find_paused_for_non_payment(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'paused'
              AND pause_reason = 'non_payment'
              AND paused_at < $1
            ORDER BY paused_at ASC
            LIMIT $2"#,
            SELECT_COLUMNS
        ))
        .bind(paused_before.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find non-payment pauses", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn find_paused_for_suspension(
        &self,
        paused_before: Timestamp,
        limit: usize,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'paused'
              AND pause_reason = 'non_payment'
              AND suspended_at IS NULL
              AND paused_at < $1
            ORDER BY paused_at ASC
            LIMIT $2"#,
            SELECT_COLUMNS
        ))
        .bind(paused_before.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find pauses awaiting suspension", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
