//! PostgreSQL implementation of InvoiceRepository.
//!
//! Only the dunning fields are written; invoice creation belongs to the
//! invoicing collaborator and `save` exists for seeding and tests.

use crate::domain::dunning::{Invoice, InvoiceStatus};
use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, InvoiceId, SubscriptionId, Timestamp,
};
use crate::ports::InvoiceRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{db_error, from_db_count, from_db_version, parse_column, to_db_count, to_db_version};

const SELECT_COLUMNS: &str = r#"
    SELECT id, subscription_id, status, amount_due, currency, due_at,
           charge_attempts, next_charge_attempt, last_charge_attempt,
           paid_at, version, updated_at
    FROM invoices
"#;

pub struct PostgresInvoiceRepository {
    pool: PgPool,
}

impl PostgresInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    subscription_id: Uuid,
    status: String,
    amount_due: Decimal,
    currency: String,
    due_at: DateTime<Utc>,
    charge_attempts: i32,
    next_charge_attempt: Option<DateTime<Utc>>,
    last_charge_attempt: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    version: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(&row.currency).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid currency: {}", e))
        })?;

        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            status: parse_column::<InvoiceStatus>("status", &row.status)?,
            amount_due: row.amount_due,
            currency,
            due_at: Timestamp::from_datetime(row.due_at),
            charge_attempts: from_db_count("charge_attempts", row.charge_attempts)?,
            next_charge_attempt: row.next_charge_attempt.map(Timestamp::from_datetime),
            last_charge_attempt: row.last_charge_attempt.map(Timestamp::from_datetime),
            paid_at: row.paid_at.map(Timestamp::from_datetime),
            version: from_db_version(row.version)?,
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn to_datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

#[async_trait]
impl InvoiceRepository for PostgresInvoiceRepository {
    async fn save(&self, invoice: &Invoice) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, subscription_id, status, amount_due, currency, due_at,
                charge_attempts, next_charge_attempt, last_charge_attempt,
                paid_at, version, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.subscription_id.as_uuid())
        .bind(invoice.status.as_str())
        .bind(invoice.amount_due)
        .bind(invoice.currency.as_str())
        .bind(invoice.due_at.as_datetime())
        .bind(to_db_count("charge_attempts", invoice.charge_attempts)?)
        .bind(to_datetime(invoice.next_charge_attempt))
        .bind(to_datetime(invoice.last_charge_attempt))
        .bind(to_datetime(invoice.paid_at))
        .bind(to_db_version(invoice.version)?)
        .bind(invoice.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("save invoice", e))?;

        Ok(())
    }

    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET
                status = $3,
                charge_attempts = $4,
                next_charge_attempt = $5,
                last_charge_attempt = $6,
                paid_at = $7,
                version = $8,
                updated_at = $9
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(to_db_version(expected_version)?)
        .bind(invoice.status.as_str())
        .bind(to_db_count("charge_attempts", invoice.charge_attempts)?)
        .bind(to_datetime(invoice.next_charge_attempt))
        .bind(to_datetime(invoice.last_charge_attempt))
        .bind(to_datetime(invoice.paid_at))
        .bind(to_db_version(invoice.version)?)
        .bind(invoice.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("update invoice", e))?;

        if result.rows_affected() == 0 {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM invoices WHERE id = $1)")
                    .bind(invoice.id.as_uuid())
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| db_error("check invoice", e))?;
            if exists {
                return Err(DomainError::conflict(format!(
                    "invoice {} was modified since version {}",
                    invoice.id, expected_version
                )));
            }
            return Err(DomainError::new(
                ErrorCode::InvoiceNotFound,
                format!("invoice {} not found", invoice.id),
            ));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("find invoice", e))?;

        row.map(Invoice::try_from).transpose()
    }

    async fn find_due_for_retry(
        &self,
        now: Timestamp,
        limit: usize,
    ) -> Result<Vec<Invoice>, DomainError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'overdue'
              AND paid_at IS NULL
              AND next_charge_attempt <= $1
            ORDER BY next_charge_attempt ASC
            LIMIT $2"#,
            SELECT_COLUMNS
        ))
        .bind(now.as_datetime())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("find invoices due for retry", e))?;

        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn find_latest_overdue_for_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Invoice>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE subscription_id = $1
              AND status = 'overdue'
              AND paid_at IS NULL
            ORDER BY due_at DESC
            LIMIT 1"#,
            SELECT_COLUMNS
        ))
        .bind(subscription_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find latest overdue invoice", e))?;

        row.map(Invoice::try_from).transpose()
    }
}
