//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresSubscriptionRepository` - Subscription aggregates
//! - `PostgresInvoiceRepository` - Invoice dunning fields
//! - `PostgresPackageCatalog` - Package price reference
//! - `PostgresEntitlementService` - Package assignment status changes
//!
//! Writes use `UPDATE ... WHERE id = $1 AND version = $2`. Zero rows
//! affected on an existing row is reported as a concurrency conflict.

mod entitlement_service;
mod invoice_repository;
mod package_catalog;
mod subscription_repository;

pub use entitlement_service::PostgresEntitlementService;
pub use invoice_repository::PostgresInvoiceRepository;
pub use package_catalog::PostgresPackageCatalog;
pub use subscription_repository::PostgresSubscriptionRepository;

use std::fmt::Display;
use std::str::FromStr;

use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

/// Open a connection pool sized from configuration.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DomainError> {
    tracing::info!(
        min_connections = config.min_connections,
        max_connections = config.max_connections,
        "Connecting to PostgreSQL"
    );

    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
        .connect(config.url.expose_secret())
        .await
        .map_err(|e| db_error("connect to database", e))
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DomainError> {
    tracing::info!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| DomainError::database(format!("Migration failed: {}", e)))?;
    tracing::info!("Database migrations completed");
    Ok(())
}

fn db_error(action: &str, err: sqlx::Error) -> DomainError {
    DomainError::database(format!("Failed to {}: {}", action, err))
}

/// Parse a text column into a domain enum, reporting bad data as a
/// database error.
fn parse_column<T>(column: &'static str, value: &str) -> Result<T, DomainError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse::<T>().map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid {} value '{}': {}", column, value, e),
        )
    })
}

fn to_db_version(version: u64) -> Result<i64, DomainError> {
    i64::try_from(version)
        .map_err(|_| DomainError::database(format!("version {} out of range", version)))
}

fn from_db_version(version: i64) -> Result<u64, DomainError> {
    u64::try_from(version)
        .map_err(|_| DomainError::database(format!("negative version {}", version)))
}

fn to_db_count(column: &'static str, count: u32) -> Result<i32, DomainError> {
    i32::try_from(count)
        .map_err(|_| DomainError::database(format!("{} {} out of range", column, count)))
}

fn from_db_count(column: &'static str, count: i32) -> Result<u32, DomainError> {
    u32::try_from(count)
        .map_err(|_| DomainError::database(format!("negative {} {}", column, count)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::subscription::SubscriptionStatus;

    #[test]
    fn parse_column_reports_bad_values() {
        let err = parse_column::<SubscriptionStatus>("status", "frozen").unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(err.message.contains("frozen"));
    }

    #[test]
    fn parse_column_accepts_storage_form() {
        let status: SubscriptionStatus = parse_column("status", "past_due").unwrap();
        assert_eq!(status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn version_conversion_rejects_negative() {
        assert!(from_db_version(-1).is_err());
        assert_eq!(to_db_version(7).unwrap(), 7);
    }
}
