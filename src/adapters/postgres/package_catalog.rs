//! PostgreSQL implementation of PackageCatalog.

use crate::domain::billing::Package;
use crate::domain::foundation::{Currency, DomainError, ErrorCode, PackageCode};
use crate::ports::PackageCatalog;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use super::db_error;

pub struct PostgresPackageCatalog {
    pool: PgPool,
}

impl PostgresPackageCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PackageRow {
    code: String,
    name: String,
    monthly_price: Decimal,
    yearly_price: Decimal,
    currency: String,
}

impl TryFrom<PackageRow> for Package {
    type Error = DomainError;

    fn try_from(row: PackageRow) -> Result<Self, Self::Error> {
        let invalid = |e: crate::domain::foundation::ValidationError| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid package row: {}", e))
        };
        Ok(Package {
            code: PackageCode::new(row.code).map_err(invalid)?,
            name: row.name,
            monthly_price: row.monthly_price,
            yearly_price: row.yearly_price,
            currency: Currency::new(&row.currency).map_err(invalid)?,
        })
    }
}

#[async_trait]
impl PackageCatalog for PostgresPackageCatalog {
    async fn find_by_code(&self, code: &PackageCode) -> Result<Option<Package>, DomainError> {
        let row: Option<PackageRow> = sqlx::query_as(
            r#"
            SELECT code, name, monthly_price, yearly_price, currency
            FROM packages
            WHERE code = $1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find package", e))?;

        row.map(Package::try_from).transpose()
    }
}
