//! Package catalog port - read-only price reference.

use crate::domain::billing::Package;
use crate::domain::foundation::{DomainError, PackageCode};
use async_trait::async_trait;

#[async_trait]
pub trait PackageCatalog: Send + Sync {
    /// Returns `None` if no package has this code.
    async fn find_by_code(&self, code: &PackageCode) -> Result<Option<Package>, DomainError>;
}
