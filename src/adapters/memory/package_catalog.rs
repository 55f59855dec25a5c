//! In-memory package catalog.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::billing::Package;
use crate::domain::foundation::{DomainError, PackageCode};
use crate::ports::PackageCatalog;

#[derive(Debug, Clone, Default)]
pub struct InMemoryPackageCatalog {
    packages: Arc<RwLock<HashMap<PackageCode, Package>>>,
}

impl InMemoryPackageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packages(packages: impl IntoIterator<Item = Package>) -> Self {
        let map = packages
            .into_iter()
            .map(|p| (p.code.clone(), p))
            .collect();
        Self {
            packages: Arc::new(RwLock::new(map)),
        }
    }

    pub async fn insert(&self, package: Package) {
        self.packages
            .write()
            .await
            .insert(package.code.clone(), package);
    }
}

#[async_trait]
impl PackageCatalog for InMemoryPackageCatalog {
    async fn find_by_code(&self, code: &PackageCode) -> Result<Option<Package>, DomainError> {
        Ok(self.packages.read().await.get(code).cloned())
    }
}
