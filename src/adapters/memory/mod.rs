//! In-memory adapters for tests and local runs.
//!
//! Repositories enforce the same version compare-and-set as the
//! PostgreSQL adapters, so race behaviour can be tested without a database.

mod entitlement_service;
mod invoice_repository;
mod notification_dispatcher;
mod package_catalog;
mod subscription_repository;

pub use entitlement_service::InMemoryEntitlementService;
pub use invoice_repository::InMemoryInvoiceRepository;
pub use notification_dispatcher::InMemoryNotificationDispatcher;
pub use package_catalog::InMemoryPackageCatalog;
pub use subscription_repository::InMemorySubscriptionRepository;
