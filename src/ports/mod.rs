//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `SubscriptionRepository` - Subscription aggregates (compare-and-set writes)
//! - `InvoiceRepository` - Dunning fields of collaborator-owned invoices
//!
//! ## Collaborator Ports
//!
//! - `PackageCatalog` - Package price reference
//! - `EntitlementService` - Suspend/reactivate/expire package assignments
//! - `NotificationDispatcher` - Dunning notifications
//! - `PaymentGateway` - Charge attempts for the retry sweep
//! - `Clock` - Current instant
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events
//! - `EventSubscriber` - Port for subscribing to domain events
//! - `EventHandler` - Handler that processes incoming events

mod clock;
mod entitlement_service;
mod event_publisher;
mod event_subscriber;
mod invoice_repository;
mod notification_dispatcher;
mod package_catalog;
mod payment_gateway;
mod subscription_repository;

pub use clock::Clock;
pub use entitlement_service::EntitlementService;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventHandler, EventSubscriber};
pub use invoice_repository::InvoiceRepository;
pub use notification_dispatcher::NotificationDispatcher;
pub use package_catalog::PackageCatalog;
pub use payment_gateway::{ChargeOutcome, PaymentGateway};
pub use subscription_repository::SubscriptionRepository;
