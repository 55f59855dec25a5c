//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `clock` - System and fixed clocks
//! - `events` - Event bus implementations (in-memory, logging)
//! - `memory` - In-memory repositories and collaborators
//! - `notifications` - Logging notification dispatcher
//! - `postgres` - PostgreSQL repositories and entitlement service

pub mod clock;
pub mod events;
pub mod memory;
pub mod notifications;
pub mod postgres;

pub use clock::{FixedClock, SystemClock};
pub use events::{InMemoryEventBus, LoggingEventPublisher};
pub use notifications::LoggingNotificationDispatcher;
