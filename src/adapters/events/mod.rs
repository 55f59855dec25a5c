//! Event bus adapters.
//!
//! - `InMemoryEventBus` - Synchronous, in-process bus
//! - `LoggingEventPublisher` - Writes envelopes to the tracing log

mod in_memory;
mod logging;

pub use in_memory::InMemoryEventBus;
pub use logging::LoggingEventPublisher;
