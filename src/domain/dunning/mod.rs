//! Dunning module - Payment-failure recovery rules.
//!
//! Escalation runs retry → pause → suspend → cancel. This module holds the
//! timing rules and read models; the engine that applies them lives in the
//! application layer.

mod invoice;
mod notification;
mod policy;
mod status;

pub use invoice::{Invoice, InvoiceStatus};
pub use notification::DunningNotification;
pub use policy::DunningPolicy;
pub use status::{DunningStage, DunningStatus, NextAction};
