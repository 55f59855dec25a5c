//! Subscription module - Billing lifecycle of a workspace's package.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription entity and its transitions
//! - `status` - SubscriptionStatus state machine
//! - `billing_cycle` - Monthly/yearly period lengths
//! - `history` - Status log, period extensions, pending plan changes
//! - `pause_guard` - Voluntary pause allowance
//! - `errors` - SubscriptionError
//! - `events` - Domain events emitted on every change

mod aggregate;
mod billing_cycle;
mod errors;
mod events;
mod history;
mod pause_guard;
mod status;

pub use aggregate::{GatewayReference, PendingCancellation, Subscription, NON_PAYMENT_REASON};
pub use billing_cycle::BillingCycle;
pub use errors::SubscriptionError;
pub use events::{SubscriptionEvent, SubscriptionEventKind};
pub use history::{PauseReason, PendingPlanChange, PeriodExtension, StatusTransition};
pub use pause_guard::PauseCycleGuard;
pub use status::SubscriptionStatus;
