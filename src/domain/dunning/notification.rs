//! Customer-facing notifications raised by dunning.

use crate::domain::foundation::{Currency, InvoiceId, SubscriptionId, Timestamp, WorkspaceId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A message for the notification channel. Delivery is external.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum DunningNotification {
    PaymentFailed {
        subscription_id: SubscriptionId,
        workspace_id: WorkspaceId,
        invoice_id: InvoiceId,
        amount_due: Decimal,
        currency: Currency,
        charge_attempts: u32,
        next_charge_attempt: Option<Timestamp>,
    },
    SubscriptionPaused {
        subscription_id: SubscriptionId,
        workspace_id: WorkspaceId,
        paused_at: Timestamp,
    },
    AccountSuspended {
        subscription_id: SubscriptionId,
        workspace_id: WorkspaceId,
        suspended_at: Timestamp,
    },
    SubscriptionCancelled {
        subscription_id: SubscriptionId,
        workspace_id: WorkspaceId,
        cancelled_at: Timestamp,
        reason: String,
    },
}

impl DunningNotification {
    /// Template name used by the notification channel.
    pub fn name(&self) -> &'static str {
        match self {
            DunningNotification::PaymentFailed { .. } => "PaymentFailed",
            DunningNotification::SubscriptionPaused { .. } => "SubscriptionPaused",
            DunningNotification::AccountSuspended { .. } => "AccountSuspended",
            DunningNotification::SubscriptionCancelled { .. } => "SubscriptionCancelled",
        }
    }

    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            DunningNotification::PaymentFailed { subscription_id, .. }
            | DunningNotification::SubscriptionPaused { subscription_id, .. }
            | DunningNotification::AccountSuspended { subscription_id, .. }
            | DunningNotification::SubscriptionCancelled { subscription_id, .. } => *subscription_id,
        }
    }
}
