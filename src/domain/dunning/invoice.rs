//! Dunning view of an invoice.
//!
//! The invoicing collaborator owns the invoice; this core reads and writes
//! only the status and charge-attempt bookkeeping.

use crate::domain::foundation::{Currency, InvoiceId, SubscriptionId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Invoice settlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Overdue,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    /// Paid or void; dunning never touches these again.
    pub fn is_settled(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "paid" => Ok(InvoiceStatus::Paid),
            "void" => Ok(InvoiceStatus::Void),
            other => Err(format!("unknown invoice status '{}'", other)),
        }
    }
}

/// Invoice fields the dunning engine works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub subscription_id: SubscriptionId,
    pub status: InvoiceStatus,
    pub amount_due: Decimal,
    pub currency: Currency,
    pub due_at: Timestamp,
    pub charge_attempts: u32,
    pub next_charge_attempt: Option<Timestamp>,
    pub last_charge_attempt: Option<Timestamp>,
    pub paid_at: Option<Timestamp>,

    /// Optimistic concurrency counter.
    pub version: u64,
    pub updated_at: Timestamp,
}

impl Invoice {
    /// A freshly issued invoice awaiting its first charge.
    pub fn issue(
        id: InvoiceId,
        subscription_id: SubscriptionId,
        amount_due: Decimal,
        currency: Currency,
        due_at: Timestamp,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            subscription_id,
            status: InvoiceStatus::Sent,
            amount_due,
            currency,
            due_at,
            charge_attempts: 0,
            next_charge_attempt: None,
            last_charge_attempt: None,
            paid_at: None,
            version: 0,
            updated_at: now,
        }
    }

    /// Overdue with a scheduled retry that has come due.
    pub fn is_due_for_retry(&self, now: Timestamp) -> bool {
        self.status == InvoiceStatus::Overdue
            && self.paid_at.is_none()
            && self.next_charge_attempt.is_some_and(|at| !at.is_after(&now))
    }

    /// Overdue with no automatic retry left.
    pub fn retries_exhausted(&self) -> bool {
        self.status == InvoiceStatus::Overdue && self.next_charge_attempt.is_none()
    }

    /// Record a failed charge. Returns the index used to look up the next
    /// retry delay, i.e. `charge_attempts - 1` after the increment.
    pub fn record_failed_charge(&mut self, now: Timestamp) -> usize {
        self.status = InvoiceStatus::Overdue;
        self.charge_attempts += 1;
        self.last_charge_attempt = Some(now);
        self.touch(now);
        (self.charge_attempts - 1) as usize
    }

    pub fn schedule_next_attempt(&mut self, at: Option<Timestamp>) {
        self.next_charge_attempt = at;
    }

    /// Settle after a successful charge.
    pub fn mark_paid(&mut self, now: Timestamp) {
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(now);
        self.next_charge_attempt = None;
        self.last_charge_attempt = Some(now);
        self.touch(now);
    }

    fn touch(&mut self, now: Timestamp) {
        self.updated_at = now;
        self.version += 1;
    }
}
