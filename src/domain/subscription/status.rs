//! Subscription status state machine.

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a subscription sits in the billing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Checkout started but the first payment never settled.
    Incomplete,

    /// Free trial window; converts to active on first renewal.
    Trialing,

    /// Paid and in good standing.
    Active,

    /// Latest charge failed; dunning retries are running.
    PastDue,

    /// Billing suspended, either voluntarily or by dunning.
    Paused,

    /// Ended by an administrative cancellation.
    Cancelled,

    /// Ended at period end or by dunning.
    Expired,
}

impl SubscriptionStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    /// Statuses from which a period can be rolled forward.
    pub fn is_renewable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }
}

impl StateMachine for SubscriptionStatus {
    const ALL: &'static [Self] = &[
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Cancelled,
        SubscriptionStatus::Expired,
    ];

    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From INCOMPLETE
            (Incomplete, Active)
                | (Incomplete, Expired)
            // From TRIALING
                | (Trialing, Active)
                | (Trialing, PastDue)
                | (Trialing, Paused)
                | (Trialing, Cancelled)
                | (Trialing, Expired)
            // From ACTIVE
                | (Active, Active) // Renewal
                | (Active, PastDue)
                | (Active, Paused)
                | (Active, Cancelled)
                | (Active, Expired)
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, PastDue) // Repeated failure
                | (PastDue, Paused)
                | (PastDue, Cancelled)
                | (PastDue, Expired)
            // From PAUSED
                | (Paused, Active)
                | (Paused, PastDue) // Failed charge during a voluntary pause
                | (Paused, Cancelled)
                | (Paused, Expired)
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown subscription status '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SubscriptionStatus::*;

    #[test]
    fn cancelled_and_expired_are_terminal() {
        assert!(Cancelled.is_terminal());
        assert!(Expired.is_terminal());
        for status in [Incomplete, Trialing, Active, PastDue, Paused] {
            assert!(!status.is_terminal(), "{:?} should not be terminal", status);
        }
    }

    #[test]
    fn paused_can_fall_past_due() {
        assert_eq!(Paused.transition_to(PastDue), Ok(PastDue));
        assert!(!Cancelled.can_transition_to(&PastDue));
    }

    #[test]
    fn active_renews_into_active() {
        assert_eq!(Active.transition_to(Active), Ok(Active));
    }

    #[test]
    fn incomplete_cannot_pause() {
        assert!(Incomplete.transition_to(Paused).is_err());
    }

    #[test]
    fn renewable_statuses() {
        assert!(Active.is_renewable());
        assert!(Trialing.is_renewable());
        assert!(PastDue.is_renewable());
        assert!(!Paused.is_renewable());
        assert!(!Expired.is_renewable());
    }

    #[test]
    fn parses_storage_representation() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>(), Ok(*status));
        }
        assert!("archived".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&PastDue).unwrap(), r#""past_due""#);
    }
}
