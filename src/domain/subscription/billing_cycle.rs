//! Billing cycle value object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often a subscription is billed.
///
/// Periods are fixed-length day counts, not calendar months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    /// Length of one billing period in days.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingCycle::Monthly => 30,
            BillingCycle::Yearly => 365,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            other => Err(format!("unknown billing cycle '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_lengths() {
        assert_eq!(BillingCycle::Monthly.period_days(), 30);
        assert_eq!(BillingCycle::Yearly.period_days(), 365);
    }

    #[test]
    fn parses_from_storage() {
        assert_eq!("yearly".parse::<BillingCycle>(), Ok(BillingCycle::Yearly));
        assert!("weekly".parse::<BillingCycle>().is_err());
    }
}
