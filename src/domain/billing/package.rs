//! Package price reference and entitlement assignment.
//!
//! Both records are owned by the entitlement catalog; the billing core
//! only reads prices and asks for assignment status changes.

use crate::domain::foundation::{Currency, PackageAssignmentId, PackageCode, WorkspaceId};
use crate::domain::subscription::BillingCycle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A sellable feature package with its list prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub code: PackageCode,
    pub name: String,
    pub monthly_price: Decimal,
    pub yearly_price: Decimal,
    pub currency: Currency,
}

impl Package {
    /// List price for one period of the given cycle.
    pub fn price_for(&self, cycle: BillingCycle) -> Decimal {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }
}

/// Access state of a workspace's package assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Active,
    Suspended,
    Expired,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Active => "active",
            AssignmentStatus::Suspended => "suspended",
            AssignmentStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AssignmentStatus::Active),
            "suspended" => Ok(AssignmentStatus::Suspended),
            "expired" => Ok(AssignmentStatus::Expired),
            other => Err(format!("unknown assignment status '{}'", other)),
        }
    }
}

/// Grants a workspace access to a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAssignment {
    pub id: PackageAssignmentId,
    pub workspace_id: WorkspaceId,
    pub package_code: PackageCode,
    pub status: AssignmentStatus,
}
