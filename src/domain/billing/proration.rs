//! Mid-cycle plan change proration.
//!
//! Pure arithmetic: no I/O and no clock access. Day counts are whole days,
//! floored; money is rounded to 2 dp, half away from zero.

use crate::domain::foundation::{round_money, Currency, Timestamp, ValidationError};
use crate::domain::subscription::{BillingCycle, Subscription};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Package;

/// Credit and charge for switching plans part way through a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrationResult {
    pub days_remaining: i64,
    pub total_period_days: i64,
    pub current_plan_price: Decimal,
    pub new_plan_price: Decimal,
    /// Unused time on the old plan.
    pub credit_amount: Decimal,
    /// New plan cost for the same remaining span.
    pub prorated_new_plan_cost: Decimal,
    /// Positive means money is due, negative means a credit balance.
    pub net_amount: Decimal,
    pub currency: Currency,
}

impl ProrationResult {
    /// Builds a result from day counts and list prices.
    ///
    /// `days_remaining` is clamped into `0..=total_period_days`; an empty
    /// period yields a zero fraction.
    pub fn from_days(
        days_remaining: i64,
        total_period_days: i64,
        current_plan_price: Decimal,
        new_plan_price: Decimal,
        currency: Currency,
    ) -> Result<Self, ValidationError> {
        if current_plan_price.is_sign_negative() || new_plan_price.is_sign_negative() {
            return Err(ValidationError::invalid_format(
                "price",
                "plan prices cannot be negative",
            ));
        }

        let total_period_days = total_period_days.max(0);
        let days_remaining = days_remaining.clamp(0, total_period_days);
        let fraction = if total_period_days == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(days_remaining) / Decimal::from(total_period_days)
        };

        let credit_amount = round_money(prorate(current_plan_price, fraction)?);
        let prorated_new_plan_cost = round_money(prorate(new_plan_price, fraction)?);

        Ok(Self {
            days_remaining,
            total_period_days,
            current_plan_price,
            new_plan_price,
            credit_amount,
            prorated_new_plan_cost,
            net_amount: prorated_new_plan_cost - credit_amount,
            currency,
        })
    }

    /// Share of the period still ahead, in `[0, 1]`.
    pub fn remaining_fraction(&self) -> Decimal {
        if self.total_period_days == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.days_remaining) / Decimal::from(self.total_period_days)
    }

    pub fn is_upgrade(&self) -> bool {
        self.new_plan_price > self.current_plan_price
    }

    pub fn is_downgrade(&self) -> bool {
        self.new_plan_price < self.current_plan_price
    }

    pub fn is_same_price(&self) -> bool {
        self.new_plan_price == self.current_plan_price
    }

    pub fn requires_payment(&self) -> bool {
        self.net_amount > Decimal::ZERO
    }

    /// Credit left to the customer, never negative.
    pub fn credit_balance(&self) -> Decimal {
        (-self.net_amount).max(Decimal::ZERO)
    }

    /// Amount to collect, never negative.
    pub fn amount_due(&self) -> Decimal {
        self.net_amount.max(Decimal::ZERO)
    }
}

fn prorate(price: Decimal, fraction: Decimal) -> Result<Decimal, ValidationError> {
    price
        .checked_mul(fraction)
        .ok_or_else(|| ValidationError::invalid_format("price", "overflow in proration"))
}

/// Proration for moving `subscription` from `from` to `to` at `now`.
///
/// # Errors
///
/// Fails when the two packages are priced in different currencies or a
/// price is negative.
pub fn calculate_proration(
    subscription: &Subscription,
    from: &Package,
    to: &Package,
    cycle: BillingCycle,
    now: Timestamp,
) -> Result<ProrationResult, ValidationError> {
    if from.currency != to.currency {
        return Err(ValidationError::invalid_format(
            "currency",
            format!(
                "cannot prorate between {} and {} prices",
                from.currency, to.currency
            ),
        ));
    }

    let total_period_days = subscription
        .current_period_end
        .whole_days_since(&subscription.current_period_start);
    let days_remaining = subscription.current_period_end.whole_days_since(&now);

    ProrationResult::from_days(
        days_remaining,
        total_period_days,
        from.price_for(cycle),
        to.price_for(cycle),
        from.currency.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{
        PackageAssignmentId, PackageCode, SubscriptionId, WorkspaceId,
    };
    use crate::domain::subscription::GatewayReference;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn t0() -> Timestamp {
        Timestamp::from_unix_secs(1_705_276_800).unwrap()
    }

    fn gbp() -> Currency {
        Currency::new("GBP").unwrap()
    }

    fn package(code: &str, monthly: Decimal) -> Package {
        Package {
            code: PackageCode::new(code).unwrap(),
            name: code.to_uppercase(),
            monthly_price: monthly,
            yearly_price: monthly * dec!(10),
            currency: gbp(),
        }
    }

    fn subscription() -> Subscription {
        Subscription::create(
            SubscriptionId::new(),
            WorkspaceId::new(),
            PackageAssignmentId::new(),
            PackageCode::new("starter").unwrap(),
            BillingCycle::Monthly,
            GatewayReference::new("stripe"),
            t0(),
        )
    }

    #[test]
    fn upgrade_half_way_through_month() {
        let result = calculate_proration(
            &subscription(),
            &package("starter", dec!(19)),
            &package("pro", dec!(49)),
            BillingCycle::Monthly,
            t0().add_days(15),
        )
        .unwrap();

        assert_eq!(result.total_period_days, 30);
        assert_eq!(result.days_remaining, 15);
        assert_eq!(result.credit_amount, dec!(9.50));
        assert_eq!(result.prorated_new_plan_cost, dec!(24.50));
        assert_eq!(result.net_amount, dec!(15.00));
        assert!(result.is_upgrade());
        assert!(result.requires_payment());
        assert_eq!(result.amount_due(), dec!(15.00));
        assert_eq!(result.credit_balance(), Decimal::ZERO);
    }

    #[test]
    fn downgrade_half_way_through_month() {
        let result = calculate_proration(
            &subscription(),
            &package("pro", dec!(49)),
            &package("starter", dec!(19)),
            BillingCycle::Monthly,
            t0().add_days(15),
        )
        .unwrap();

        assert_eq!(result.credit_amount, dec!(24.50));
        assert_eq!(result.prorated_new_plan_cost, dec!(9.50));
        assert_eq!(result.net_amount, dec!(-15.00));
        assert_eq!(result.credit_balance(), dec!(15.00));
        assert!(result.is_downgrade());
        assert!(!result.requires_payment());
    }

    #[test]
    fn partial_days_are_floored() {
        let result = calculate_proration(
            &subscription(),
            &package("starter", dec!(30)),
            &package("pro", dec!(60)),
            BillingCycle::Monthly,
            t0().add_days(10).add_hours(6),
        )
        .unwrap();
        assert_eq!(result.days_remaining, 19);
    }

    #[test]
    fn after_period_end_nothing_remains() {
        let result = calculate_proration(
            &subscription(),
            &package("starter", dec!(19)),
            &package("pro", dec!(49)),
            BillingCycle::Monthly,
            t0().add_days(40),
        )
        .unwrap();

        assert_eq!(result.days_remaining, 0);
        assert_eq!(result.net_amount, Decimal::ZERO);
        assert!(!result.requires_payment());
    }

    #[test]
    fn yearly_cycle_uses_yearly_prices() {
        let result = calculate_proration(
            &subscription(),
            &package("starter", dec!(19)),
            &package("pro", dec!(49)),
            BillingCycle::Yearly,
            t0().add_days(15),
        )
        .unwrap();
        assert_eq!(result.current_plan_price, dec!(190));
        assert_eq!(result.new_plan_price, dec!(490));
    }

    #[test]
    fn currency_mismatch_is_rejected() {
        let mut usd = package("pro", dec!(49));
        usd.currency = Currency::new("USD").unwrap();

        let result = calculate_proration(
            &subscription(),
            &package("starter", dec!(19)),
            &usd,
            BillingCycle::Monthly,
            t0(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn thirds_round_half_away_from_zero() {
        let result =
            ProrationResult::from_days(1, 3, dec!(10), dec!(20), gbp()).unwrap();
        assert_eq!(result.credit_amount, dec!(3.33));
        assert_eq!(result.prorated_new_plan_cost, dec!(6.67));
        assert_eq!(result.net_amount, dec!(3.34));
    }

    #[test]
    fn zero_length_period_yields_zero_amounts() {
        let result = ProrationResult::from_days(5, 0, dec!(19), dec!(49), gbp()).unwrap();
        assert_eq!(result.days_remaining, 0);
        assert_eq!(result.credit_amount, Decimal::ZERO);
        assert_eq!(result.prorated_new_plan_cost, Decimal::ZERO);
    }

    #[test]
    fn same_price_is_flagged() {
        let result = ProrationResult::from_days(10, 30, dec!(19), dec!(19), gbp()).unwrap();
        assert!(result.is_same_price());
        assert!(!result.is_upgrade());
        assert!(!result.is_downgrade());
        assert_eq!(result.net_amount, Decimal::ZERO);
    }

    #[test]
    fn negative_price_is_rejected() {
        assert!(ProrationResult::from_days(10, 30, dec!(-1), dec!(19), gbp()).is_err());
    }

    fn price() -> impl Strategy<Value = Decimal> {
        (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
    }

    fn period() -> impl Strategy<Value = (i64, i64)> {
        (1i64..=366).prop_flat_map(|total| (0..=total, Just(total)))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_amounts_follow_rounded_fraction(
            current in price(),
            new in price(),
            (remaining, total) in period(),
        ) {
            let result = ProrationResult::from_days(remaining, total, current, new, gbp()).unwrap();
            let fraction = Decimal::from(remaining) / Decimal::from(total);

            prop_assert_eq!(result.credit_amount, round_money(current * fraction));
            prop_assert_eq!(result.prorated_new_plan_cost, round_money(new * fraction));
            prop_assert_eq!(result.net_amount, result.prorated_new_plan_cost - result.credit_amount);
        }

        #[test]
        fn prop_predicates_match_prices_and_net(
            current in price(),
            new in price(),
            (remaining, total) in period(),
        ) {
            let result = ProrationResult::from_days(remaining, total, current, new, gbp()).unwrap();

            prop_assert_eq!(result.is_upgrade(), new > current);
            prop_assert_eq!(result.is_downgrade(), new < current);
            prop_assert_eq!(result.requires_payment(), result.net_amount > Decimal::ZERO);
            prop_assert!(result.credit_balance() >= Decimal::ZERO);
            prop_assert!(result.amount_due() >= Decimal::ZERO);
            prop_assert_eq!(result.amount_due() - result.credit_balance(), result.net_amount);
        }

        #[test]
        fn prop_credit_never_exceeds_price(
            current in price(),
            (remaining, total) in period(),
        ) {
            let result = ProrationResult::from_days(remaining, total, current, current, gbp()).unwrap();

            prop_assert!(result.credit_amount <= current);
            prop_assert!(result.credit_amount >= Decimal::ZERO);
            prop_assert_eq!(result.net_amount, Decimal::ZERO);
        }
    }
}
