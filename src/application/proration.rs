//! ProrationCalculator - Proration previews backed by the package catalog.

use std::sync::Arc;

use crate::domain::billing::{calculate_proration, Package, ProrationResult};
use crate::domain::foundation::{PackageCode, SubscriptionId};
use crate::domain::subscription::{BillingCycle, Subscription, SubscriptionError};
use crate::ports::{Clock, PackageCatalog, SubscriptionRepository};

/// Resolves packages and runs the pure proration arithmetic against the
/// injected clock. Never writes.
#[derive(Clone)]
pub struct ProrationCalculator {
    subscriptions: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn PackageCatalog>,
    clock: Arc<dyn Clock>,
}

impl ProrationCalculator {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        catalog: Arc<dyn PackageCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            clock,
        }
    }

    /// Proration for moving between two explicit packages.
    pub fn calculate_proration(
        &self,
        subscription: &Subscription,
        from: &Package,
        to: &Package,
        cycle: BillingCycle,
    ) -> Result<ProrationResult, SubscriptionError> {
        calculate_proration(subscription, from, to, cycle, self.clock.now())
            .map_err(SubscriptionError::from)
    }

    /// Preview a change of `id` to `new_package_code` without mutating it.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the subscription does not exist
    /// - `ValidationFailed` if its current package cannot be resolved
    /// - `PackageNotFound` if the target package does not exist
    pub async fn preview_plan_change(
        &self,
        id: SubscriptionId,
        new_package_code: &PackageCode,
    ) -> Result<ProrationResult, SubscriptionError> {
        let subscription = self
            .subscriptions
            .find_by_id(&id)
            .await?
            .ok_or(SubscriptionError::NotFound(id))?;
        let new_package = self.resolve_package(new_package_code).await?;
        self.preview_for(&subscription, &new_package).await
    }

    /// Preview against an already-loaded subscription and target package.
    pub async fn preview_for(
        &self,
        subscription: &Subscription,
        new_package: &Package,
    ) -> Result<ProrationResult, SubscriptionError> {
        let current = self
            .catalog
            .find_by_code(&subscription.package_code)
            .await?
            .ok_or_else(|| {
                SubscriptionError::validation(
                    "package_code",
                    format!(
                        "current package {} of subscription {} cannot be resolved",
                        subscription.package_code, subscription.id
                    ),
                )
            })?;

        let result = self.calculate_proration(
            subscription,
            &current,
            new_package,
            subscription.billing_cycle,
        )?;
        tracing::debug!(
            subscription_id = %subscription.id,
            to_package = %new_package.code,
            net_amount = %result.net_amount,
            "Proration previewed"
        );
        Ok(result)
    }

    pub(crate) async fn resolve_package(
        &self,
        code: &PackageCode,
    ) -> Result<Package, SubscriptionError> {
        self.catalog
            .find_by_code(code)
            .await?
            .ok_or_else(|| SubscriptionError::PackageNotFound(code.to_string()))
    }
}
