//! Shared in-memory harness for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use subscription_billing::adapters::clock::FixedClock;
use subscription_billing::adapters::events::InMemoryEventBus;
use subscription_billing::adapters::memory::{
    InMemoryEntitlementService, InMemoryInvoiceRepository, InMemoryNotificationDispatcher,
    InMemoryPackageCatalog, InMemorySubscriptionRepository,
};
use subscription_billing::application::{
    CreateSubscriptionCommand, DunningEngine, PlanChangeScheduler, ProrationCalculator,
    SubscriptionLifecycle,
};
use subscription_billing::domain::billing::{AssignmentStatus, Package, PackageAssignment};
use subscription_billing::domain::dunning::{DunningPolicy, Invoice};
use subscription_billing::domain::foundation::{
    Currency, InvoiceId, PackageAssignmentId, PackageCode, Timestamp, WorkspaceId,
};
use subscription_billing::domain::subscription::{
    BillingCycle, GatewayReference, PauseCycleGuard, Subscription,
};
use subscription_billing::ports::{Clock, InvoiceRepository, SubscriptionRepository};

/// 2024-01-15T00:00:00Z
pub fn t0() -> Timestamp {
    Timestamp::from_unix_secs(1_705_276_800).unwrap()
}

pub fn code(s: &str) -> PackageCode {
    PackageCode::new(s).unwrap()
}

pub fn package(c: &str, monthly: Decimal) -> Package {
    Package {
        code: code(c),
        name: c.to_string(),
        monthly_price: monthly,
        yearly_price: monthly * dec!(10),
        currency: Currency::new("GBP").unwrap(),
    }
}

pub struct Harness {
    pub subscriptions: InMemorySubscriptionRepository,
    pub invoices: InMemoryInvoiceRepository,
    pub catalog: InMemoryPackageCatalog,
    pub entitlements: InMemoryEntitlementService,
    pub notifications: InMemoryNotificationDispatcher,
    pub bus: Arc<InMemoryEventBus>,
    pub clock: FixedClock,
    pub lifecycle: SubscriptionLifecycle,
    pub proration: ProrationCalculator,
    pub plan_changes: PlanChangeScheduler,
    pub dunning: Arc<DunningEngine>,
}

impl Harness {
    pub fn new(max_pause_cycles: u32) -> Self {
        let subscriptions = InMemorySubscriptionRepository::new();
        let invoices = InMemoryInvoiceRepository::new();
        let catalog = InMemoryPackageCatalog::with_packages([
            package("starter", dec!(19)),
            package("pro", dec!(49)),
        ]);
        let entitlements = InMemoryEntitlementService::new();
        let notifications = InMemoryNotificationDispatcher::new();
        let bus = Arc::new(InMemoryEventBus::new());
        let clock = FixedClock::new(t0());

        let clock_port: Arc<dyn Clock> = Arc::new(clock.clone());
        let subscription_port: Arc<dyn SubscriptionRepository> = Arc::new(subscriptions.clone());

        let lifecycle = SubscriptionLifecycle::new(
            subscription_port.clone(),
            Arc::new(entitlements.clone()),
            bus.clone(),
            clock_port.clone(),
            PauseCycleGuard::new(max_pause_cycles),
        );
        let proration = ProrationCalculator::new(
            subscription_port.clone(),
            Arc::new(catalog.clone()),
            clock_port.clone(),
        );
        let plan_changes = PlanChangeScheduler::new(
            subscription_port.clone(),
            Arc::new(entitlements.clone()),
            proration.clone(),
            bus.clone(),
            clock_port.clone(),
        );
        let dunning = Arc::new(DunningEngine::new(
            subscription_port,
            Arc::new(invoices.clone()),
            Arc::new(entitlements.clone()),
            Arc::new(notifications.clone()),
            bus.clone(),
            clock_port,
            DunningPolicy::default(),
        ));

        Self {
            subscriptions,
            invoices,
            catalog,
            entitlements,
            notifications,
            bus,
            clock,
            lifecycle,
            proration,
            plan_changes,
            dunning,
        }
    }

    /// Seed an active assignment and start a monthly subscription on it.
    pub async fn subscribe(&self, package_code: &str) -> Subscription {
        let assignment = PackageAssignment {
            id: PackageAssignmentId::new(),
            workspace_id: WorkspaceId::new(),
            package_code: code(package_code),
            status: AssignmentStatus::Active,
        };
        self.entitlements.insert(assignment.clone()).await;

        self.lifecycle
            .create(CreateSubscriptionCommand {
                package_assignment_id: assignment.id,
                billing_cycle: BillingCycle::Monthly,
                gateway: GatewayReference::new("stripe")
                    .with_customer_id("cus_test")
                    .with_subscription_id("sub_test"),
            })
            .await
            .unwrap()
    }

    /// Issue an invoice due now.
    pub async fn issue_invoice(&self, subscription: &Subscription, amount: Decimal) -> Invoice {
        let now = self.clock.now();
        let invoice = Invoice::issue(
            InvoiceId::new(),
            subscription.id,
            amount,
            Currency::new("GBP").unwrap(),
            now,
            now,
        );
        self.invoices.save(&invoice).await.unwrap();
        invoice
    }

    /// Another engine over the same stores, standing in for a second worker.
    pub fn second_engine(&self) -> Arc<DunningEngine> {
        Arc::new(DunningEngine::new(
            Arc::new(self.subscriptions.clone()),
            Arc::new(self.invoices.clone()),
            Arc::new(self.entitlements.clone()),
            Arc::new(self.notifications.clone()),
            self.bus.clone(),
            Arc::new(self.clock.clone()),
            DunningPolicy::default(),
        ))
    }

    pub fn clock_now(&self) -> Timestamp {
        self.clock.now()
    }

    pub async fn reload(&self, subscription: &Subscription) -> Subscription {
        self.subscriptions.get(&subscription.id).await.unwrap()
    }

    pub async fn reload_invoice(&self, invoice: &Invoice) -> Invoice {
        self.invoices.get(&invoice.id).await.unwrap()
    }

    /// Fail each scheduled retry, moving the clock to it, until none is left.
    pub async fn fail_until_exhausted(&self, invoice: &Invoice) {
        loop {
            self.dunning.handle_payment_failure(invoice.id).await.unwrap();
            match self.reload_invoice(invoice).await.next_charge_attempt {
                Some(at) => self.clock.set(at),
                None => break,
            }
        }
    }
}
