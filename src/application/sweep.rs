//! DunningSweep - One pass of the periodic dunning job.
//!
//! Order: retry due charges, then pause, suspend, cancel. Each stage reads
//! its candidates fresh, so a subscription paused in this pass is only
//! considered for suspension once its own clock has run.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::dunning::Invoice;
use crate::domain::foundation::SubscriptionId;
use crate::domain::subscription::SubscriptionError;
use crate::ports::{ChargeOutcome, PaymentGateway};

use super::{DunningEngine, DunningOutcome};

tokio::task_local! {
    /// Id of the sweep run driving the current task.
    static SWEEP_RUN_ID: String;
}

/// Correlation id for events published during a sweep run.
pub(super) fn current_run_id() -> Option<String> {
    SWEEP_RUN_ID.try_with(|id| id.clone()).ok()
}

/// Counts for one stage of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTally {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl StageTally {
    fn record(&mut self, result: &Result<DunningOutcome, SubscriptionError>) {
        match result {
            Ok(DunningOutcome::Applied) => self.applied += 1,
            Ok(DunningOutcome::Skipped { .. }) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub retried: StageTally,
    pub paused: StageTally,
    pub suspended: StageTally,
    pub cancelled: StageTally,
}

impl SweepReport {
    pub fn is_idle(&self) -> bool {
        self.retried.total() + self.paused.total() + self.suspended.total() + self.cancelled.total()
            == 0
    }
}

/// Runs the dunning stages against the engine.
///
/// Without a gateway the retry stage is left to an external charger and
/// only the escalation stages run.
pub struct DunningSweep {
    engine: Arc<DunningEngine>,
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl DunningSweep {
    pub fn new(engine: Arc<DunningEngine>) -> Self {
        Self {
            engine,
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// One full pass. Per-item failures are counted and logged; only a
    /// failing candidate query aborts the pass.
    ///
    /// Events published during the pass share one correlation id.
    pub async fn run_once(&self) -> Result<SweepReport, SubscriptionError> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("dunning_sweep", run_id = %run_id);
        SWEEP_RUN_ID
            .scope(run_id, self.run_stages().instrument(span))
            .await
    }

    async fn run_stages(&self) -> Result<SweepReport, SubscriptionError> {
        let mut report = SweepReport::default();

        if let Some(gateway) = &self.gateway {
            for invoice in self.engine.get_invoices_due_for_retry().await? {
                let result = self.retry_charge(gateway.as_ref(), &invoice).await;
                log_failure("retry", invoice.subscription_id, &result);
                report.retried.record(&result);
            }
        }

        for subscription in self.engine.get_subscriptions_for_pause().await? {
            let result = self.engine.pause_subscription(subscription.id).await;
            log_failure("pause", subscription.id, &result);
            report.paused.record(&result);
        }

        for subscription in self.engine.get_subscriptions_for_suspension().await? {
            let result = self.engine.suspend_workspace(subscription.id).await;
            log_failure("suspend", subscription.id, &result);
            report.suspended.record(&result);
        }

        for subscription in self.engine.get_subscriptions_for_cancellation().await? {
            let result = self.engine.cancel_subscription(subscription.id).await;
            log_failure("cancel", subscription.id, &result);
            report.cancelled.record(&result);
        }

        tracing::info!(
            retried = report.retried.applied,
            paused = report.paused.applied,
            suspended = report.suspended.applied,
            cancelled = report.cancelled.applied,
            skipped = report.retried.skipped
                + report.paused.skipped
                + report.suspended.skipped
                + report.cancelled.skipped,
            "Dunning sweep finished"
        );
        Ok(report)
    }

    async fn retry_charge(
        &self,
        gateway: &dyn PaymentGateway,
        invoice: &Invoice,
    ) -> Result<DunningOutcome, SubscriptionError> {
        match gateway.attempt_charge(invoice).await? {
            ChargeOutcome::Succeeded => self.engine.handle_payment_recovery(invoice.id).await,
            ChargeOutcome::Failed { reason } => {
                tracing::info!(invoice_id = %invoice.id, %reason, "Retry charge declined");
                self.engine.handle_payment_failure(invoice.id).await
            }
        }
    }
}

fn log_failure(
    stage: &'static str,
    subscription_id: SubscriptionId,
    result: &Result<DunningOutcome, SubscriptionError>,
) {
    if let Err(err) = result {
        tracing::warn!(stage, subscription_id = %subscription_id, error = %err, "Dunning sweep item failed");
    }
}
