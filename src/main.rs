//! dunning-sweeper - Runs the dunning sweep on a fixed interval.
//!
//! Charges are retried by an external charger, so the sweep runs without
//! a payment gateway: it escalates exhausted invoices through pause,
//! suspension and cancellation. Notifications and events go to the log.

use std::sync::Arc;

use subscription_billing::adapters::postgres::{
    self, PostgresEntitlementService, PostgresInvoiceRepository, PostgresSubscriptionRepository,
};
use subscription_billing::adapters::{LoggingEventPublisher, LoggingNotificationDispatcher, SystemClock};
use subscription_billing::application::{DunningEngine, DunningSweep};
use subscription_billing::config::AppConfig;
use subscription_billing::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load_validated()?;
    telemetry::init(&config.logging);

    let pool = postgres::connect(&config.database).await?;
    if config.database.run_migrations {
        postgres::run_migrations(&pool).await?;
    }

    let engine = DunningEngine::new(
        Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        Arc::new(PostgresInvoiceRepository::new(pool.clone())),
        Arc::new(PostgresEntitlementService::new(pool.clone())),
        Arc::new(LoggingNotificationDispatcher),
        Arc::new(LoggingEventPublisher),
        Arc::new(SystemClock),
        config.billing.dunning.policy(),
    )
    .with_batch_limit(config.sweep.batch_limit);
    let sweep = DunningSweep::new(Arc::new(engine));

    tracing::info!(
        interval_secs = config.sweep.interval_secs,
        batch_limit = config.sweep.batch_limit,
        "Dunning sweeper started"
    );

    let mut ticker = tokio::time::interval(config.sweep.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = sweep.run_once().await {
                    tracing::error!(error = %err, "Dunning sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    pool.close().await;
    Ok(())
}
