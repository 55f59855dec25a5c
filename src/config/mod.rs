//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables using the
//! `config` and `dotenvy` crates. Variables use the `SUBSCRIPTION_BILLING`
//! prefix and `__` between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use subscription_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Sweeping every {:?}", config.sweep.interval());
//! ```

mod billing;
mod database;
mod error;
mod logging;
mod sweep;

pub use billing::{BillingConfig, DunningConfig};
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;
pub use sweep::SweepConfig;

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration (PostgreSQL connection)
    pub database: DatabaseConfig,

    /// Pause allowance and dunning timings
    #[serde(default)]
    pub billing: BillingConfig,

    /// Dunning sweep schedule
    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SUBSCRIPTION_BILLING` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    ///
    /// # Environment Variable Format
    ///
    /// - `SUBSCRIPTION_BILLING__DATABASE__URL=...` -> `database.url`
    /// - `SUBSCRIPTION_BILLING__BILLING__DUNNING__RETRY_DAYS=1,3,7` ->
    ///   `billing.dunning.retry_days`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or values
    /// cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SUBSCRIPTION_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Load and validate in one step.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        self.billing.validate()?;
        self.sweep.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "SUBSCRIPTION_BILLING__DATABASE__URL",
        "SUBSCRIPTION_BILLING__BILLING__MAX_PAUSE_CYCLES",
        "SUBSCRIPTION_BILLING__BILLING__DUNNING__RETRY_DAYS",
        "SUBSCRIPTION_BILLING__BILLING__DUNNING__CANCEL_AFTER_DAYS",
        "SUBSCRIPTION_BILLING__SWEEP__INTERVAL_SECS",
        "SUBSCRIPTION_BILLING__LOGGING__JSON",
    ];

    fn set_minimal_env() {
        env::set_var(
            "SUBSCRIPTION_BILLING__DATABASE__URL",
            "postgresql://test@localhost/test",
        );
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(
            config.database.url.expose_secret(),
            "postgresql://test@localhost/test"
        );
        assert_eq!(config.billing, BillingConfig::default());
        assert_eq!(config.sweep, SweepConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SUBSCRIPTION_BILLING__BILLING__MAX_PAUSE_CYCLES", "5");
        env::set_var("SUBSCRIPTION_BILLING__BILLING__DUNNING__RETRY_DAYS", "2,4,8");
        env::set_var("SUBSCRIPTION_BILLING__SWEEP__INTERVAL_SECS", "60");
        env::set_var("SUBSCRIPTION_BILLING__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.billing.max_pause_cycles, 5);
        assert_eq!(config.billing.dunning.retry_days, vec![2, 4, 8]);
        assert_eq!(config.sweep.interval_secs, 60);
        assert!(config.logging.json);
    }

    #[test]
    fn test_missing_database_url_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_load_validated_rejects_bad_timings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SUBSCRIPTION_BILLING__BILLING__DUNNING__CANCEL_AFTER_DAYS", "7");
        let result = AppConfig::load_validated();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::ValidationFailed(
                ValidationError::CancelBeforeSuspend { .. }
            ))
        ));
    }
}
