//! Configuration for the account service

use std::env;
use std::time::Duration;

use common::Amount;

use crate::notifier::DEFAULT_OBSERVER_TIMEOUT;

/// Configuration for the account service
#[derive(Debug, Clone)]
pub struct AccountServiceConfig {
    /// Database URL; `None` keeps everything in memory
    pub database_url: Option<String>,
    /// Database connection pool size
    pub db_pool_size: u32,
    /// Enable transaction logging
    pub transaction_logging: bool,
    /// Bound on a single observer call
    pub observer_timeout: Duration,
    /// Balance below which the threshold observer raises alerts
    pub balance_alert_threshold: Option<Amount>,
}

impl Default for AccountServiceConfig {
    fn default() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").ok(),
            db_pool_size: env::var("DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            transaction_logging: env::var("TRANSACTION_LOGGING")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            observer_timeout: env::var("OBSERVER_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_OBSERVER_TIMEOUT),
            balance_alert_threshold: env::var("BALANCE_ALERT_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

impl AccountServiceConfig {
    /// Create a new configuration using environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create a new configuration with custom values
    pub fn new(database_url: Option<String>, db_pool_size: u32, transaction_logging: bool) -> Self {
        Self {
            database_url,
            db_pool_size,
            transaction_logging,
            observer_timeout: DEFAULT_OBSERVER_TIMEOUT,
            balance_alert_threshold: None,
        }
    }

    /// An in-memory configuration
    pub fn in_memory() -> Self {
        Self::new(None, 5, false)
    }

    pub fn with_observer_timeout(mut self, timeout: Duration) -> Self {
        self.observer_timeout = timeout;
        self
    }

    pub fn with_balance_alert_threshold(mut self, threshold: Amount) -> Self {
        self.balance_alert_threshold = Some(threshold);
        self
    }
}
