//! Stock account observers

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::model::AccountId;
use common::Amount;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::notifier::{AccountChange, AccountObserver, ObserverError};

/// Logs every account change and keeps an audit trail in memory
#[derive(Default)]
pub struct AuditLogObserver {
    entries: Mutex<Vec<AccountChange>>,
}

impl AuditLogObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded changes, oldest first
    pub async fn entries(&self) -> Vec<AccountChange> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AccountObserver for AuditLogObserver {
    fn name(&self) -> &str {
        "audit-log"
    }

    async fn on_account_changed(&self, change: &AccountChange) -> Result<(), ObserverError> {
        let record = serde_json::to_string(change)
            .map_err(|e| ObserverError::Failed(format!("Cannot serialize audit record: {}", e)))?;
        info!(target: "audit", "{}", record);

        self.entries.lock().await.push(change.clone());
        Ok(())
    }
}

/// A balance that fell below the alert threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceAlert {
    pub account_id: AccountId,
    pub current_sum: Amount,
    pub threshold: Amount,
    pub raised_at: DateTime<Utc>,
}

/// Raises an alert whenever a change leaves an account below a threshold
pub struct BalanceThresholdObserver {
    threshold: Amount,
    alerts: Mutex<Vec<BalanceAlert>>,
}

impl BalanceThresholdObserver {
    pub fn new(threshold: Amount) -> Self {
        Self {
            threshold,
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn threshold(&self) -> Amount {
        self.threshold
    }

    /// Alerts raised so far, oldest first
    pub async fn alerts(&self) -> Vec<BalanceAlert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AccountObserver for BalanceThresholdObserver {
    fn name(&self) -> &str {
        "balance-threshold"
    }

    async fn on_account_changed(&self, change: &AccountChange) -> Result<(), ObserverError> {
        let current_sum = match change.current_sum {
            Some(sum) if sum < self.threshold => sum,
            _ => return Ok(()),
        };

        warn!(
            "Account {} balance {} is below threshold {}",
            change.account_id, current_sum, self.threshold
        );
        self.alerts.lock().await.push(BalanceAlert {
            account_id: change.account_id,
            current_sum,
            threshold: self.threshold,
            raised_at: Utc::now(),
        });
        Ok(())
    }
}
