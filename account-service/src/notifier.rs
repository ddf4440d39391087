//! Change notification for account mutations
//!
//! Observers subscribe to the [`ChangeNotifier`] and are called, in
//! subscription order, after each committed mutation. Every call is bounded
//! by the notifier's timeout and isolated from the others: an observer that
//! fails, panics or times out is recorded in the [`NotificationReport`] and
//! the remaining observers still run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::model::AccountId;
use common::Amount;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default bound on a single observer call
pub const DEFAULT_OBSERVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Subscription identifier
pub type SubscriptionId = Uuid;

/// Nature of an account mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    OperationApplied,
}

/// A committed change to one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountChange {
    /// Affected account
    pub account_id: AccountId,
    /// What happened
    pub kind: ChangeKind,
    /// Balance after the change; `None` once the account is gone
    pub current_sum: Option<Amount>,
    /// When the change was committed
    pub occurred_at: DateTime<Utc>,
}

impl AccountChange {
    pub fn new(account_id: AccountId, kind: ChangeKind, current_sum: Option<Amount>) -> Self {
        Self {
            account_id,
            kind,
            current_sum,
            occurred_at: Utc::now(),
        }
    }
}

/// Failure raised by a single observer
#[derive(Debug, Error)]
pub enum ObserverError {
    /// The observer reported an error
    #[error("{0}")]
    Failed(String),

    /// The observer did not finish in time
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The observer panicked
    #[error("panicked: {0}")]
    Panicked(String),
}

/// An observer failure, attributed to its subscription
#[derive(Debug)]
pub struct ObserverFailure {
    pub subscription: SubscriptionId,
    pub observer: String,
    pub error: ObserverError,
}

/// Outcome of one notification fan-out
#[derive(Debug, Default)]
pub struct NotificationReport {
    /// Observers that handled the change
    pub delivered: usize,
    /// Observers that failed, in call order
    pub failures: Vec<ObserverFailure>,
}

impl NotificationReport {
    /// Whether every observer handled the change
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Receives account changes
#[async_trait]
pub trait AccountObserver: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handle a committed change
    async fn on_account_changed(&self, change: &AccountChange) -> Result<(), ObserverError>;
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    observer: Arc<dyn AccountObserver>,
}

/// Registry of account observers
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Subscriber>>,
    timeout: Duration,
}

impl ChangeNotifier {
    /// Create a notifier with the default observer timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OBSERVER_TIMEOUT)
    }

    /// Create a notifier bounding each observer call by `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Register an observer
    pub async fn subscribe(&self, observer: Arc<dyn AccountObserver>) -> SubscriptionId {
        let id = Uuid::new_v4();
        debug!("Subscribing observer {} as {}", observer.name(), id);

        self.subscribers.lock().await.push(Subscriber { id, observer });
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().await;
        let initial_len = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        subscribers.len() < initial_len
    }

    /// Remove every subscription of this observer instance
    pub async fn unsubscribe_observer(&self, observer: &Arc<dyn AccountObserver>) -> bool {
        let target = Arc::as_ptr(observer) as *const ();
        let mut subscribers = self.subscribers.lock().await;
        let initial_len = subscribers.len();
        subscribers.retain(|subscriber| Arc::as_ptr(&subscriber.observer) as *const () != target);
        subscribers.len() < initial_len
    }

    /// Number of subscriptions
    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Call every observer with `change`, in subscription order
    pub async fn notify(&self, change: &AccountChange) -> NotificationReport {
        // Snapshot so observers may (un)subscribe from inside their callback
        let snapshot: Vec<Subscriber> = self.subscribers.lock().await.clone();
        let mut report = NotificationReport::default();

        for subscriber in snapshot {
            let call = AssertUnwindSafe(subscriber.observer.on_account_changed(change)).catch_unwind();
            let outcome = match tokio::time::timeout(self.timeout, call).await {
                Ok(Ok(result)) => result,
                Ok(Err(panic)) => Err(ObserverError::Panicked(panic_message(panic))),
                Err(_) => Err(ObserverError::TimedOut(self.timeout)),
            };

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(
                        "Observer {} failed on {:?} of account {}: {}",
                        subscriber.observer.name(),
                        change.kind,
                        change.account_id,
                        error
                    );
                    report.failures.push(ObserverFailure {
                        subscription: subscriber.id,
                        observer: subscriber.observer.name().to_string(),
                        error,
                    });
                }
            }
        }

        report
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
