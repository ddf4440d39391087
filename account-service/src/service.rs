//! Account service implementation

use std::env;
use std::sync::Arc;

use common::db;
use common::error::{Error, ErrorExt, Result};
use common::model::{Account, AccountId, Entity, Operation, OperationKind};
use common::Amount;
use tracing::{debug, info, warn};

use crate::config::AccountServiceConfig;
use crate::notifier::{AccountChange, ChangeKind, ChangeNotifier, NotificationReport};
use crate::observers::BalanceThresholdObserver;
use crate::unit_of_work::UnitOfWork;

/// Account service for managing accounts and their operations
pub struct AccountService {
    /// Unit of work over the account and operation repositories
    uow: Arc<UnitOfWork>,
    /// Observers of committed changes
    notifier: Arc<ChangeNotifier>,
}

/// Repository Type
pub enum RepositoryType {
    /// In-memory repository
    InMemory,
    /// PostgreSQL repository
    Postgres(Option<String>),
}

/// A committed mutation together with the outcome of its notification
#[derive(Debug)]
pub struct Committed<T> {
    /// The committed value
    pub value: T,
    /// How the observers handled the change
    pub notifications: NotificationReport,
}

impl<T> Committed<T> {
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl AccountService {
    /// Create a new account service backed by memory
    pub fn new() -> Self {
        Self::with_parts(Arc::new(UnitOfWork::in_memory()), Arc::new(ChangeNotifier::new()))
    }

    /// Create an account service from an existing unit of work and notifier
    pub fn with_parts(uow: Arc<UnitOfWork>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { uow, notifier }
    }

    /// Create a new account service with a specific repository type
    pub async fn with_repository(repo_type: RepositoryType) -> Result<Self> {
        let uow = match repo_type {
            RepositoryType::InMemory => UnitOfWork::in_memory(),
            RepositoryType::Postgres(database_url) => {
                let database_url = match database_url {
                    Some(url) => url,
                    None => env::var("DATABASE_URL")
                        .map_err(|_| Error::ConfigurationError("DATABASE_URL must be set".to_string()))?,
                };
                let pool = db::init_db_pool(&database_url, 5).await?;
                db::run_migrations(&pool).await?;
                UnitOfWork::postgres(pool)
            }
        };

        Ok(Self::with_parts(Arc::new(uow), Arc::new(ChangeNotifier::new())))
    }

    /// Create a new account service with a configuration
    pub async fn with_config(config: &AccountServiceConfig) -> Result<Self> {
        let uow = match &config.database_url {
            Some(url) => {
                info!("Connecting to PostgreSQL database with pool size: {}", config.db_pool_size);
                let pool = db::init_db_pool(url, config.db_pool_size).await?;
                db::run_migrations(&pool).await?;
                UnitOfWork::postgres(pool)
            }
            None => {
                info!("Using in-memory repositories");
                UnitOfWork::in_memory()
            }
        };
        let uow = uow.with_transaction_logging(config.transaction_logging);

        let notifier = ChangeNotifier::with_timeout(config.observer_timeout);
        if let Some(threshold) = config.balance_alert_threshold {
            notifier.subscribe(Arc::new(BalanceThresholdObserver::new(threshold))).await;
        }

        Ok(Self::with_parts(Arc::new(uow), Arc::new(notifier)))
    }

    /// The unit of work behind this service
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// The change notifier, for subscribing observers
    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    /// Create a new account together with its submitted operations
    pub async fn create_account(&self, account: impl Into<Option<Account>>) -> Result<Committed<Account>> {
        let account = account
            .into()
            .ok_or_else(|| Error::ValidationError("Account payload is missing".to_string()))?;
        info!("Creating account {}", account.id);

        account.validate()?;
        let created = self.uow.create_account(account).await?;

        Ok(self.publish(created, ChangeKind::Created).await)
    }

    /// Get an account by ID
    pub async fn get_account(&self, id: AccountId) -> Result<Account> {
        self.uow
            .account(id)
            .await?
            .ok_or_else(|| Account::not_found(id))
    }

    /// Get all accounts in creation order
    pub async fn get_all_accounts(&self) -> Result<Vec<Account>> {
        self.uow.all_accounts().await
    }

    /// Number of accounts
    pub async fn account_count(&self) -> Result<usize> {
        self.uow.count().await
    }

    /// Replace an account's balance
    ///
    /// Only `current_sum` is taken from the payload. The stored operation
    /// history is kept as it is, whatever operations the payload carries.
    pub async fn update_account(&self, account: impl Into<Option<Account>>) -> Result<Committed<Account>> {
        let account = account
            .into()
            .ok_or_else(|| Error::ValidationError("Account payload is missing".to_string()))?;
        info!("Updating balance of account {} to {}", account.id, account.current_sum);

        let updated = self
            .uow
            .update_balance(account.id, account.current_sum)
            .await
            .with_context(|| format!("Failed to update account {}", account.id))?;

        Ok(self.publish(updated, ChangeKind::Updated).await)
    }

    /// Delete an account and its operations, returning what was removed
    pub async fn delete_account(&self, id: AccountId) -> Result<Committed<Account>> {
        info!("Deleting account {}", id);

        let removed = self
            .uow
            .delete_account(id)
            .await
            .with_context(|| format!("Failed to delete account {}", id))?;
        debug!("Removed {} operations with account {}", removed.operations.len(), id);

        Ok(self.publish(removed, ChangeKind::Deleted).await)
    }

    /// Apply a credit or debit to an account
    pub async fn apply_operation(
        &self,
        account_id: AccountId,
        kind: OperationKind,
        amount: Amount,
    ) -> Result<Committed<Account>> {
        info!("Applying {} of {} to account {}", kind, amount, account_id);

        let operation = Operation::new(account_id, kind, amount);
        operation.validate()?;

        let account = self
            .uow
            .apply_operation(operation)
            .await
            .with_context(|| format!("Failed to apply {} to account {}", kind, account_id))?;

        Ok(self.publish(account, ChangeKind::OperationApplied).await)
    }

    /// Deposit funds into an account
    pub async fn deposit(&self, account_id: AccountId, amount: Amount) -> Result<Committed<Account>> {
        self.apply_operation(account_id, OperationKind::Credit, amount).await
    }

    /// Withdraw funds from an account
    pub async fn withdraw(&self, account_id: AccountId, amount: Amount) -> Result<Committed<Account>> {
        self.apply_operation(account_id, OperationKind::Debit, amount).await
    }

    /// Operations of an account, oldest first
    pub async fn get_operations(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        self.uow.operations_for(account_id).await
    }

    async fn publish(&self, account: Account, kind: ChangeKind) -> Committed<Account> {
        let current_sum = (kind != ChangeKind::Deleted).then_some(account.current_sum);
        let change = AccountChange::new(account.id, kind, current_sum);

        let notifications = self.notifier.notify(&change).await;
        if !notifications.is_clean() {
            warn!(
                "{} observer(s) failed on {:?} of account {}",
                notifications.failures.len(),
                kind,
                account.id
            );
        }

        Committed { value: account, notifications }
    }
}

impl Default for AccountService {
    fn default() -> Self {
        Self::new()
    }
}
