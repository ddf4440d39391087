//! Unit of work over the account and operation repositories
//!
//! Every write that spans both repositories goes through a [`Batch`]: one
//! transaction token shared by all of its repository writes, committed or
//! rolled back as a whole. The single-call methods on [`UnitOfWork`] each run
//! one batch.
//!
//! A commit gate serializes batches against each other and against reads made
//! through the unit of work, so no reader observes a half-applied change.

use std::collections::HashMap;
use std::sync::Arc;

use common::db::{InMemoryTransactionManager, PgTransactionManager};
use common::error::{ErrorExt, Result};
use common::model::{Account, AccountId, Entity, Operation};
use common::{Amount, DBTransaction, TransactionManager};
use sqlx::PgPool;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::{debug, error, info};

use crate::repository::{
    AccountRepository, InMemoryAccountRepository, InMemoryOperationRepository, OperationRepository,
    PostgresAccountRepository, PostgresOperationRepository,
};

/// Coordinates the account and operation repositories under one commit boundary
pub struct UnitOfWork {
    accounts: Arc<dyn AccountRepository>,
    operations: Arc<dyn OperationRepository>,
    transaction_manager: Arc<dyn TransactionManager>,
    gate: RwLock<()>,
    transaction_logging: bool,
}

impl UnitOfWork {
    /// Create a unit of work over two repositories sharing one backing
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        operations: Arc<dyn OperationRepository>,
        transaction_manager: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            accounts,
            operations,
            transaction_manager,
            gate: RwLock::new(()),
            transaction_logging: false,
        }
    }

    /// Create a unit of work over fresh in-memory repositories
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryAccountRepository::new()),
            Arc::new(InMemoryOperationRepository::new()),
            Arc::new(InMemoryTransactionManager::new()),
        )
    }

    /// Create a unit of work over PostgreSQL repositories sharing `pool`
    pub fn postgres(pool: PgPool) -> Self {
        Self::new(
            Arc::new(PostgresAccountRepository::new(pool.clone())),
            Arc::new(PostgresOperationRepository::new(pool.clone())),
            Arc::new(PgTransactionManager::new(pool)),
        )
    }

    /// Log commits and rollbacks at info level instead of debug
    pub fn with_transaction_logging(mut self, enabled: bool) -> Self {
        self.transaction_logging = enabled;
        self
    }

    /// The account repository
    pub fn accounts(&self) -> &dyn AccountRepository {
        self.accounts.as_ref()
    }

    /// The operation repository
    pub fn operations(&self) -> &dyn OperationRepository {
        self.operations.as_ref()
    }

    /// An account with its operation history
    pub async fn account(&self, id: AccountId) -> Result<Option<Account>> {
        let _read = self.gate.read().await;

        match self.accounts.get(id).await? {
            Some(row) => {
                let operations = self.operations.for_account(id).await?;
                Ok(Some(row.with_operations(operations)))
            }
            None => Ok(None),
        }
    }

    /// All accounts with their operation histories, in insertion order
    pub async fn all_accounts(&self) -> Result<Vec<Account>> {
        let _read = self.gate.read().await;

        let rows = self.accounts.get_all().await?;
        let mut histories: HashMap<AccountId, Vec<Operation>> = HashMap::new();
        for operation in self.operations.get_all().await? {
            histories.entry(operation.account_id).or_default().push(operation);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let operations = histories.remove(&row.id).unwrap_or_default();
                row.with_operations(operations)
            })
            .collect())
    }

    /// Operations of an existing account
    pub async fn operations_for(&self, id: AccountId) -> Result<Vec<Operation>> {
        let _read = self.gate.read().await;

        if self.accounts.get(id).await?.is_none() {
            return Err(Account::not_found(id));
        }
        self.operations.for_account(id).await
    }

    /// Number of stored accounts
    pub async fn count(&self) -> Result<usize> {
        let _read = self.gate.read().await;
        self.accounts.count().await
    }

    /// Begin a batch of composed writes
    ///
    /// The batch holds the commit gate until it is committed, rolled back or
    /// dropped. Dropping it without committing discards its writes.
    ///
    /// While the batch lives, reads must go through [`Batch::account`]. The
    /// gated reads on `UnitOfWork` (`account`, `all_accounts`,
    /// `operations_for`, `count`) wait for the gate and deadlock if awaited
    /// on the task that holds the batch.
    pub async fn begin(&self) -> Result<Batch<'_>> {
        let gate = self.gate.write().await;
        let tx = self
            .transaction_manager
            .begin_transaction()
            .await
            .with_context(|| "Failed to begin unit of work")?;
        debug!("Began {} unit of work", tx.backend());

        Ok(Batch { uow: self, tx, _gate: gate })
    }

    /// Store a new account together with its submitted operations
    pub async fn create_account(&self, account: Account) -> Result<Account> {
        let mut batch = self.begin().await?;
        let result = batch.create_account(account).await;
        batch.finish("create account", result).await
    }

    /// Set an account's balance, leaving its history untouched
    pub async fn update_balance(&self, id: AccountId, current_sum: Amount) -> Result<Account> {
        let mut batch = self.begin().await?;
        let result = batch.update_balance(id, current_sum).await;
        batch.finish("update balance", result).await
    }

    /// Remove an account and every operation it owns
    pub async fn delete_account(&self, id: AccountId) -> Result<Account> {
        let mut batch = self.begin().await?;
        let result = batch.delete_account(id).await;
        batch.finish("delete account", result).await
    }

    /// Record an operation and apply its effect to the owning account's balance
    pub async fn apply_operation(&self, operation: Operation) -> Result<Account> {
        let mut batch = self.begin().await?;
        let result = batch.apply_operation(operation).await;
        batch.finish("apply operation", result).await
    }

    fn log_outcome(&self, action: &str, backend: &str, committed: bool) {
        let outcome = if committed { "Committed" } else { "Rolled back" };
        if self.transaction_logging {
            info!("{} {} unit of work: {}", outcome, backend, action);
        } else {
            debug!("{} {} unit of work: {}", outcome, backend, action);
        }
    }
}

/// A transaction token over both repositories
///
/// Reads made through the batch see its own uncommitted writes.
pub struct Batch<'a> {
    uow: &'a UnitOfWork,
    tx: DBTransaction,
    // Declared after `tx` so an uncommitted transaction is reverted before the gate opens
    _gate: RwLockWriteGuard<'a, ()>,
}

impl<'a> Batch<'a> {
    /// Load an account with its history as seen from inside the batch
    pub async fn account(&mut self, id: AccountId) -> Result<Option<Account>> {
        match self.uow.accounts.get_in(&mut self.tx, id).await? {
            Some(row) => {
                let operations = self.uow.operations.for_account_in(&mut self.tx, id).await?;
                Ok(Some(row.with_operations(operations)))
            }
            None => Ok(None),
        }
    }

    async fn existing(&mut self, id: AccountId) -> Result<Account> {
        self.account(id).await?.ok_or_else(|| Account::not_found(id))
    }

    /// Insert an account row and each of its operations
    pub async fn create_account(&mut self, account: Account) -> Result<Account> {
        self.uow.accounts.add_in(&mut self.tx, account.row()).await?;
        for operation in &account.operations {
            self.uow.operations.add_in(&mut self.tx, operation.clone()).await?;
        }
        Ok(account)
    }

    /// Replace the balance of an existing account
    pub async fn update_balance(&mut self, id: AccountId, current_sum: Amount) -> Result<Account> {
        let mut account = self.existing(id).await?;
        account.current_sum = current_sum;
        self.uow.accounts.update_in(&mut self.tx, account.row()).await?;
        Ok(account)
    }

    /// Remove the account's operations, then the account
    pub async fn delete_account(&mut self, id: AccountId) -> Result<Account> {
        let account = self.existing(id).await?;
        for operation in &account.operations {
            self.uow.operations.remove_in(&mut self.tx, operation.id).await?;
        }
        self.uow.accounts.remove_in(&mut self.tx, id).await?;
        Ok(account)
    }

    /// Record the operation and move the account's balance by its effect
    pub async fn apply_operation(&mut self, operation: Operation) -> Result<Account> {
        let mut account = self.existing(operation.account_id).await?;
        account.apply(&operation)?;
        self.uow.operations.add_in(&mut self.tx, operation.clone()).await?;
        self.uow.accounts.update_in(&mut self.tx, account.row()).await?;
        account.operations.push(operation);
        Ok(account)
    }

    /// Commit every write of the batch
    pub async fn commit(self) -> Result<()> {
        self.finish("commit", Ok(())).await
    }

    /// Discard every write of the batch
    pub async fn rollback(self) -> Result<()> {
        let Batch { uow, tx, _gate } = self;
        let backend = tx.backend();
        tx.rollback().await?;
        uow.log_outcome("rollback", backend, false);
        Ok(())
    }

    /// Commit when `result` is `Ok`, roll back otherwise
    pub async fn finish<T>(self, action: &str, result: Result<T>) -> Result<T> {
        let Batch { uow, tx, _gate } = self;
        let backend = tx.backend();

        if let Err(e) = &result {
            error!("Error in {}: {}", action, e);
        }
        let committed = result.is_ok();
        let outcome = tx.finish(result).await;
        if let Err(e) = &outcome {
            if committed {
                error!("Failed to commit {}: {}", action, e);
            }
        }

        uow.log_outcome(action, backend, committed && outcome.is_ok());
        outcome
    }
}
