//! Repositories for account and operation data
//!
//! Both collections share one contract, [`Repository`], parameterized by the
//! entity type. Writes come in two forms: `*_in` runs inside a caller-owned
//! [`DBTransaction`] (this is what the unit of work uses), the plain form
//! opens and finishes its own transaction. Repositories never notify
//! observers and never touch each other.

mod in_memory;
mod postgres;

use async_trait::async_trait;
use common::error::Result;
use common::model::{Account, AccountId, Entity, Operation};
use common::{DBTransaction, TransactionManager};

pub use in_memory::{InMemoryAccountRepository, InMemoryOperationRepository, InMemoryRepository};
pub use postgres::{PostgresAccountRepository, PostgresOperationRepository};

/// Collection-style storage for one entity type
#[async_trait]
pub trait Repository<T: Entity>: Send + Sync {
    /// Get the transaction manager
    fn transaction_manager(&self) -> &dyn TransactionManager;

    /// All stored entities in insertion order
    async fn get_all(&self) -> Result<Vec<T>>;

    /// The entity with this id, if any
    async fn get(&self, id: T::Id) -> Result<Option<T>>;

    /// Number of stored entities
    async fn count(&self) -> Result<usize>;

    /// Read an entity as seen from inside `tx`
    async fn get_in(&self, _tx: &mut DBTransaction, id: T::Id) -> Result<Option<T>> {
        self.get(id).await
    }

    /// Insert inside `tx`; fails with a conflict if the id is taken
    async fn add_in(&self, tx: &mut DBTransaction, entity: T) -> Result<T>;

    /// Replace the stored entity inside `tx`; fails with not-found if absent
    async fn update_in(&self, tx: &mut DBTransaction, entity: T) -> Result<T>;

    /// Delete inside `tx` and return the removed entity; fails with not-found if absent
    async fn remove_in(&self, tx: &mut DBTransaction, id: T::Id) -> Result<T>;

    /// Begin a transaction on this repository's backing
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        self.transaction_manager().begin_transaction().await
    }

    /// Insert an entity
    async fn add(&self, entity: T) -> Result<T> {
        let mut tx = self.begin_transaction().await?;
        let result = self.add_in(&mut tx, entity).await;
        tx.finish(result).await
    }

    /// Replace an entity by id
    async fn update(&self, entity: T) -> Result<T> {
        let mut tx = self.begin_transaction().await?;
        let result = self.update_in(&mut tx, entity).await;
        tx.finish(result).await
    }

    /// Remove an entity by id
    async fn remove(&self, id: T::Id) -> Result<T> {
        let mut tx = self.begin_transaction().await?;
        let result = self.remove_in(&mut tx, id).await;
        tx.finish(result).await
    }
}

/// Account repository
///
/// Stores account rows (`id`, `current_sum`). The operation history lives in
/// the [`OperationRepository`] and is attached by the unit of work.
pub trait AccountRepository: Repository<Account> {}

impl<R: Repository<Account>> AccountRepository for R {}

/// Operation repository
#[async_trait]
pub trait OperationRepository: Repository<Operation> {
    /// Operations of one account in insertion order
    async fn for_account(&self, account_id: AccountId) -> Result<Vec<Operation>>;

    /// Operations of one account as seen from inside `tx`
    async fn for_account_in(&self, _tx: &mut DBTransaction, account_id: AccountId) -> Result<Vec<Operation>> {
        self.for_account(account_id).await
    }
}
