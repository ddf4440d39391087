//! Transaction handling for ledger writes
//!
//! A [`DBTransaction`] is the token every write of one unit of work runs
//! under. The PostgreSQL variant wraps a `sqlx` transaction. The in-memory
//! variant keeps a journal of compensating actions that repositories
//! register as they write; rolling back (or dropping the token without
//! committing) replays the journal in reverse.

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgConnection, PgPool, Postgres, Transaction as SqlxTransaction};
use tracing::{debug, error};

use crate::error::{Error, Result};

/// Transaction enum that can be either PostgreSQL or in-memory
pub enum DBTransaction {
    /// PostgreSQL transaction
    Postgres(PgTransaction),
    /// In-memory transaction
    InMemory(InMemoryTransaction),
}

/// Transaction interface methods
impl DBTransaction {
    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.commit().await,
            DBTransaction::InMemory(tx) => tx.commit().await,
        }
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> Result<()> {
        match self {
            DBTransaction::Postgres(tx) => tx.rollback().await,
            DBTransaction::InMemory(tx) => tx.rollback().await,
        }
    }

    /// Commit when `result` is `Ok`, roll back otherwise, and hand `result` back
    ///
    /// A failed commit is reported as [`Error::CommitFailure`]; the backing
    /// has discarded the writes by then.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit()
                    .await
                    .map_err(|e| Error::CommitFailure(e.to_string()))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback().await {
                    // Log rollback failure but return the original error
                    error!("Failed to roll back transaction: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Name of the backing, for log lines
    pub fn backend(&self) -> &'static str {
        match self {
            DBTransaction::Postgres(_) => "postgres",
            DBTransaction::InMemory(_) => "in-memory",
        }
    }

    /// The PostgreSQL transaction, or an error for any other backing
    pub fn postgres(&mut self) -> Result<&mut PgTransaction> {
        match self {
            DBTransaction::Postgres(tx) => Ok(tx),
            other => Err(Error::Internal(format!(
                "Expected a postgres transaction, got {}",
                other.backend()
            ))),
        }
    }

    /// The in-memory transaction, or an error for any other backing
    pub fn in_memory(&mut self) -> Result<&mut InMemoryTransaction> {
        match self {
            DBTransaction::InMemory(tx) => Ok(tx),
            other => Err(Error::Internal(format!(
                "Expected an in-memory transaction, got {}",
                other.backend()
            ))),
        }
    }
}

/// A PostgreSQL transaction implementation
pub struct PgTransaction {
    tx: SqlxTransaction<'static, Postgres>,
}

impl PgTransaction {
    /// Create a new PgTransaction
    pub fn new(tx: SqlxTransaction<'static, Postgres>) -> Self {
        Self { tx }
    }

    /// Connection the transaction runs on
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    /// Execute a query within this transaction
    pub async fn execute<'q>(&mut self, query: Query<'q, Postgres, PgArguments>) -> Result<u64> {
        query
            .execute(&mut *self.tx)
            .await
            .map(|r| r.rows_affected())
            .map_err(Error::Database)
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.map_err(Error::Database)
    }

    /// Rollback the transaction
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.map_err(Error::Database)
    }
}

/// Transaction manager trait for creating and managing transactions
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<DBTransaction>;
}

/// A PostgreSQL transaction manager implementation
pub struct PgTransactionManager {
    pool: PgPool,
}

impl PgTransactionManager {
    /// Create a new PgTransactionManager
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionManager for PgTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        let tx = self.pool.begin().await.map_err(Error::Database)?;
        Ok(DBTransaction::Postgres(PgTransaction::new(tx)))
    }
}

type Undo = Box<dyn FnOnce() + Send>;

/// In-memory transaction
///
/// Writes are applied to the store immediately; each one registers an undo
/// action here. Commit discards the journal, rollback runs it newest first.
#[derive(Default)]
pub struct InMemoryTransaction {
    undo: Vec<Undo>,
    finished: bool,
}

impl InMemoryTransaction {
    /// Create a new in-memory transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the action that reverts a write made under this transaction
    pub fn record_undo<F>(&mut self, undo: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.undo.push(Box::new(undo));
    }

    /// Number of writes that a rollback would revert
    pub fn pending_writes(&self) -> usize {
        self.undo.len()
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<()> {
        self.undo.clear();
        self.finished = true;
        Ok(())
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> Result<()> {
        self.revert();
        Ok(())
    }

    fn revert(&mut self) {
        if !self.undo.is_empty() {
            debug!("Reverting {} in-memory writes", self.undo.len());
        }
        while let Some(undo) = self.undo.pop() {
            undo();
        }
        self.finished = true;
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.revert();
        }
    }
}

/// In-memory transaction manager
#[derive(Default)]
pub struct InMemoryTransactionManager;

impl InMemoryTransactionManager {
    /// Create a new in-memory transaction manager
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransactionManager for InMemoryTransactionManager {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        Ok(DBTransaction::InMemory(InMemoryTransaction::new()))
    }
}
