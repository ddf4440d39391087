use async_trait::async_trait;
use common::db::models::{DbAccount, DbOperation};
use common::db::PgTransactionManager;
use common::error::{Error, Result};
use common::model::{Account, AccountId, Entity, Operation, OperationId};
use common::{DBTransaction, TransactionManager};
use sqlx::PgPool;
use tracing::debug;

use super::{OperationRepository, Repository};

/// Map a write failure, turning key violations into ledger errors
fn write_error<T: Entity>(id: T::Id, err: Error) -> Error {
    if let Error::Database(sqlx::Error::Database(db_err)) = &err {
        if db_err.is_unique_violation() {
            return T::conflict(id);
        }
    }
    err
}

fn count_from(total: i64) -> Result<usize> {
    usize::try_from(total).map_err(|e| Error::Internal(format!("Invalid row count {}: {}", total, e)))
}

/// PostgreSQL repository for account rows
pub struct PostgresAccountRepository {
    /// Database connection pool
    pool: PgPool,
    /// Transaction manager
    transaction_manager: PgTransactionManager,
}

impl PostgresAccountRepository {
    /// Create a new PostgreSQL account repository
    pub fn new(pool: PgPool) -> Self {
        Self {
            transaction_manager: PgTransactionManager::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl Repository<Account> for PostgresAccountRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    async fn get_all(&self) -> Result<Vec<Account>> {
        debug!("Getting all accounts from database");

        let rows = sqlx::query_as::<_, DbAccount>("SELECT id, current_sum FROM accounts ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        debug!("Getting account from database: {}", id);

        let row = sqlx::query_as::<_, DbAccount>("SELECT id, current_sum FROM accounts WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Account::from))
    }

    async fn count(&self) -> Result<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        count_from(total)
    }

    async fn get_in(&self, tx: &mut DBTransaction, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>("SELECT id, current_sum FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id.0)
            .fetch_optional(tx.postgres()?.connection())
            .await?;

        Ok(row.map(Account::from))
    }

    async fn add_in(&self, tx: &mut DBTransaction, account: Account) -> Result<Account> {
        debug!("Inserting account into database: {}", account.id);

        tx.postgres()?
            .execute(
                sqlx::query("INSERT INTO accounts (id, current_sum) VALUES ($1, $2)")
                    .bind(account.id.0)
                    .bind(account.current_sum),
            )
            .await
            .map_err(|e| write_error::<Account>(account.id, e))?;

        Ok(account.row())
    }

    async fn update_in(&self, tx: &mut DBTransaction, account: Account) -> Result<Account> {
        debug!("Updating account in database: {}", account.id);

        let affected = tx
            .postgres()?
            .execute(
                sqlx::query("UPDATE accounts SET current_sum = $2 WHERE id = $1")
                    .bind(account.id.0)
                    .bind(account.current_sum),
            )
            .await?;

        if affected == 0 {
            return Err(Account::not_found(account.id));
        }
        Ok(account.row())
    }

    async fn remove_in(&self, tx: &mut DBTransaction, id: AccountId) -> Result<Account> {
        debug!("Deleting account from database: {}", id);

        let row = sqlx::query_as::<_, DbAccount>("DELETE FROM accounts WHERE id = $1 RETURNING id, current_sum")
            .bind(id.0)
            .fetch_optional(tx.postgres()?.connection())
            .await?;

        row.map(Account::from).ok_or_else(|| Account::not_found(id))
    }
}

/// PostgreSQL repository for operations
pub struct PostgresOperationRepository {
    /// Database connection pool
    pool: PgPool,
    /// Transaction manager
    transaction_manager: PgTransactionManager,
}

impl PostgresOperationRepository {
    /// Create a new PostgreSQL operation repository
    pub fn new(pool: PgPool) -> Self {
        Self {
            transaction_manager: PgTransactionManager::new(pool.clone()),
            pool,
        }
    }
}

const OPERATION_COLUMNS: &str = "id, account_id, kind, amount, created_at";

fn operations_from(rows: Vec<DbOperation>) -> Result<Vec<Operation>> {
    rows.into_iter().map(Operation::try_from).collect()
}

#[async_trait]
impl Repository<Operation> for PostgresOperationRepository {
    fn transaction_manager(&self) -> &dyn TransactionManager {
        &self.transaction_manager
    }

    async fn get_all(&self) -> Result<Vec<Operation>> {
        debug!("Getting all operations from database");

        let rows = sqlx::query_as::<_, DbOperation>(&format!(
            "SELECT {} FROM operations ORDER BY seq",
            OPERATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        operations_from(rows)
    }

    async fn get(&self, id: OperationId) -> Result<Option<Operation>> {
        debug!("Getting operation from database: {}", id);

        let row = sqlx::query_as::<_, DbOperation>(&format!(
            "SELECT {} FROM operations WHERE id = $1",
            OPERATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Operation::try_from).transpose()
    }

    async fn count(&self) -> Result<usize> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM operations")
            .fetch_one(&self.pool)
            .await?;
        count_from(total)
    }

    async fn add_in(&self, tx: &mut DBTransaction, operation: Operation) -> Result<Operation> {
        debug!("Inserting operation {} for account {}", operation.id, operation.account_id);

        let result = tx
            .postgres()?
            .execute(
                sqlx::query(
                    "INSERT INTO operations (id, account_id, kind, amount, created_at) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(operation.id)
                .bind(operation.account_id.0)
                .bind(operation.kind.as_str())
                .bind(operation.amount)
                .bind(operation.created_at),
            )
            .await;

        match result {
            Ok(_) => Ok(operation),
            Err(Error::Database(sqlx::Error::Database(db_err))) if db_err.is_foreign_key_violation() => {
                Err(Account::not_found(operation.account_id))
            }
            Err(e) => Err(write_error::<Operation>(operation.id, e)),
        }
    }

    async fn update_in(&self, tx: &mut DBTransaction, operation: Operation) -> Result<Operation> {
        let affected = tx
            .postgres()?
            .execute(
                sqlx::query("UPDATE operations SET kind = $2, amount = $3 WHERE id = $1")
                    .bind(operation.id)
                    .bind(operation.kind.as_str())
                    .bind(operation.amount),
            )
            .await?;

        if affected == 0 {
            return Err(Operation::not_found(operation.id));
        }
        Ok(operation)
    }

    async fn remove_in(&self, tx: &mut DBTransaction, id: OperationId) -> Result<Operation> {
        let row = sqlx::query_as::<_, DbOperation>(&format!(
            "DELETE FROM operations WHERE id = $1 RETURNING {}",
            OPERATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(tx.postgres()?.connection())
        .await?;

        row.map(Operation::try_from)
            .transpose()?
            .ok_or_else(|| Operation::not_found(id))
    }
}

#[async_trait]
impl OperationRepository for PostgresOperationRepository {
    async fn for_account(&self, account_id: AccountId) -> Result<Vec<Operation>> {
        debug!("Getting operations for account: {}", account_id);

        let rows = sqlx::query_as::<_, DbOperation>(&format!(
            "SELECT {} FROM operations WHERE account_id = $1 ORDER BY seq",
            OPERATION_COLUMNS
        ))
        .bind(account_id.0)
        .fetch_all(&self.pool)
        .await?;

        operations_from(rows)
    }

    async fn for_account_in(&self, tx: &mut DBTransaction, account_id: AccountId) -> Result<Vec<Operation>> {
        let rows = sqlx::query_as::<_, DbOperation>(&format!(
            "SELECT {} FROM operations WHERE account_id = $1 ORDER BY seq",
            OPERATION_COLUMNS
        ))
        .bind(account_id.0)
        .fetch_all(tx.postgres()?.connection())
        .await?;

        operations_from(rows)
    }
}
