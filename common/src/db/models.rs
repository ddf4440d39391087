use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::account::{Account, AccountId};
use crate::model::operation::{Operation, OperationKind};

/// Database model for Account table
#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub id: i64,
    pub current_sum: Decimal,
}

impl From<DbAccount> for Account {
    fn from(row: DbAccount) -> Self {
        Account::new(AccountId(row.id), row.current_sum)
    }
}

/// Database model for Operation table
#[derive(Debug, Clone, FromRow)]
pub struct DbOperation {
    pub id: Uuid,
    pub account_id: i64,
    pub kind: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbOperation> for Operation {
    type Error = Error;

    fn try_from(row: DbOperation) -> Result<Self> {
        let kind: OperationKind = row.kind.parse()?;
        Ok(Operation {
            id: row.id,
            account_id: AccountId(row.account_id),
            kind,
            amount: row.amount,
            created_at: row.created_at,
        })
    }
}
