//! Operation models and related types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{precision, Amount};
use crate::error::{Error, Result};
use crate::model::account::AccountId;
use crate::model::Entity;

/// Operation identifier
pub type OperationId = Uuid;

/// Direction of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Money in
    Credit,
    /// Money out
    Debit,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Credit => "credit",
            OperationKind::Debit => "debit",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "credit" => Ok(OperationKind::Credit),
            "debit" => Ok(OperationKind::Debit),
            other => Err(Error::Internal(format!("Unknown operation kind: {}", other))),
        }
    }
}

/// A single balance-affecting event belonging to one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique operation ID
    pub id: OperationId,
    /// Owning account
    pub account_id: AccountId,
    /// Credit or debit
    pub kind: OperationKind,
    /// Magnitude, always positive
    pub amount: Amount,
    /// When the operation was recorded
    pub created_at: DateTime<Utc>,
}

impl Operation {
    /// Create a new operation for an account
    pub fn new(account_id: AccountId, kind: OperationKind, amount: Amount) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            kind,
            amount: precision::round_amount(amount),
            created_at: Utc::now(),
        }
    }

    /// Create a credit
    pub fn credit(account_id: AccountId, amount: Amount) -> Self {
        Self::new(account_id, OperationKind::Credit, amount)
    }

    /// Create a debit
    pub fn debit(account_id: AccountId, amount: Amount) -> Self {
        Self::new(account_id, OperationKind::Debit, amount)
    }

    /// Signed effect on the owning account's balance
    pub fn effect(&self) -> Amount {
        match self.kind {
            OperationKind::Credit => self.amount,
            OperationKind::Debit => -self.amount,
        }
    }

    /// Check that the operation is structurally valid
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Amount::ZERO {
            return Err(Error::ValidationError(format!(
                "Operation amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

impl Entity for Operation {
    type Id = OperationId;
    const NAME: &'static str = "operation";

    fn id(&self) -> OperationId {
        self.id
    }

    fn not_found(id: OperationId) -> Error {
        Error::OperationNotFound(id.to_string())
    }
}
