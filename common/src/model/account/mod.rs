//! Account models and related types

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decimal::Amount;
use crate::error::{Error, Result};
use crate::model::operation::Operation;
use crate::model::Entity;

/// Caller-assigned account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        AccountId(id)
    }
}

/// Account model
///
/// `current_sum` is the authoritative balance. `operations` is the account's
/// history in the order it was recorded; it is owned by the account and
/// removed together with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: AccountId,
    /// Current balance
    pub current_sum: Amount,
    /// Operations applied to this account, oldest first
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Account {
    /// Create an account with an empty history
    pub fn new(id: impl Into<AccountId>, current_sum: Amount) -> Self {
        Self {
            id: id.into(),
            current_sum,
            operations: Vec::new(),
        }
    }

    /// Attach an operation history
    pub fn with_operations(mut self, operations: Vec<Operation>) -> Self {
        self.operations = operations;
        self
    }

    /// The stored account row, without its history
    pub fn row(&self) -> Self {
        Self {
            id: self.id,
            current_sum: self.current_sum,
            operations: Vec::new(),
        }
    }

    /// Apply an operation's effect to the balance
    ///
    /// Fails without touching the balance if the result leaves the decimal range.
    pub fn apply(&mut self, operation: &Operation) -> Result<()> {
        self.current_sum = self
            .current_sum
            .checked_add(operation.effect())
            .ok_or_else(|| {
                Error::DecimalError(format!(
                    "Applying {} of {} overflows the balance of account {}",
                    operation.kind, operation.amount, self.id
                ))
            })?;
        Ok(())
    }

    /// Check that the account is structurally valid
    ///
    /// Every submitted operation must belong to this account, carry a
    /// positive amount and have an id that is unique within the payload.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.operations.len());
        for operation in &self.operations {
            if operation.account_id != self.id {
                return Err(Error::ValidationError(format!(
                    "Operation {} belongs to account {}, not {}",
                    operation.id, operation.account_id, self.id
                )));
            }
            operation.validate()?;
            if !seen.insert(operation.id) {
                return Err(Error::ValidationError(format!(
                    "Operation {} is listed twice for account {}",
                    operation.id, self.id
                )));
            }
        }
        Ok(())
    }
}

impl Entity for Account {
    type Id = AccountId;
    const NAME: &'static str = "account";

    fn id(&self) -> AccountId {
        self.id
    }

    fn not_found(id: AccountId) -> Error {
        Error::AccountNotFound(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::dec;
    use crate::model::operation::OperationKind;

    #[test]
    fn apply_adds_the_signed_effect() {
        let mut account = Account::new(1, dec!(100));

        account.apply(&Operation::new(account.id, OperationKind::Credit, dec!(25))).unwrap();
        assert_eq!(account.current_sum, dec!(125));

        account.apply(&Operation::new(account.id, OperationKind::Debit, dec!(200))).unwrap();
        assert_eq!(account.current_sum, dec!(-75));
    }

    #[test]
    fn apply_rejects_overflow_and_keeps_the_balance() {
        let mut account = Account::new(1, Amount::MAX);

        let result = account.apply(&Operation::new(account.id, OperationKind::Credit, dec!(1)));
        assert!(matches!(result, Err(Error::DecimalError(_))));
        assert_eq!(account.current_sum, Amount::MAX);

        let mut account = Account::new(2, Amount::MIN);
        let result = account.apply(&Operation::new(account.id, OperationKind::Debit, dec!(1)));
        assert!(matches!(result, Err(Error::DecimalError(_))));
        assert_eq!(account.current_sum, Amount::MIN);
    }

    #[test]
    fn validate_rejects_foreign_operations() {
        let account = Account::new(1, dec!(0))
            .with_operations(vec![Operation::new(AccountId(2), OperationKind::Credit, dec!(1))]);

        assert!(matches!(account.validate(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn validate_rejects_duplicate_operation_ids() {
        let operation = Operation::new(AccountId(1), OperationKind::Credit, dec!(5));
        let account = Account::new(1, dec!(5)).with_operations(vec![operation.clone(), operation]);

        assert!(matches!(account.validate(), Err(Error::ValidationError(_))));
    }

    #[test]
    fn row_drops_history() {
        let account = Account::new(3, dec!(10))
            .with_operations(vec![Operation::new(AccountId(3), OperationKind::Credit, dec!(10))]);

        let row = account.row();
        assert_eq!(row.id, account.id);
        assert_eq!(row.current_sum, dec!(10));
        assert!(row.operations.is_empty());
    }

    #[test]
    fn account_id_serializes_as_plain_number() {
        let account = Account::new(200, dec!(333));
        let json = serde_json::to_value(&account).unwrap();

        assert_eq!(json["id"], serde_json::json!(200));
        assert_eq!(json["operations"], serde_json::json!([]));
    }
}
