//! Domain models for the ledger

use std::fmt::{Debug, Display};
use std::hash::Hash;

use crate::error::Error;

pub mod account;
pub mod operation;

pub use account::{Account, AccountId};
pub use operation::{Operation, OperationId, OperationKind};

/// An entity with a stable identifier that a repository can store
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identifier type, unique within the entity's collection
    type Id: Copy + Eq + Hash + Display + Debug + Send + Sync + 'static;

    /// Entity name used in log lines and error messages
    const NAME: &'static str;

    /// Identifier of this entity
    fn id(&self) -> Self::Id;

    /// Error reported when no entity with `id` exists
    fn not_found(id: Self::Id) -> Error;

    /// Error reported when an entity with `id` already exists
    fn conflict(id: Self::Id) -> Error {
        Error::Conflict(format!("{} {} already exists", Self::NAME, id))
    }
}
