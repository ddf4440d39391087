//! Common types and utilities for the finance accounting ledger
//!
//! This library contains the domain model, decimal helpers, the error
//! taxonomy and the transaction primitives shared by the account service
//! and its storage backings.

pub mod error;
pub mod model;
pub mod decimal;
pub mod db;

/// Re-export important types
pub use error::{Error, ErrorClass, Result, ErrorExt, IntoError};
pub use decimal::*;

// Re-export database types
pub use db::transaction::{DBTransaction, TransactionManager};
