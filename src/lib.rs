//! Workspace metapackage
//!
//! Re-exports the workspace crates so that the workspace-level tests under
//! `tests/` can drive the ledger end to end.

pub use account_service;
pub use common;
