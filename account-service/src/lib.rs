//! Account service: accounts, their operations and change notification

pub mod config;
pub mod notifier;
pub mod observers;
pub mod repository;
pub mod service;
pub mod unit_of_work;

pub use config::AccountServiceConfig;
pub use notifier::{
    AccountChange, AccountObserver, ChangeKind, ChangeNotifier, NotificationReport, ObserverError,
    ObserverFailure, SubscriptionId,
};
pub use observers::{AuditLogObserver, BalanceAlert, BalanceThresholdObserver};
pub use repository::{
    AccountRepository, InMemoryAccountRepository, InMemoryOperationRepository, InMemoryRepository,
    OperationRepository, PostgresAccountRepository, PostgresOperationRepository, Repository,
};
pub use service::{AccountService, Committed, RepositoryType};
pub use unit_of_work::{Batch, UnitOfWork};
