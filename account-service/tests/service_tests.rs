use std::sync::{Arc, Mutex};

use account_service::{
    AccountChange, AccountObserver, AccountService, AccountServiceConfig, ChangeKind, ChangeNotifier,
    ObserverError, RepositoryType, SubscriptionId,
};
use async_trait::async_trait;
use common::decimal::{dec, Amount};
use common::error::{Error, ErrorClass};
use common::model::{Account, AccountId, Operation, OperationKind};

/// Records every change it sees, tagged with its label
struct Recorder {
    label: &'static str,
    log: Arc<Mutex<Vec<(&'static str, AccountId, ChangeKind)>>>,
}

#[async_trait]
impl AccountObserver for Recorder {
    async fn on_account_changed(&self, change: &AccountChange) -> Result<(), ObserverError> {
        self.log.lock().unwrap().push((self.label, change.account_id, change.kind));
        Ok(())
    }
}

struct Rejecting;

#[async_trait]
impl AccountObserver for Rejecting {
    async fn on_account_changed(&self, _change: &AccountChange) -> Result<(), ObserverError> {
        Err(ObserverError::Failed("audit sink unavailable".to_string()))
    }
}

/// Unsubscribes itself the first time it is called
struct OneShot {
    notifier: Arc<ChangeNotifier>,
    id: Mutex<Option<SubscriptionId>>,
    calls: Mutex<usize>,
}

#[async_trait]
impl AccountObserver for OneShot {
    async fn on_account_changed(&self, _change: &AccountChange) -> Result<(), ObserverError> {
        *self.calls.lock().unwrap() += 1;
        let id = self.id.lock().unwrap().take();
        if let Some(id) = id {
            self.notifier.unsubscribe(id).await;
        }
        Ok(())
    }
}

async fn seeded_service() -> AccountService {
    let service = AccountService::new();
    service.create_account(Account::new(1, dec!(100))).await.unwrap();
    service.create_account(Account::new(2, dec!(50))).await.unwrap();
    service
}

#[tokio::test]
async fn test_created_account_reads_back_equal() {
    let service = AccountService::new();
    let account = Account::new(7, dec!(12.50))
        .with_operations(vec![Operation::credit(AccountId(7), dec!(12.50))]);

    let created = service.create_account(account.clone()).await.unwrap().into_inner();

    assert_eq!(created, account);
    assert_eq!(service.get_account(AccountId(7)).await.unwrap(), account);
}

#[tokio::test]
async fn test_get_missing_account_is_not_found() {
    let service = seeded_service().await;

    let result = service.get_account(AccountId(404)).await;

    match result {
        Err(e @ Error::AccountNotFound(_)) => assert_eq!(e.class(), ErrorClass::NotFound),
        other => panic!("Expected AccountNotFound error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_absent_account_is_rejected() {
    let service = seeded_service().await;
    let before = service.account_count().await.unwrap();

    let result = service.create_account(None).await;

    match result {
        Err(e @ Error::ValidationError(_)) => assert_eq!(e.class(), ErrorClass::BadRequest),
        other => panic!("Expected ValidationError, got {:?}", other),
    }
    assert_eq!(service.account_count().await.unwrap(), before);
}

#[tokio::test]
async fn test_create_duplicate_account_conflicts() {
    let service = seeded_service().await;

    let result = service.create_account(Account::new(1, dec!(999))).await;

    assert!(matches!(result, Err(Error::Conflict(_))));
    assert_eq!(service.account_count().await.unwrap(), 2);
    assert_eq!(service.get_account(AccountId(1)).await.unwrap().current_sum, dec!(100));
}

#[tokio::test]
async fn test_create_with_foreign_operation_is_invalid() {
    let service = AccountService::new();
    let account = Account::new(3, dec!(10))
        .with_operations(vec![Operation::credit(AccountId(4), dec!(10))]);

    let result = service.create_account(account).await;

    assert!(matches!(result, Err(Error::ValidationError(_))));
    assert_eq!(service.account_count().await.unwrap(), 0);
    assert_eq!(service.unit_of_work().operations().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_account_cascades_operations() {
    let service = seeded_service().await;
    service.deposit(AccountId(2), dec!(5)).await.unwrap();
    service.withdraw(AccountId(2), dec!(1)).await.unwrap();
    service.deposit(AccountId(1), dec!(3)).await.unwrap();

    let removed = service.delete_account(AccountId(2)).await.unwrap().into_inner();

    assert_eq!(removed.operations.len(), 2);
    assert_eq!(service.account_count().await.unwrap(), 1);
    let remaining = service.unit_of_work().operations().get_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].account_id, AccountId(1));
}

#[tokio::test]
async fn test_delete_missing_account_is_not_found() {
    let service = seeded_service().await;

    let result = service.delete_account(AccountId(3)).await;

    assert!(matches!(result, Err(Error::AccountNotFound(_))));
    assert_eq!(service.account_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_replaces_balance_but_keeps_history() {
    let service = AccountService::new();
    let history = vec![
        Operation::credit(AccountId(11), dec!(40)),
        Operation::debit(AccountId(11), dec!(15)),
    ];
    service
        .create_account(Account::new(11, dec!(25)).with_operations(history.clone()))
        .await
        .unwrap();

    let payload = Account::new(11, dec!(1000));
    let updated = service.update_account(payload.clone()).await.unwrap().into_inner();

    assert_eq!(updated.current_sum, dec!(1000));
    assert_eq!(updated.operations, history);
    assert_ne!(updated.operations, payload.operations);
    assert_eq!(service.get_account(AccountId(11)).await.unwrap(), updated);
}

#[tokio::test]
async fn test_update_missing_account_is_not_found() {
    let service = seeded_service().await;

    let result = service.update_account(Account::new(99, dec!(1))).await;

    assert!(matches!(result, Err(Error::AccountNotFound(_))));
    assert!(matches!(service.update_account(None).await, Err(Error::ValidationError(_))));
}

#[tokio::test]
async fn test_apply_operation_moves_balance_and_records_history() {
    let service = seeded_service().await;

    let account = service
        .apply_operation(AccountId(1), OperationKind::Debit, dec!(130))
        .await
        .unwrap()
        .into_inner();

    assert_eq!(account.current_sum, dec!(-30));
    let operations = service.get_operations(AccountId(1)).await.unwrap();
    assert_eq!(operations.len(), 1);
    assert_eq!(operations[0].kind, OperationKind::Debit);
    assert_eq!(operations[0].amount, dec!(130));
    assert_eq!(account.operations, operations);
}

#[tokio::test]
async fn test_apply_operation_validates_amount_and_account() {
    let service = seeded_service().await;

    assert!(matches!(
        service.deposit(AccountId(1), dec!(0)).await,
        Err(Error::ValidationError(_))
    ));
    assert!(matches!(
        service.withdraw(AccountId(5), dec!(1)).await,
        Err(Error::AccountNotFound(_))
    ));
    assert!(matches!(
        service.get_operations(AccountId(5)).await,
        Err(Error::AccountNotFound(_))
    ));
    assert_eq!(service.get_account(AccountId(1)).await.unwrap().current_sum, dec!(100));
}

#[tokio::test]
async fn test_observers_notified_once_each_in_order() {
    let service = AccountService::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    for label in ["audit", "alerts"] {
        service
            .notifier()
            .subscribe(Arc::new(Recorder { label, log: log.clone() }))
            .await;
    }

    service.create_account(Account::new(1, dec!(10))).await.unwrap();
    service.update_account(Account::new(1, dec!(20))).await.unwrap();
    service.deposit(AccountId(1), dec!(5)).await.unwrap();
    service.delete_account(AccountId(1)).await.unwrap();

    let id = AccountId(1);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            ("audit", id, ChangeKind::Created),
            ("alerts", id, ChangeKind::Created),
            ("audit", id, ChangeKind::Updated),
            ("alerts", id, ChangeKind::Updated),
            ("audit", id, ChangeKind::OperationApplied),
            ("alerts", id, ChangeKind::OperationApplied),
            ("audit", id, ChangeKind::Deleted),
            ("alerts", id, ChangeKind::Deleted),
        ]
    );
}

#[tokio::test]
async fn test_failed_mutations_notify_nobody() {
    let service = seeded_service().await;
    let log = Arc::new(Mutex::new(Vec::new()));
    service
        .notifier()
        .subscribe(Arc::new(Recorder { label: "audit", log: log.clone() }))
        .await;

    let _ = service.create_account(None).await;
    let _ = service.create_account(Account::new(1, dec!(1))).await;
    let _ = service.update_account(Account::new(42, dec!(1))).await;
    let _ = service.delete_account(AccountId(42)).await;

    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_observer_does_not_block_the_rest() {
    let service = AccountService::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    service.notifier().subscribe(Arc::new(Rejecting)).await;
    service
        .notifier()
        .subscribe(Arc::new(Recorder { label: "audit", log: log.clone() }))
        .await;

    let committed = service.create_account(Account::new(5, dec!(1))).await.unwrap();

    assert_eq!(committed.notifications.delivered, 1);
    assert_eq!(committed.notifications.failures.len(), 1);
    assert_eq!(log.lock().unwrap().len(), 1);
    // The mutation itself stands
    assert!(service.get_account(AccountId(5)).await.is_ok());
}

#[tokio::test]
async fn test_observer_can_unsubscribe_itself_mid_fan_out() {
    let service = AccountService::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let one_shot = Arc::new(OneShot {
        notifier: service.notifier().clone(),
        id: Mutex::new(None),
        calls: Mutex::new(0),
    });
    let id = service.notifier().subscribe(one_shot.clone()).await;
    *one_shot.id.lock().unwrap() = Some(id);
    service
        .notifier()
        .subscribe(Arc::new(Recorder { label: "after", log: log.clone() }))
        .await;

    service.create_account(Account::new(1, dec!(1))).await.unwrap();
    service.create_account(Account::new(2, dec!(1))).await.unwrap();

    assert_eq!(*one_shot.calls.lock().unwrap(), 1);
    assert_eq!(log.lock().unwrap().len(), 2);
    assert_eq!(service.notifier().len().await, 1);
}

#[tokio::test]
async fn test_concurrent_deposits_all_land() {
    let service = Arc::new(seeded_service().await);

    let deposits = (0..50).map(|_| {
        let service = service.clone();
        tokio::spawn(async move { service.deposit(AccountId(1), dec!(2)).await.map(|_| ()) })
    });
    for outcome in futures::future::join_all(deposits).await {
        outcome.unwrap().unwrap();
    }

    let account = service.get_account(AccountId(1)).await.unwrap();
    assert_eq!(account.current_sum, dec!(200));
    assert_eq!(account.operations.len(), 50);
}

#[tokio::test]
async fn test_with_repository_in_memory() -> anyhow::Result<()> {
    let service = AccountService::with_repository(RepositoryType::InMemory).await?;

    service.create_account(Account::new(1, dec!(1))).await?;
    assert_eq!(service.get_all_accounts().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_with_config_in_memory_subscribes_threshold_observer() -> anyhow::Result<()> {
    let config = AccountServiceConfig::in_memory()
        .with_observer_timeout(std::time::Duration::from_millis(200))
        .with_balance_alert_threshold(dec!(10));
    let service = AccountService::with_config(&config).await?;

    assert_eq!(service.notifier().len().await, 1);
    let committed = service.create_account(Account::new(1, dec!(3))).await?;
    assert!(committed.notifications.is_clean());
    assert_eq!(committed.notifications.delivered, 1);
    Ok(())
}

#[tokio::test]
async fn test_deposit_overflowing_the_balance_is_rejected() {
    let service = AccountService::new();
    service.create_account(Account::new(1, Amount::MAX)).await.unwrap();

    let result = service.deposit(AccountId(1), dec!(1)).await;

    match result {
        Err(e @ Error::DecimalError(_)) => assert_eq!(e.class(), ErrorClass::BadRequest),
        other => panic!("Expected DecimalError, got {:?}", other),
    }
    let account = service.get_account(AccountId(1)).await.unwrap();
    assert_eq!(account.current_sum, Amount::MAX);
    assert!(account.operations.is_empty());
    assert_eq!(service.unit_of_work().operations().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_create_reusing_a_stored_operation_id_conflicts() {
    let service = AccountService::new();
    let stored = Operation::credit(AccountId(1), dec!(10));
    service
        .create_account(Account::new(1, dec!(10)).with_operations(vec![stored.clone()]))
        .await
        .unwrap();

    let mut reused = stored.clone();
    reused.account_id = AccountId(2);
    let result = service
        .create_account(Account::new(2, dec!(10)).with_operations(vec![reused]))
        .await;

    assert!(matches!(result, Err(Error::Conflict(_))));
    assert_eq!(service.account_count().await.unwrap(), 1);
    assert!(matches!(service.get_account(AccountId(2)).await, Err(Error::AccountNotFound(_))));
    let operations = service.unit_of_work().operations().get_all().await.unwrap();
    assert_eq!(operations, vec![stored]);
}
