// Database persistence tests for the ledger schema
// Enabled with: cargo test --features db_tests -- --ignored

#[cfg(feature = "db_tests")]
#[cfg(test)]
mod db_persistence_tests {
    use std::env;

    use finance_accounting::account_service::{
        PostgresAccountRepository, PostgresOperationRepository, Repository, UnitOfWork,
    };
    use finance_accounting::common::db::{init_db_pool, run_migrations, PgTransactionManager};
    use finance_accounting::common::decimal::dec;
    use finance_accounting::common::model::{Account, AccountId, Operation};
    use finance_accounting::common::TransactionManager;
    use sqlx::{PgPool, Row};
    use tokio::runtime::Runtime;

    // Helper function to run async tests
    fn run_db_test<F>(test: F)
    where
        F: FnOnce(PgPool) -> futures::future::BoxFuture<'static, ()> + Send + 'static,
    {
        dotenv::dotenv().ok();

        // Skip test if TEST_DATABASE_URL is not set
        let db_url = match env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                println!("Skipping database test: TEST_DATABASE_URL not set");
                return;
            }
        };

        let rt = Runtime::new().unwrap();

        rt.block_on(async {
            let pool = match init_db_pool(&db_url, 5).await {
                Ok(pool) => pool,
                Err(err) => {
                    println!("Skipping database test: could not connect to database: {}", err);
                    return;
                }
            };
            run_migrations(&pool).await.expect("Failed to run migrations");

            test(pool).await;
        });
    }

    /// Ids from a range the service-level tests never use
    fn scratch_id(offset: i64) -> AccountId {
        AccountId(9_000_000_000 + (std::process::id() as i64) * 100 + offset)
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_operations_cascade_with_their_account() {
        run_db_test(|pool| {
            Box::pin(async move {
                let id = scratch_id(1);
                let accounts = PostgresAccountRepository::new(pool.clone());
                let operations = PostgresOperationRepository::new(pool.clone());
                accounts.add(Account::new(id, dec!(10))).await.unwrap();
                operations.add(Operation::credit(id, dec!(10))).await.unwrap();

                sqlx::query("DELETE FROM accounts WHERE id = $1")
                    .bind(id.0)
                    .execute(&pool)
                    .await
                    .expect("Failed to delete account");

                let row = sqlx::query("SELECT COUNT(*) AS n FROM operations WHERE account_id = $1")
                    .bind(id.0)
                    .fetch_one(&pool)
                    .await
                    .expect("Failed to count operations");
                assert_eq!(row.get::<i64, _>("n"), 0);
            })
        });
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_non_positive_amounts_are_rejected_by_the_schema() {
        run_db_test(|pool| {
            Box::pin(async move {
                let id = scratch_id(2);
                let accounts = PostgresAccountRepository::new(pool.clone());
                accounts.add(Account::new(id, dec!(0))).await.unwrap();

                let result = sqlx::query(
                    "INSERT INTO operations (id, account_id, kind, amount) VALUES (gen_random_uuid(), $1, 'credit', 0)",
                )
                .bind(id.0)
                .execute(&pool)
                .await;
                assert!(result.is_err());

                accounts.remove(id).await.unwrap();
            })
        });
    }

    #[test]
    #[ignore = "Requires test database, run with RUST_TEST_THREADS=1 cargo test -- --ignored"]
    fn test_rolled_back_transaction_leaves_no_rows() {
        run_db_test(|pool| {
            Box::pin(async move {
                let id = scratch_id(3);
                let accounts = PostgresAccountRepository::new(pool.clone());
                let operations = PostgresOperationRepository::new(pool.clone());
                let manager = PgTransactionManager::new(pool.clone());

                let mut tx = manager.begin_transaction().await.unwrap();
                accounts.add_in(&mut tx, Account::new(id, dec!(5))).await.unwrap();
                operations.add_in(&mut tx, Operation::credit(id, dec!(5))).await.unwrap();
                tx.rollback().await.unwrap();

                assert!(accounts.get(id).await.unwrap().is_none());
                let uow = UnitOfWork::postgres(pool.clone());
                assert!(uow.account(id).await.unwrap().is_none());
            })
        });
    }
}
