use std::sync::Arc;

use account_service::{AccountService, AccountServiceConfig, AuditLogObserver};
use clap::{Parser, Subcommand};
use common::decimal::{dec, Amount};
use common::model::{Account, AccountId, Operation};
use dotenv::dotenv;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Account Service CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the account service
    Start {
        /// Database URL
        #[arg(short, long)]
        database_url: Option<String>,

        /// Database pool size
        #[arg(short, long)]
        pool_size: Option<u32>,

        /// Enable transaction logging
        #[arg(short, long)]
        transaction_logging: bool,

        /// Keep accounts in memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,

        /// Alert when a balance drops below this amount
        #[arg(long)]
        alert_threshold: Option<Amount>,
    },
    /// Run a short in-memory session and print the resulting accounts as JSON
    Demo,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "account_service={level},common={level},audit={level}",
            level = cli.log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Process commands
    match cli.command {
        Commands::Start { database_url, pool_size, transaction_logging, in_memory, alert_threshold } => {
            // Flags override the environment
            let mut config = AccountServiceConfig::from_env();
            if in_memory {
                config.database_url = None;
            } else if database_url.is_some() {
                config.database_url = database_url;
            }
            if let Some(pool_size) = pool_size {
                config.db_pool_size = pool_size;
            }
            config.transaction_logging |= transaction_logging;
            if let Some(threshold) = alert_threshold {
                config = config.with_balance_alert_threshold(threshold);
            }

            info!(
                "Starting account service ({}) with database pool size: {}, transaction logging: {}",
                if config.database_url.is_some() { "postgres" } else { "in-memory" },
                config.db_pool_size,
                config.transaction_logging
            );

            let service = AccountService::with_config(&config).await?;
            service.notifier().subscribe(Arc::new(AuditLogObserver::new())).await;

            // Wait for ctrl-c
            info!("Account service started. Press Ctrl+C to stop.");
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down account service...");
                }
                Err(err) => {
                    error!("Error waiting for Ctrl+C: {}", err);
                }
            }
        }
        Commands::Demo => {
            let service = AccountService::new();
            service.notifier().subscribe(Arc::new(AuditLogObserver::new())).await;

            let savings = AccountId(11);
            service.create_account(Account::new(1, dec!(100))).await?;
            service.create_account(Account::new(2, dec!(50))).await?;
            service
                .create_account(
                    Account::new(savings, dec!(250))
                        .with_operations(vec![Operation::credit(savings, dec!(250))]),
                )
                .await?;

            service.withdraw(AccountId(1), dec!(30)).await?;
            service.delete_account(AccountId(2)).await?;
            service.create_account(Account::new(200, dec!(333))).await?;
            service.update_account(Account::new(savings, dec!(1000))).await?;

            let accounts = service.get_all_accounts().await?;
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
    }

    Ok(())
}
