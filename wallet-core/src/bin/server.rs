//! Wallet core service binary

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use wallet_core::config::{GatewayProvider, StoreBackend};
use wallet_core::{
    Config, LedgerStore, MemoryLedgerStore, MockGateway, PaymentGateway, PaystackGateway,
    PgLedgerStore, WalletMetrics, WalletService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting wallet core");

    let mut pg_store = None;
    let store: Arc<dyn LedgerStore> = match config.store.backend {
        StoreBackend::Postgres => {
            let store = PgLedgerStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            store
                .ensure_schema()
                .await
                .context("Failed to apply schema")?;
            tracing::info!("Connected to PostgreSQL");
            let store = Arc::new(store);
            pg_store = Some(store.clone());
            store
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, balances will not survive a restart");
            Arc::new(MemoryLedgerStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.provider {
        GatewayProvider::Paystack => Arc::new(
            PaystackGateway::new(&config.gateway).context("Failed to build Paystack client")?,
        ),
        GatewayProvider::Mock => {
            tracing::warn!("Using mock payment gateway");
            Arc::new(MockGateway::new(config.gateway.secret_key.clone()))
        }
    };

    let metrics = WalletMetrics::new().context("Failed to register metrics")?;
    let _service = WalletService::new(store, gateway, config.wallet.clone(), metrics);

    tracing::info!(
        currency = %config.wallet.currency,
        backend = ?config.store.backend,
        "Wallet core ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down wallet core");
    if let Some(store) = pg_store {
        store.close().await;
    }
    Ok(())
}
