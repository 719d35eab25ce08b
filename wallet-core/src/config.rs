//! Configuration for the wallet core

use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

/// Service configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// PostgreSQL connection
    pub database: DatabaseConfig,
    /// Store backend selection
    pub store: StoreConfig,
    /// Payment gateway client
    pub gateway: GatewayConfig,
    /// Ledger settings
    pub wallet: WalletConfig,
    /// Log output
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    /// Connection URL
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub acquire_timeout_secs: u64,
}

/// Ledger store implementation
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// [`PgLedgerStore`](crate::PgLedgerStore)
    Postgres,
    /// [`MemoryLedgerStore`](crate::MemoryLedgerStore), state lost on exit
    Memory,
}

/// Store configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreConfig {
    /// Which backend to build at startup
    pub backend: StoreBackend,
}

/// Payment gateway implementation
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProvider {
    /// Paystack REST API
    Paystack,
    /// In-process [`MockGateway`](crate::MockGateway)
    Mock,
}

/// Gateway configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    /// Which gateway to build at startup
    pub provider: GatewayProvider,
    /// Base URL of the provider API
    pub api_url: String,
    /// API secret, also the webhook signing key
    pub secret_key: String,
    /// Upper bound on every gateway call
    pub timeout_secs: u64,
}

/// Ledger settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WalletConfig {
    /// ISO 4217 code reported with balances
    pub currency: String,
    /// Page size when the caller gives none
    pub default_page_size: u32,
    /// Largest page size a caller may ask for
    pub max_page_size: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Config {
    /// Load defaults, then `CONFIG_FILE` or `config/<ENVIRONMENT>`, then
    /// `WALLET__*` and the plain `DATABASE_URL` / `PAYSTACK_*` variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("store.backend", "postgres")?
            .set_default("gateway.provider", "paystack")?
            .set_default("gateway.api_url", "https://api.paystack.co")?
            .set_default("gateway.secret_key", "")?
            .set_default("gateway.timeout_secs", 30)?
            .set_default("wallet.currency", "NGN")?
            .set_default("wallet.default_page_size", 20)?
            .set_default("wallet.max_page_size", 100)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        builder = builder.add_source(Environment::with_prefix("WALLET").separator("__"));

        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(secret) = env::var("PAYSTACK_SECRET_KEY") {
            builder = builder.set_override("gateway.secret_key", secret)?;
        }

        if let Ok(api_url) = env::var("PAYSTACK_API_URL") {
            builder = builder.set_override("gateway.api_url", api_url)?;
        }

        if let Ok(timeout) = env::var("PAYSTACK_TIMEOUT") {
            builder = builder.set_override("gateway.timeout_secs", timeout)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<(), String> {
        if self.store.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err("Database URL is required for the postgres store".to_string());
        }

        if self.gateway.provider == GatewayProvider::Paystack {
            if self.gateway.secret_key.is_empty() {
                return Err("Gateway secret key is required".to_string());
            }
            if self.gateway.api_url.is_empty() {
                return Err("Gateway API URL is required".to_string());
            }
        }

        if self.gateway.timeout_secs == 0 {
            return Err("Gateway timeout cannot be 0".to_string());
        }

        if self.wallet.max_page_size == 0 {
            return Err("Max page size cannot be 0".to_string());
        }

        if self.wallet.default_page_size == 0
            || self.wallet.default_page_size > self.wallet.max_page_size
        {
            return Err("Default page size must be between 1 and the max page size".to_string());
        }

        if self.wallet.currency.len() != 3 {
            return Err("Currency must be a 3-letter ISO 4217 code".to_string());
        }

        Ok(())
    }
}
