//! Prometheus counters for the wallet workflows
//!
//! # Metrics
//!
//! - `wallet_deposits_initialized_total` - Deposits handed to the gateway
//! - `wallet_webhook_credits_total` - Webhooks that credited a wallet
//! - `wallet_webhook_failures_total` - Webhooks that marked a deposit failed
//! - `wallet_webhook_duplicates_total` - Webhooks for already settled deposits
//! - `wallet_transfers_total` - Committed transfers
//! - `wallet_transfers_rejected_total` - Transfers refused before commit

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct WalletMetrics {
    /// Deposits handed to the gateway
    pub deposits_initialized: IntCounter,
    /// Webhooks that credited a wallet
    pub webhook_credits: IntCounter,
    /// Webhooks that marked a deposit failed
    pub webhook_failures: IntCounter,
    /// Webhooks for already settled deposits
    pub webhook_duplicates: IntCounter,
    /// Committed transfers
    pub transfers: IntCounter,
    /// Transfers refused before commit
    pub transfers_rejected: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl WalletMetrics {
    /// Create counters registered in a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let deposits_initialized = counter(
            "wallet_deposits_initialized_total",
            "Deposits handed to the payment gateway",
        )?;
        let webhook_credits = counter(
            "wallet_webhook_credits_total",
            "Webhooks that credited a wallet",
        )?;
        let webhook_failures = counter(
            "wallet_webhook_failures_total",
            "Webhooks that marked a deposit failed",
        )?;
        let webhook_duplicates = counter(
            "wallet_webhook_duplicates_total",
            "Webhooks for already settled deposits",
        )?;
        let transfers = counter("wallet_transfers_total", "Committed transfers")?;
        let transfers_rejected = counter(
            "wallet_transfers_rejected_total",
            "Transfers refused before commit",
        )?;

        Ok(Self {
            deposits_initialized,
            webhook_credits,
            webhook_failures,
            webhook_duplicates,
            transfers,
            transfers_rejected,
            registry,
        })
    }

    /// Render every metric in the text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
