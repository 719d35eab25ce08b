//! Wallet Core
//!
//! Custodial wallet ledger: gateway-funded deposits, peer transfers and
//! transaction history over a transactional store.
//!
//! # Architecture
//!
//! - **Explicit units of work**: every multi-row write commits whole or not at all
//! - **Row locks**: concurrent mutations of one wallet serialize in the store
//! - **Webhook-only credits**: deposits are credited only by a signed webhook
//! - **Injected collaborators**: store and gateway are trait objects built at startup
//!
//! # Invariants
//!
//! - Balances never go negative
//! - Transfers are zero-sum across the two wallets
//! - A deposit is credited at most once
//! - Transaction references are unique

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod deposit;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod metrics;
pub mod money;
pub mod query;
pub mod service;
pub mod store;
pub mod transfer;
pub mod types;

// Re-exports
pub use config::Config;
pub use deposit::{DepositInit, Verification, VerificationSource, WebhookOutcome};
pub use error::{Result, StoreError, WalletError};
pub use gateway::{GatewayError, MockGateway, PaymentGateway, PaystackGateway};
pub use ledger::Ledger;
pub use metrics::WalletMetrics;
pub use money::{Money, MoneyError};
pub use query::{BalanceView, Page, PageRequest};
pub use service::WalletService;
pub use store::{LedgerStore, MemoryLedgerStore, PgLedgerStore};
pub use types::{Transaction, TransactionKind, TransactionStatus, Wallet, WalletNumber};
