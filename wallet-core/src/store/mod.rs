//! Persistence boundary for wallets and transactions
//!
//! Every write happens inside a [`UnitOfWork`] obtained from
//! [`LedgerStore::begin`]. Nothing a unit stages is visible to anyone else
//! until [`UnitOfWork::commit`]; dropping the unit discards it. Rows read
//! through `lock_*` stay locked against other units until the unit ends, which
//! is what serialises concurrent mutations of the same wallet.
//!
//! # Backends
//!
//! - [`MemoryLedgerStore`] - in-process maps, one unit at a time
//! - [`PgLedgerStore`] - PostgreSQL with row locks and unique constraints

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedgerStore;
pub use postgres::PgLedgerStore;

use crate::error::StoreResult;
use crate::money::Money;
use crate::types::{NewTransaction, Transaction, TransactionStatus, Wallet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Atomic unit of work against the store
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a wallet and hold it locked until the unit ends
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> StoreResult<Option<Wallet>>;

    /// Stage a new wallet.
    ///
    /// Fails with `DuplicateWalletOwner` or `DuplicateWalletNumber` when the
    /// uniqueness constraints would be violated.
    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()>;

    /// Stage a new balance for a wallet
    async fn set_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance: Money,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Read a transaction by reference and hold it locked until the unit ends
    async fn lock_transaction(&mut self, reference: &str) -> StoreResult<Option<Transaction>>;

    /// Stage a new transaction, `DuplicateReference` if the reference exists
    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()>;

    /// Stage a status change
    async fn set_transaction_status(
        &mut self,
        transaction_id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Publish every staged change at once
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Storage backend: unit-of-work factory plus committed-state reads
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>>;

    /// Wallet owned by `user_id`
    async fn wallet_by_user(&self, user_id: Uuid) -> StoreResult<Option<Wallet>>;

    /// Wallet addressed by its shareable number
    async fn wallet_by_number(&self, wallet_number: &str) -> StoreResult<Option<Wallet>>;

    /// Transaction by reference
    async fn transaction_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>>;

    /// Newest-first slice of a user's transactions and the user's total count
    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Transaction>, u64)>;
}

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Add to the balance
    Credit,
    /// Subtract from the balance
    Debit,
}

/// One balance change inside [`Ledger::mutate_balances`](crate::Ledger::mutate_balances)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletUpdate {
    /// Target wallet
    pub wallet_id: Uuid,
    /// Amount to move
    pub amount: Money,
    /// Credit or debit
    pub direction: Direction,
}

impl WalletUpdate {
    /// Credit `amount` to `wallet_id`
    pub fn credit(wallet_id: Uuid, amount: Money) -> Self {
        Self {
            wallet_id,
            amount,
            direction: Direction::Credit,
        }
    }

    /// Debit `amount` from `wallet_id`
    pub fn debit(wallet_id: Uuid, amount: Money) -> Self {
        Self {
            wallet_id,
            amount,
            direction: Direction::Debit,
        }
    }
}

/// Transaction write that accompanies a balance mutation
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionChange {
    /// Record a new transaction
    Insert(NewTransaction),

    /// Move a pending transaction to a terminal status.
    ///
    /// If the transaction is no longer pending when locked, nothing in the
    /// mutation is applied.
    Settle {
        /// Reference of the transaction to settle
        reference: String,
        /// Terminal status to move to
        status: TransactionStatus,
    },
}

/// Result of [`Ledger::mutate_balances`](crate::Ledger::mutate_balances)
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Every change committed
    Applied {
        /// Transaction as committed
        transaction: Transaction,
        /// Wallets after the change, in lock order
        wallets: Vec<Wallet>,
    },

    /// Settle target was already terminal; nothing was written
    Unchanged(Transaction),
}
