//! In-process store
//!
//! All state sits behind one async mutex. A unit of work holds the lock from
//! `begin` until it commits or is dropped, so units never interleave and every
//! committed history is trivially serialisable. Writes are staged inside the
//! unit and only copied into the shared maps on commit.

use super::{LedgerStore, UnitOfWork};
use crate::error::{StoreError, StoreResult};
use crate::money::Money;
use crate::types::{Transaction, TransactionStatus, Wallet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    wallets: HashMap<Uuid, Wallet>,
    wallet_by_user: HashMap<Uuid, Uuid>,
    wallet_by_number: HashMap<String, Uuid>,
    transactions: HashMap<Uuid, Transaction>,
    transaction_by_reference: HashMap<String, Uuid>,
    // insertion order, oldest first
    transaction_log: Vec<Uuid>,
}

/// Store backed by in-process hash maps
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every committed wallet balance
    pub async fn total_balance(&self) -> Money {
        let state = self.state.lock().await;
        state
            .wallets
            .values()
            .fold(Money::zero(), |acc, wallet| {
                acc.checked_add(wallet.balance).unwrap_or(acc)
            })
    }

    /// Number of committed wallets
    pub async fn wallet_count(&self) -> usize {
        self.state.lock().await.wallets.len()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryUnit {
            state: guard,
            wallets: HashMap::new(),
            transactions: HashMap::new(),
            new_transactions: Vec::new(),
        }))
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> StoreResult<Option<Wallet>> {
        let state = self.state.lock().await;
        Ok(state
            .wallet_by_user
            .get(&user_id)
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    async fn wallet_by_number(&self, wallet_number: &str) -> StoreResult<Option<Wallet>> {
        let state = self.state.lock().await;
        Ok(state
            .wallet_by_number
            .get(wallet_number)
            .and_then(|id| state.wallets.get(id))
            .cloned())
    }

    async fn transaction_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transaction_by_reference
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Transaction>, u64)> {
        let state = self.state.lock().await;
        let owned: Vec<&Transaction> = state
            .transaction_log
            .iter()
            .rev()
            .filter_map(|id| state.transactions.get(id))
            .filter(|txn| txn.user_id == user_id)
            .collect();

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok((items, total))
    }
}

/// Unit of work over [`MemoryLedgerStore`]
struct MemoryUnit {
    state: OwnedMutexGuard<MemoryState>,
    // staged rows, keyed by id (new or modified)
    wallets: HashMap<Uuid, Wallet>,
    transactions: HashMap<Uuid, Transaction>,
    new_transactions: Vec<Uuid>,
}

impl MemoryUnit {
    fn current_wallet(&self, wallet_id: Uuid) -> Option<Wallet> {
        self.wallets
            .get(&wallet_id)
            .or_else(|| self.state.wallets.get(&wallet_id))
            .cloned()
    }

    fn current_transaction(&self, transaction_id: Uuid) -> Option<Transaction> {
        self.transactions
            .get(&transaction_id)
            .or_else(|| self.state.transactions.get(&transaction_id))
            .cloned()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> StoreResult<Option<Wallet>> {
        Ok(self.current_wallet(wallet_id))
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        let owner_taken = self.state.wallet_by_user.contains_key(&wallet.user_id)
            || self.wallets.values().any(|w| w.user_id == wallet.user_id);
        if owner_taken {
            return Err(StoreError::DuplicateWalletOwner(wallet.user_id));
        }

        let number = wallet.wallet_number.as_str();
        let number_taken = self.state.wallet_by_number.contains_key(number)
            || self.wallets.values().any(|w| w.wallet_number.as_str() == number);
        if number_taken {
            return Err(StoreError::DuplicateWalletNumber(number.to_string()));
        }

        self.wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn set_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance: Money,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut wallet = self
            .current_wallet(wallet_id)
            .ok_or(StoreError::WalletNotFound(wallet_id))?;
        wallet.balance = balance;
        wallet.updated_at = at;
        self.wallets.insert(wallet_id, wallet);
        Ok(())
    }

    async fn lock_transaction(&mut self, reference: &str) -> StoreResult<Option<Transaction>> {
        if let Some(staged) = self.transactions.values().find(|t| t.reference == reference) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .state
            .transaction_by_reference
            .get(reference)
            .and_then(|id| self.state.transactions.get(id))
            .cloned())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        let reference = transaction.reference.as_str();
        let taken = self.state.transaction_by_reference.contains_key(reference)
            || self.transactions.values().any(|t| t.reference == reference);
        if taken {
            return Err(StoreError::DuplicateReference(reference.to_string()));
        }

        self.transactions.insert(transaction.id, transaction.clone());
        self.new_transactions.push(transaction.id);
        Ok(())
    }

    async fn set_transaction_status(
        &mut self,
        transaction_id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut transaction = self
            .current_transaction(transaction_id)
            .ok_or_else(|| StoreError::TransactionNotFound(transaction_id.to_string()))?;
        transaction.status = status;
        transaction.updated_at = at;
        self.transactions.insert(transaction_id, transaction);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryUnit {
            mut state,
            wallets,
            transactions,
            new_transactions,
        } = *self;

        for (id, wallet) in wallets {
            state.wallet_by_user.insert(wallet.user_id, id);
            state
                .wallet_by_number
                .insert(wallet.wallet_number.as_str().to_string(), id);
            state.wallets.insert(id, wallet);
        }

        for (id, transaction) in transactions {
            state
                .transaction_by_reference
                .insert(transaction.reference.clone(), id);
            state.transactions.insert(id, transaction);
        }
        state.transaction_log.extend(new_transactions);

        Ok(())
    }
}
