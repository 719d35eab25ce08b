//! Ledger facade over a [`LedgerStore`]
//!
//! Workflows never open units of work themselves. Everything that writes goes
//! through one of the methods here, each of which is a single unit that either
//! commits whole or leaves the store untouched.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use wallet_core::{Ledger, MemoryLedgerStore};
//!
//! # async fn run() -> Result<(), wallet_core::StoreError> {
//! let ledger = Ledger::new(Arc::new(MemoryLedgerStore::new()));
//! let wallet = ledger.get_or_create_wallet(uuid::Uuid::new_v4()).await?;
//! assert!(wallet.balance.is_zero());
//! # Ok(())
//! # }
//! ```

use crate::error::{StoreError, StoreResult};
use crate::store::{
    Direction, LedgerStore, MutationOutcome, TransactionChange, UnitOfWork, WalletUpdate,
};
use crate::types::{
    generate_reference, NewTransaction, Transaction, TransactionKind, Wallet, WalletNumber,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempts at drawing an unused wallet number
const WALLET_NUMBER_ATTEMPTS: usize = 5;

/// Attempts at drawing an unused transaction reference
pub const REFERENCE_ATTEMPTS: usize = 3;

/// Handle to the ledger, cheap to clone
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

impl Ledger {
    /// Ledger over `store`
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Wallet for `user_id`, opened with a zero balance on first use.
    ///
    /// Concurrent first calls for the same user converge on one wallet.
    pub async fn get_or_create_wallet(&self, user_id: Uuid) -> StoreResult<Wallet> {
        if let Some(wallet) = self.store.wallet_by_user(user_id).await? {
            return Ok(wallet);
        }

        let mut last_number = String::new();
        for _ in 0..WALLET_NUMBER_ATTEMPTS {
            let wallet = Wallet::open(user_id, WalletNumber::generate(), Utc::now());
            let unit = self.store.begin().await?;

            match Self::insert_wallet(unit, &wallet).await {
                Ok(()) => {
                    info!(
                        user_id = %user_id,
                        wallet_number = %wallet.wallet_number,
                        "Opened wallet"
                    );
                    return Ok(wallet);
                }
                Err(StoreError::DuplicateWalletOwner(_)) => {
                    debug!(user_id = %user_id, "Wallet opened concurrently, reusing it");
                    if let Some(existing) = self.store.wallet_by_user(user_id).await? {
                        return Ok(existing);
                    }
                }
                Err(StoreError::DuplicateWalletNumber(number)) => {
                    warn!(wallet_number = %number, "Wallet number collision, redrawing");
                    last_number = number;
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::DuplicateWalletNumber(last_number))
    }

    async fn insert_wallet(mut unit: Box<dyn UnitOfWork>, wallet: &Wallet) -> StoreResult<()> {
        unit.insert_wallet(wallet).await?;
        unit.commit().await
    }

    /// Wallet owned by `user_id`, if opened
    pub async fn get_wallet_by_user(&self, user_id: Uuid) -> StoreResult<Option<Wallet>> {
        self.store.wallet_by_user(user_id).await
    }

    /// Wallet addressed by `wallet_number`
    pub async fn get_wallet_by_number(&self, wallet_number: &str) -> StoreResult<Option<Wallet>> {
        self.store.wallet_by_number(wallet_number).await
    }

    /// Record a transaction without touching any balance
    pub async fn create_transaction(&self, new: NewTransaction) -> StoreResult<Transaction> {
        let transaction = new.into_transaction(Utc::now());
        let mut unit = self.store.begin().await?;
        unit.insert_transaction(&transaction).await?;
        unit.commit().await?;
        Ok(transaction)
    }

    /// Transaction recorded under `reference`
    pub async fn get_transaction_by_reference(
        &self,
        reference: &str,
    ) -> StoreResult<Option<Transaction>> {
        self.store.transaction_by_reference(reference).await
    }

    /// Newest-first transactions of `user_id` plus their total count
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Transaction>, u64)> {
        self.store.transactions_for_user(user_id, offset, limit).await
    }

    /// Draw a reference not yet present in the store.
    ///
    /// The store's uniqueness constraint stays authoritative; this only makes
    /// a collision at insert time unlikely.
    pub async fn allocate_reference(&self, kind: TransactionKind) -> StoreResult<String> {
        self.allocate_reference_with(|| generate_reference(kind, Utc::now()))
            .await
    }

    async fn allocate_reference_with<F>(&self, mut draw: F) -> StoreResult<String>
    where
        F: FnMut() -> String + Send,
    {
        let mut reference = String::new();
        for _ in 0..REFERENCE_ATTEMPTS {
            reference = draw();
            if self.store.transaction_by_reference(&reference).await?.is_none() {
                return Ok(reference);
            }
            warn!(reference = %reference, "Reference collision, redrawing");
        }
        Err(StoreError::DuplicateReference(reference))
    }

    /// Apply balance changes and one transaction write as a single unit.
    ///
    /// Wallets are locked in ascending id order and every debit is checked
    /// against the locked balance. Any failure drops the unit, so either all
    /// changes land or none do. A `Settle` whose target is no longer pending
    /// returns [`MutationOutcome::Unchanged`] without writing anything.
    pub async fn mutate_balances(
        &self,
        updates: Vec<WalletUpdate>,
        change: TransactionChange,
    ) -> StoreResult<MutationOutcome> {
        let now = Utc::now();
        let mut unit = self.store.begin().await?;

        let transaction = match change {
            TransactionChange::Insert(new) => {
                let transaction = new.into_transaction(now);
                unit.insert_transaction(&transaction).await?;
                transaction
            }
            TransactionChange::Settle { reference, status } => {
                let mut transaction = unit
                    .lock_transaction(&reference)
                    .await?
                    .ok_or(StoreError::TransactionNotFound(reference))?;

                if transaction.status.is_terminal() {
                    return Ok(MutationOutcome::Unchanged(transaction));
                }

                unit.set_transaction_status(transaction.id, status, now).await?;
                transaction.status = status;
                transaction.updated_at = now;
                transaction
            }
        };

        let mut updates = updates;
        updates.sort_by_key(|update| update.wallet_id);

        let mut locked: BTreeMap<Uuid, Wallet> = BTreeMap::new();
        for update in &updates {
            if !locked.contains_key(&update.wallet_id) {
                let wallet = unit
                    .lock_wallet(update.wallet_id)
                    .await?
                    .ok_or(StoreError::WalletNotFound(update.wallet_id))?;
                locked.insert(update.wallet_id, wallet);
            }

            let wallet = locked
                .get_mut(&update.wallet_id)
                .ok_or(StoreError::WalletNotFound(update.wallet_id))?;

            wallet.balance = match update.direction {
                Direction::Credit => wallet
                    .balance
                    .checked_add(update.amount)
                    .ok_or(StoreError::BalanceOverflow(wallet.id))?,
                Direction::Debit => wallet.balance.checked_sub(update.amount).ok_or(
                    StoreError::InsufficientBalance {
                        wallet_id: wallet.id,
                        required: update.amount,
                        available: wallet.balance,
                    },
                )?,
            };
            wallet.updated_at = now;
        }

        for wallet in locked.values() {
            unit.set_wallet_balance(wallet.id, wallet.balance, now).await?;
        }

        unit.commit().await?;

        Ok(MutationOutcome::Applied {
            transaction,
            wallets: locked.into_values().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::store::MemoryLedgerStore;
    use crate::types::TransactionStatus;
    use rust_decimal_macros::dec;

    fn money(value: rust_decimal::Decimal) -> Money {
        Money::new(value).unwrap()
    }

    fn deposit(wallet: &Wallet, reference: &str, amount: Money) -> NewTransaction {
        NewTransaction {
            reference: reference.to_string(),
            user_id: wallet.user_id,
            wallet_id: wallet.id,
            kind: TransactionKind::Deposit,
            amount,
            status: TransactionStatus::Pending,
            gateway_reference: Some(reference.to_string()),
            payment_url: None,
            sender_wallet_number: None,
            recipient_wallet_number: None,
            description: None,
            metadata: None,
        }
    }

    fn setup() -> (MemoryLedgerStore, Ledger) {
        let store = MemoryLedgerStore::new();
        let ledger = Ledger::new(Arc::new(store.clone()));
        (store, ledger)
    }

    async fn funded(ledger: &Ledger, amount: Money) -> Wallet {
        let wallet = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();
        let reference = ledger.allocate_reference(TransactionKind::Deposit).await.unwrap();
        let mut new = deposit(&wallet, &reference, amount);
        new.status = TransactionStatus::Success;
        ledger
            .mutate_balances(vec![WalletUpdate::credit(wallet.id, amount)], TransactionChange::Insert(new))
            .await
            .unwrap();
        ledger.get_wallet_by_user(wallet.user_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, ledger) = setup();
        let user_id = Uuid::new_v4();

        let first = ledger.get_or_create_wallet(user_id).await.unwrap();
        let second = ledger.get_or_create_wallet(user_id).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.wallet_number.is_well_formed());
        assert_eq!(first.balance, Money::zero());
        assert_eq!(store.wallet_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_opens_one_wallet() {
        let (store, ledger) = setup();
        let user_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.get_or_create_wallet(user_id).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.wallet_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_debit_rolls_back_whole_unit() {
        let (store, ledger) = setup();
        let sender = funded(&ledger, money(dec!(100.00))).await;
        let recipient = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();

        let mut new = deposit(&sender, "TFR_1_0000abcd", money(dec!(150.00)));
        new.kind = TransactionKind::Transfer;
        let err = ledger
            .mutate_balances(
                vec![
                    WalletUpdate::credit(recipient.id, money(dec!(150.00))),
                    WalletUpdate::debit(sender.id, money(dec!(150.00))),
                ],
                TransactionChange::Insert(new),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InsufficientBalance { .. }));
        assert_eq!(store.total_balance().await, money(dec!(100.00)));
        let recipient = ledger.get_wallet_by_user(recipient.user_id).await.unwrap().unwrap();
        assert_eq!(recipient.balance, Money::zero());
        assert!(ledger.get_transaction_by_reference("TFR_1_0000abcd").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settle_only_moves_pending() {
        let (_store, ledger) = setup();
        let wallet = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();
        let amount = money(dec!(50.00));
        ledger
            .create_transaction(deposit(&wallet, "TXN_1_00000001", amount))
            .await
            .unwrap();

        let settle = || TransactionChange::Settle {
            reference: "TXN_1_00000001".to_string(),
            status: TransactionStatus::Success,
        };

        let first = ledger
            .mutate_balances(vec![WalletUpdate::credit(wallet.id, amount)], settle())
            .await
            .unwrap();
        match first {
            MutationOutcome::Applied { transaction, wallets } => {
                assert_eq!(transaction.status, TransactionStatus::Success);
                assert_eq!(wallets[0].balance, amount);
            }
            other => panic!("expected applied, got {:?}", other),
        }

        let second = ledger
            .mutate_balances(vec![WalletUpdate::credit(wallet.id, amount)], settle())
            .await
            .unwrap();
        assert!(matches!(second, MutationOutcome::Unchanged(ref t) if t.status == TransactionStatus::Success));

        let wallet = ledger.get_wallet_by_user(wallet.user_id).await.unwrap().unwrap();
        assert_eq!(wallet.balance, amount);
    }

    #[tokio::test]
    async fn test_settle_unknown_reference() {
        let (_store, ledger) = setup();
        let err = ledger
            .mutate_balances(
                vec![],
                TransactionChange::Settle {
                    reference: "TXN_0_deadbeef".to_string(),
                    status: TransactionStatus::Failed,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_create_transaction_rejects_duplicate() {
        let (store, ledger) = setup();
        let wallet = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();

        ledger
            .create_transaction(deposit(&wallet, "TXN_1_00000009", money(dec!(5))))
            .await
            .unwrap();
        let err = ledger
            .create_transaction(deposit(&wallet, "TXN_1_00000009", money(dec!(7))))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateReference(_)));
        let stored = ledger.get_transaction_by_reference("TXN_1_00000009").await.unwrap().unwrap();
        assert_eq!(stored.amount, money(dec!(5)));
        assert_eq!(store.total_balance().await, Money::zero());
    }

    #[tokio::test]
    async fn test_allocate_reference_redraws_on_collision() {
        let (_store, ledger) = setup();
        let wallet = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();
        ledger
            .create_transaction(deposit(&wallet, "TXN_1_00000001", money(dec!(5))))
            .await
            .unwrap();

        let mut candidates = vec!["TXN_1_00000002", "TXN_1_00000001"];
        let reference = ledger
            .allocate_reference_with(|| candidates.pop().unwrap_or_default().to_string())
            .await
            .unwrap();
        assert_eq!(reference, "TXN_1_00000002");
    }

    #[tokio::test]
    async fn test_allocate_reference_gives_up_after_attempts() {
        let (_store, ledger) = setup();
        let wallet = ledger.get_or_create_wallet(Uuid::new_v4()).await.unwrap();
        ledger
            .create_transaction(deposit(&wallet, "TXN_1_00000001", money(dec!(5))))
            .await
            .unwrap();

        let mut draws = 0;
        let err = ledger
            .allocate_reference_with(|| {
                draws += 1;
                "TXN_1_00000001".to_string()
            })
            .await
            .unwrap_err();

        assert_eq!(draws, REFERENCE_ATTEMPTS);
        assert!(matches!(err, StoreError::DuplicateReference(ref r) if r == "TXN_1_00000001"));
        let err: crate::error::WalletError = err.into();
        assert_eq!(err.error_type(), "DUPLICATE_TRANSACTION");
    }

    #[tokio::test]
    async fn test_allocated_references_have_kind_prefix() {
        let (_store, ledger) = setup();
        let deposit = ledger.allocate_reference(TransactionKind::Deposit).await.unwrap();
        let transfer = ledger.allocate_reference(TransactionKind::Transfer).await.unwrap();
        assert!(deposit.starts_with("TXN_"));
        assert!(transfer.starts_with("TFR_"));
    }
}
