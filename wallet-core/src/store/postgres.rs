//! PostgreSQL store
//!
//! Units of work are database transactions. Wallet and transaction rows are
//! locked with `SELECT ... FOR UPDATE`, so a second unit touching the same row
//! waits for the first to commit and then reads the committed value. Reference
//! and wallet uniqueness are left to the named constraints in the schema.

use super::{LedgerStore, UnitOfWork};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};
use crate::money::Money;
use crate::types::{Transaction, TransactionStatus, Wallet, WalletNumber};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Executor, FromRow, Postgres};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("../../migrations/0001_wallets.sql");

/// Advisory lock id serialising schema bootstrap
const SCHEMA_LOCK_KEY: i64 = 0x5741_4c4c_4554;

const WALLETS_USER_ID_KEY: &str = "wallets_user_id_key";
const WALLETS_WALLET_NUMBER_KEY: &str = "wallets_wallet_number_key";
const TRANSACTIONS_REFERENCE_KEY: &str = "transactions_reference_key";

const WALLET_COLUMNS: &str = "id, user_id, wallet_number, balance, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, reference, user_id, wallet_id, kind, amount, status, \
     gateway_reference, payment_url, sender_wallet_number, recipient_wallet_number, \
     description, metadata, created_at, updated_at";

#[derive(Debug, FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    wallet_number: String,
    balance: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let balance = Money::new(row.balance)
            .map_err(|e| StoreError::Corrupt(format!("wallet {} balance: {}", row.id, e)))?;
        Ok(Wallet {
            id: row.id,
            user_id: row.user_id,
            wallet_number: WalletNumber::new(row.wallet_number),
            balance,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    reference: String,
    user_id: Uuid,
    wallet_id: Uuid,
    kind: String,
    amount: Decimal,
    status: String,
    gateway_reference: Option<String>,
    payment_url: Option<String>,
    sender_wallet_number: Option<String>,
    recipient_wallet_number: Option<String>,
    description: Option<String>,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| {
            StoreError::Corrupt(format!("transaction {} {}: {}", row.reference, what, detail))
        };
        let kind = row.kind.parse().map_err(|e| corrupt("kind", e))?;
        let status = row.status.parse().map_err(|e| corrupt("status", e))?;
        let amount = Money::new(row.amount).map_err(|e| corrupt("amount", e.to_string()))?;

        Ok(Transaction {
            id: row.id,
            reference: row.reference,
            user_id: row.user_id,
            wallet_id: row.wallet_id,
            kind,
            amount,
            status,
            gateway_reference: row.gateway_reference,
            payment_url: row.payment_url,
            sender_wallet_number: row.sender_wallet_number.map(WalletNumber::new),
            recipient_wallet_number: row.recipient_wallet_number.map(WalletNumber::new),
            description: row.description,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Translate unique violations into the store's duplicate errors
fn map_unique_violation(err: sqlx::Error, wallet: Option<&Wallet>, reference: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match (db_err.constraint(), wallet, reference) {
                (Some(WALLETS_USER_ID_KEY), Some(w), _) => {
                    return StoreError::DuplicateWalletOwner(w.user_id)
                }
                (Some(WALLETS_WALLET_NUMBER_KEY), Some(w), _) => {
                    return StoreError::DuplicateWalletNumber(w.wallet_number.to_string())
                }
                (Some(TRANSACTIONS_REFERENCE_KEY), _, Some(r)) => {
                    return StoreError::DuplicateReference(r.to_string())
                }
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Connect a pool using the database configuration
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            "Connected ledger store to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables, constraints and indexes if missing.
    ///
    /// Held under an advisory lock so instances starting together do not
    /// race on the catalog.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;
        (&mut *tx).execute(SCHEMA_SQL).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Close the pool (waits for checked-out connections)
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn wallet_by_user(&self, user_id: Uuid) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn wallet_by_number(&self, wallet_number: &str) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE wallet_number = $1",
            WALLET_COLUMNS
        ))
        .bind(wallet_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn transaction_by_reference(&self, reference: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE reference = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn transactions_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Transaction>, u64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            OFFSET $2 LIMIT $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(user_id)
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Transaction::try_from)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((items, total.max(0) as u64))
    }
}

/// Unit of work wrapping a database transaction; rolled back on drop
struct PgUnit {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_wallet(&mut self, wallet_id: Uuid) -> StoreResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn insert_wallet(&mut self, wallet: &Wallet) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, wallet_number, balance, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(wallet.wallet_number.as_str())
        .bind(wallet.balance.as_decimal())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, Some(wallet), None))?;

        Ok(())
    }

    async fn set_wallet_balance(
        &mut self,
        wallet_id: Uuid,
        balance: Money,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE wallets SET balance = $1, updated_at = $2 WHERE id = $3")
            .bind(balance.as_decimal())
            .bind(at)
            .bind(wallet_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::WalletNotFound(wallet_id));
        }
        Ok(())
    }

    async fn lock_transaction(&mut self, reference: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE reference = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Transaction::try_from).transpose()
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, reference, user_id, wallet_id, kind, amount, status,
                gateway_reference, payment_url, sender_wallet_number, recipient_wallet_number,
                description, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.reference)
        .bind(transaction.user_id)
        .bind(transaction.wallet_id)
        .bind(transaction.kind.as_str())
        .bind(transaction.amount.as_decimal())
        .bind(transaction.status.as_str())
        .bind(transaction.gateway_reference.as_deref())
        .bind(transaction.payment_url.as_deref())
        .bind(transaction.sender_wallet_number.as_ref().map(|n| n.as_str()))
        .bind(transaction.recipient_wallet_number.as_ref().map(|n| n.as_str()))
        .bind(transaction.description.as_deref())
        .bind(transaction.metadata.clone())
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_unique_violation(e, None, Some(&transaction.reference)))?;

        Ok(())
    }

    async fn set_transaction_status(
        &mut self,
        transaction_id: Uuid,
        status: TransactionStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE transactions SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(at)
            .bind(transaction_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TransactionNotFound(transaction_id.to_string()));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
