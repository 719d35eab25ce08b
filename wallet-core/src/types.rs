//! Core types for the wallet ledger
//!
//! Wallets and transactions are owned by the store; workflows only ever hold
//! snapshots returned from it.

use crate::money::Money;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Number of digits in a wallet number
pub const WALLET_NUMBER_LEN: usize = 13;

/// Externally shareable wallet identifier (fixed-length numeric string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletNumber(String);

impl WalletNumber {
    /// Wrap an existing number (as read from storage or a caller)
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Draw a fresh random number, zero-padded to [`WALLET_NUMBER_LEN`] digits
    pub fn generate() -> Self {
        let value: u64 = rand::thread_rng().gen_range(0..10u64.pow(WALLET_NUMBER_LEN as u32));
        Self(format!("{:0width$}", value, width = WALLET_NUMBER_LEN))
    }

    /// True if the number has the issued shape
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == WALLET_NUMBER_LEN && self.0.bytes().all(|b| b.is_ascii_digit())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user's balance-holding account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID
    pub id: Uuid,

    /// Owning user (one wallet per user)
    pub user_id: Uuid,

    /// Shareable number used as a transfer destination
    pub wallet_number: WalletNumber,

    /// Current balance, never negative
    pub balance: Money,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh empty wallet for `user_id`
    pub fn open(user_id: Uuid, wallet_number: WalletNumber, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            wallet_number,
            balance: Money::zero(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a transaction records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Funding through the payment gateway
    Deposit,
    /// Wallet-to-wallet movement
    Transfer,
}

impl TransactionKind {
    /// Storage / wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Transfer => "transfer",
        }
    }

    /// Prefix used for references of this kind
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "TXN",
            TransactionKind::Transfer => "TFR",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "transfer" => Ok(TransactionKind::Transfer),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Awaiting gateway confirmation
    Pending,
    /// Funds applied (terminal)
    Success,
    /// Gateway reported failure (terminal)
    Failed,
}

impl TransactionStatus {
    /// Storage / wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }

    /// Check if no further transition is allowed
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of a balance-affecting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: Uuid,

    /// Caller-visible reference, unique across the ledger
    pub reference: String,

    /// Owning user
    pub user_id: Uuid,

    /// Originating wallet (credited for deposits, debited for transfers)
    pub wallet_id: Uuid,

    /// Deposit or transfer
    pub kind: TransactionKind,

    /// Amount moved, always positive
    pub amount: Money,

    /// Lifecycle status
    pub status: TransactionStatus,

    /// Reference assigned by the payment gateway
    pub gateway_reference: Option<String>,

    /// Checkout link returned by the gateway
    pub payment_url: Option<String>,

    /// Debited wallet (transfers)
    pub sender_wallet_number: Option<WalletNumber>,

    /// Credited wallet (transfers)
    pub recipient_wallet_number: Option<WalletNumber>,

    /// Free-text description
    pub description: Option<String>,

    /// Structured extras (gateway access code, etc.)
    pub metadata: Option<serde_json::Value>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last status change
    pub updated_at: DateTime<Utc>,
}

/// Transaction as requested by a workflow, before the ledger assigns identity
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Reference allocated for this transaction
    pub reference: String,
    /// Owning user
    pub user_id: Uuid,
    /// Originating wallet
    pub wallet_id: Uuid,
    /// Deposit or transfer
    pub kind: TransactionKind,
    /// Amount moved
    pub amount: Money,
    /// Initial status
    pub status: TransactionStatus,
    /// Gateway reference, if any
    pub gateway_reference: Option<String>,
    /// Checkout link, if any
    pub payment_url: Option<String>,
    /// Debited wallet number
    pub sender_wallet_number: Option<WalletNumber>,
    /// Credited wallet number
    pub recipient_wallet_number: Option<WalletNumber>,
    /// Free-text description
    pub description: Option<String>,
    /// Structured extras
    pub metadata: Option<serde_json::Value>,
}

impl NewTransaction {
    /// Stamp identity and timestamps
    pub fn into_transaction(self, now: DateTime<Utc>) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            reference: self.reference,
            user_id: self.user_id,
            wallet_id: self.wallet_id,
            kind: self.kind,
            amount: self.amount,
            status: self.status,
            gateway_reference: self.gateway_reference,
            payment_url: self.payment_url,
            sender_wallet_number: self.sender_wallet_number,
            recipient_wallet_number: self.recipient_wallet_number,
            description: self.description,
            metadata: self.metadata,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generate a reference: `<prefix>_<unix seconds>_<8 hex chars>`
pub fn generate_reference(kind: TransactionKind, now: DateTime<Utc>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("{}_{}_{:08x}", kind.reference_prefix(), now.timestamp(), suffix)
}
