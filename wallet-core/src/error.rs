//! Error types for the wallet core
//!
//! [`StoreError`] and [`GatewayError`] describe failures at the two
//! collaborator boundaries. [`WalletError`] is what callers of the workflows
//! see; every kind maps to a stable status and machine code.

use crate::gateway::GatewayError;
use crate::money::{Money, MoneyError};
use thiserror::Error;
use uuid::Uuid;

/// Result type for workflow operations
pub type Result<T> = std::result::Result<T, WalletError>;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Ledger store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error (PostgreSQL)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Transaction reference already recorded
    #[error("Duplicate transaction reference: {0}")]
    DuplicateReference(String),

    /// User already owns a wallet
    #[error("User {0} already owns a wallet")]
    DuplicateWalletOwner(Uuid),

    /// Wallet number already issued
    #[error("Wallet number already issued: {0}")]
    DuplicateWalletNumber(String),

    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Debit would drive a balance negative
    #[error("Insufficient balance in wallet {wallet_id}: required {required}, available {available}")]
    InsufficientBalance {
        /// Wallet being debited
        wallet_id: Uuid,
        /// Debit amount
        required: Money,
        /// Balance at the time of the check
        available: Money,
    },

    /// Credit would overflow the balance representation
    #[error("Balance overflow in wallet {0}")]
    BalanceOverflow(Uuid),

    /// Stored row violates a type invariant
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Errors surfaced by the wallet workflows
#[derive(Error, Debug)]
pub enum WalletError {
    /// No wallet for the user or wallet number
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    /// No transaction under the reference
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Reference already recorded
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Debit larger than the balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Requested amount
        required: Money,
        /// Balance at the time of the check
        available: Money,
    },

    /// Sender and recipient are the same wallet
    #[error("Cannot transfer to your own wallet")]
    SelfTransfer,

    /// Amount rejected by [`Money`]
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    /// Page or page size out of range
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// Transport failure, timeout or provider outage; safe to retry
    #[error("Payment gateway unavailable")]
    GatewayUnavailable {
        /// Underlying failure
        detail: String,
    },

    /// Provider refused to open the charge
    #[error("Payment initialization failed")]
    PaymentInitFailed {
        /// Provider message
        detail: String,
    },

    /// Provider refused to report on the charge
    #[error("Payment verification failed")]
    PaymentVerificationFailed {
        /// Provider message
        detail: String,
    },

    /// Webhook signature did not match the body
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Webhook body could not be parsed
    #[error("Invalid webhook payload")]
    InvalidWebhookPayload {
        /// Parse failure
        detail: String,
    },

    /// Store failure the caller cannot act on
    #[error("Internal ledger error")]
    Storage(#[source] StoreError),
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateReference(reference) => WalletError::DuplicateTransaction(reference),
            StoreError::WalletNotFound(id) => WalletError::WalletNotFound(id.to_string()),
            StoreError::TransactionNotFound(reference) => WalletError::TransactionNotFound(reference),
            StoreError::InsufficientBalance {
                required,
                available,
                ..
            } => WalletError::InsufficientBalance { required, available },
            other => WalletError::Storage(other),
        }
    }
}

impl From<GatewayError> for WalletError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(detail) => WalletError::GatewayUnavailable { detail },
            GatewayError::InitFailed(detail) => WalletError::PaymentInitFailed { detail },
            GatewayError::VerificationFailed(detail) => {
                WalletError::PaymentVerificationFailed { detail }
            }
        }
    }
}

impl WalletError {
    /// HTTP-style status for the routing layer
    pub fn status_code(&self) -> u16 {
        match self {
            WalletError::WalletNotFound(_) => 404,
            WalletError::TransactionNotFound(_) => 404,
            WalletError::DuplicateTransaction(_) => 409,
            WalletError::InsufficientBalance { .. } => 400,
            WalletError::SelfTransfer => 400,
            WalletError::InvalidAmount(_) => 400,
            WalletError::InvalidPagination(_) => 400,
            WalletError::GatewayUnavailable { .. } => 503,
            WalletError::PaymentInitFailed { .. } => 400,
            WalletError::PaymentVerificationFailed { .. } => 400,
            WalletError::InvalidSignature => 401,
            WalletError::InvalidWebhookPayload { .. } => 400,
            WalletError::Storage(_) => 500,
        }
    }

    /// Stable machine-readable code
    pub fn error_type(&self) -> &'static str {
        match self {
            WalletError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            WalletError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            WalletError::DuplicateTransaction(_) => "DUPLICATE_TRANSACTION",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::SelfTransfer => "SELF_TRANSFER",
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::InvalidPagination(_) => "INVALID_PAGINATION",
            WalletError::GatewayUnavailable { .. } => "GATEWAY_UNAVAILABLE",
            WalletError::PaymentInitFailed { .. } => "PAYMENT_INIT_FAILED",
            WalletError::PaymentVerificationFailed { .. } => "PAYMENT_VERIFICATION_FAILED",
            WalletError::InvalidSignature => "INVALID_SIGNATURE",
            WalletError::InvalidWebhookPayload { .. } => "INVALID_WEBHOOK_PAYLOAD",
            WalletError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// Only transport-level gateway failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::GatewayUnavailable { .. })
    }
}
