//! Payment gateway boundary
//!
//! The ledger talks to its payment provider only through [`PaymentGateway`].
//! Amounts cross this boundary in minor units (kobo for NGN).

pub mod mock;
pub mod paystack;
pub mod signature;

pub use mock::MockGateway;
pub use paystack::PaystackGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Gateway failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Timeout or connection failure
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// Provider refused to initialize the charge
    #[error("Charge initialization rejected: {0}")]
    InitFailed(String),

    /// Provider refused to verify the charge
    #[error("Charge verification rejected: {0}")]
    VerificationFailed(String),
}

/// Initialized charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeInit {
    /// Checkout link to send the payer to
    pub authorization_url: String,
    /// Reference the provider assigned
    pub gateway_reference: String,
    /// Access code for inline checkout, when the provider issues one
    pub access_code: Option<String>,
}

/// Charge status as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeStatus {
    /// Paid
    Success,
    /// Declined or errored
    Failed,
    /// Payer left checkout
    Abandoned,
    /// Not finished yet
    Pending,
    /// Any status we have no variant for
    Other(String),
}

impl ChargeStatus {
    /// Map a provider status string; unknown values are kept as `Other`
    pub fn parse(status: &str) -> Self {
        match status {
            "success" => ChargeStatus::Success,
            "failed" => ChargeStatus::Failed,
            "abandoned" => ChargeStatus::Abandoned,
            "pending" | "ongoing" | "processing" => ChargeStatus::Pending,
            other => ChargeStatus::Other(other.to_string()),
        }
    }

    /// Provider spelling of the status
    pub fn as_str(&self) -> &str {
        match self {
            ChargeStatus::Success => "success",
            ChargeStatus::Failed => "failed",
            ChargeStatus::Abandoned => "abandoned",
            ChargeStatus::Pending => "pending",
            ChargeStatus::Other(other) => other,
        }
    }

    /// True only for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self, ChargeStatus::Success)
    }
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider's view of a charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeVerification {
    /// Our reference
    pub reference: String,
    /// Provider status
    pub status: ChargeStatus,
    /// Charged amount in minor units
    pub amount_minor: i64,
    /// Provider's human-readable outcome
    pub gateway_message: Option<String>,
    /// When the payer paid
    pub paid_at: Option<DateTime<Utc>>,
}

/// Outbound payment provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a charge of `amount_minor` against `email` under our `reference`
    async fn initialize_charge(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<ChargeInit, GatewayError>;

    /// Ask the provider for the authoritative status of a charge
    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError>;

    /// Check a webhook signature header against the raw request body
    fn verify_webhook_signature(&self, signature: &str, raw_body: &[u8]) -> bool;
}
