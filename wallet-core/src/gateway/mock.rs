//! In-memory payment gateway for tests and local runs

use super::{signature, ChargeInit, ChargeStatus, ChargeVerification, GatewayError, PaymentGateway};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// How the mock answers the next calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Calls succeed
    #[default]
    Healthy,
    /// Every call fails as a transport error
    Unavailable,
    /// Every call is refused by the "provider"
    Rejecting,
}

/// Charge opened through the mock
#[derive(Debug, Clone)]
pub struct MockCharge {
    /// Payer email
    pub email: String,
    /// Amount in minor units
    pub amount_minor: i64,
    /// Reference handed back to the caller
    pub gateway_reference: String,
    /// Status `verify_charge` reports
    pub status: ChargeStatus,
    /// Set once the charge is marked successful
    pub paid_at: Option<DateTime<Utc>>,
}

/// In-memory gateway that records every charge it opens
#[derive(Clone)]
pub struct MockGateway {
    secret: Arc<Vec<u8>>,
    mode: Arc<RwLock<MockMode>>,
    charges: Arc<RwLock<HashMap<String, MockCharge>>>,
}

impl MockGateway {
    /// Mock signing webhooks with `secret`
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: Arc::new(secret.into()),
            mode: Arc::new(RwLock::new(MockMode::Healthy)),
            charges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Switch how later calls behave
    pub async fn set_mode(&self, mode: MockMode) {
        *self.mode.write().await = mode;
    }

    /// Change what `verify_charge` reports for `reference`
    pub async fn set_status(&self, reference: &str, status: ChargeStatus) {
        let mut charges = self.charges.write().await;
        if let Some(charge) = charges.get_mut(reference) {
            charge.paid_at = status.is_success().then(Utc::now);
            charge.status = status;
        }
    }

    /// Charge recorded under `reference`
    pub async fn charge(&self, reference: &str) -> Option<MockCharge> {
        self.charges.read().await.get(reference).cloned()
    }

    /// Number of charges opened so far
    pub async fn charge_count(&self) -> usize {
        self.charges.read().await.len()
    }

    /// Signature header a real provider would send with `body`
    pub fn sign(&self, body: &[u8]) -> String {
        signature::sign(&self.secret, body)
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initialize_charge(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<ChargeInit, GatewayError> {
        match *self.mode.read().await {
            MockMode::Healthy => {}
            MockMode::Unavailable => {
                warn!("Mock gateway: simulated outage");
                return Err(GatewayError::Unavailable("Simulated outage".to_string()));
            }
            MockMode::Rejecting => {
                return Err(GatewayError::InitFailed("Simulated rejection".to_string()));
            }
        }

        let access_code = Uuid::new_v4().simple().to_string();
        let charge = MockCharge {
            email: email.to_string(),
            amount_minor,
            gateway_reference: reference.to_string(),
            status: ChargeStatus::Pending,
            paid_at: None,
        };
        self.charges
            .write()
            .await
            .insert(reference.to_string(), charge);

        info!("Mock gateway: opened charge {} for {} minor units", reference, amount_minor);

        Ok(ChargeInit {
            authorization_url: format!("https://checkout.mock.local/{}", access_code),
            gateway_reference: reference.to_string(),
            access_code: Some(access_code),
        })
    }

    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        match *self.mode.read().await {
            MockMode::Healthy => {}
            MockMode::Unavailable => {
                return Err(GatewayError::Unavailable("Simulated outage".to_string()));
            }
            MockMode::Rejecting => {
                return Err(GatewayError::VerificationFailed(
                    "Simulated rejection".to_string(),
                ));
            }
        }

        let charges = self.charges.read().await;
        let charge = charges
            .get(reference)
            .ok_or_else(|| GatewayError::VerificationFailed("Transaction reference not found".to_string()))?;

        Ok(ChargeVerification {
            reference: reference.to_string(),
            status: charge.status.clone(),
            amount_minor: charge.amount_minor,
            gateway_message: Some(if charge.status.is_success() {
                "Approved".to_string()
            } else {
                charge.status.to_string()
            }),
            paid_at: charge.paid_at,
        })
    }

    fn verify_webhook_signature(&self, signature: &str, raw_body: &[u8]) -> bool {
        signature::verify(&self.secret, signature, raw_body)
    }
}
