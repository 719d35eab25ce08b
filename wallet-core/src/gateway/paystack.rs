//! Paystack REST client

use super::{signature, ChargeInit, ChargeStatus, ChargeVerification, GatewayError, PaymentGateway};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// [`PaymentGateway`] over the Paystack REST API
pub struct PaystackGateway {
    api_url: String,
    secret_key: String,
    http_client: Client,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    reference: String,
    status: String,
    amount: i64,
    gateway_response: Option<String>,
    paid_at: Option<String>,
}

impl PaystackGateway {
    /// Build a client with the configured base URL, key and timeout
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            http_client,
        })
    }

    fn transport_error(err: reqwest::Error) -> GatewayError {
        error!("Paystack request failed: {}", err);
        if err.is_timeout() {
            GatewayError::Unavailable("Paystack request timed out".to_string())
        } else {
            GatewayError::Unavailable(format!("Failed to reach Paystack: {}", err))
        }
    }

    /// Unwrap a Paystack envelope; `reject` builds the provider-rejection error.
    ///
    /// A 5xx is an outage, not a rejection, and comes back as `Unavailable`.
    async fn read_envelope<T, F>(response: Response, reject: F) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        F: Fn(String) -> GatewayError,
    {
        let status = response.status();
        if status.is_server_error() {
            error!("Paystack outage: {}", status);
            return Err(GatewayError::Unavailable(format!("Paystack returned {}", status)));
        }
        let body = response.bytes().await.map_err(Self::transport_error)?;

        let envelope: Envelope<T> = match serde_json::from_slice(&body) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                warn!("Unreadable Paystack response: {}", e);
                return Err(reject(format!("Unreadable response: {}", e)));
            }
            Err(_) => return Err(reject(format!("Paystack returned {}", status))),
        };

        if !status.is_success() || !envelope.status {
            warn!("Paystack rejected request ({}): {}", status, envelope.message);
            return Err(reject(envelope.message));
        }

        envelope
            .data
            .ok_or_else(|| reject("Response carried no data".to_string()))
    }
}

#[async_trait]
impl PaymentGateway for PaystackGateway {
    async fn initialize_charge(
        &self,
        email: &str,
        amount_minor: i64,
        reference: &str,
    ) -> Result<ChargeInit, GatewayError> {
        let url = format!("{}/transaction/initialize", self.api_url);
        debug!(reference, amount_minor, "Initializing Paystack charge");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&InitializeRequest {
                email,
                amount: amount_minor,
                reference,
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        let data: InitializeData = Self::read_envelope(response, GatewayError::InitFailed).await?;

        Ok(ChargeInit {
            authorization_url: data.authorization_url,
            gateway_reference: data.reference,
            access_code: data.access_code,
        })
    }

    async fn verify_charge(&self, reference: &str) -> Result<ChargeVerification, GatewayError> {
        let url = format!("{}/transaction/verify/{}", self.api_url, reference);
        debug!(reference, "Verifying Paystack charge");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let data: VerifyData =
            Self::read_envelope(response, GatewayError::VerificationFailed).await?;

        let paid_at = data
            .paid_at
            .as_deref()
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());

        Ok(ChargeVerification {
            reference: data.reference,
            status: ChargeStatus::parse(&data.status),
            amount_minor: data.amount,
            gateway_message: data.gateway_response,
            paid_at,
        })
    }

    fn verify_webhook_signature(&self, signature: &str, raw_body: &[u8]) -> bool {
        signature::verify(self.secret_key.as_bytes(), signature, raw_body)
    }
}
