//! Gateway-funded deposits
//!
//! A deposit is opened as a `pending` transaction with no balance change.
//! Only a reconciled webhook moves it to a terminal status, and only a
//! successful one credits the wallet. Polling [`DepositWorkflow::verify_transaction`]
//! reports the gateway's view but never credits.

use crate::error::{Result, WalletError};
use crate::gateway::{ChargeStatus, PaymentGateway};
use crate::ledger::Ledger;
use crate::metrics::WalletMetrics;
use crate::money::Money;
use crate::store::{MutationOutcome, TransactionChange, WalletUpdate};
use crate::types::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Only webhook event that reconciles a deposit
pub const CHARGE_SUCCESS_EVENT: &str = "charge.success";

const DEPOSIT_DESCRIPTION: &str = "Paystack deposit";

/// Opened deposit, ready for the payer to complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositInit {
    /// Ledger reference, also sent to the gateway
    pub reference: String,
    /// Checkout link for the payer
    pub authorization_url: String,
    /// Requested amount
    pub amount: Money,
    /// Always `pending`
    pub status: TransactionStatus,
}

/// What a webhook delivery did
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Event type we do not act on
    Ignored {
        /// Event name as delivered
        event: String,
    },
    /// Deposit reconciled (or already settled)
    Processed(Transaction),
}

/// Where a [`Verification`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationSource {
    /// Live lookup at the gateway
    Gateway,
    /// Terminal status already recorded in the ledger
    Ledger,
}

/// Caller-facing view of a deposit's payment status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    /// Deposit reference
    pub reference: String,
    /// Payment status
    pub status: ChargeStatus,
    /// Deposit amount
    pub amount: Money,
    /// Provider's outcome text, gateway lookups only
    pub gateway_message: Option<String>,
    /// When the payer paid, gateway lookups only
    pub paid_at: Option<DateTime<Utc>>,
    /// Gateway or ledger
    pub source: VerificationSource,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChargeData {
    reference: String,
    status: String,
}

/// Deposit lifecycle: open, reconcile, verify
pub struct DepositWorkflow {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    metrics: WalletMetrics,
}

impl DepositWorkflow {
    /// Deposits over `ledger`, charged through `gateway`
    pub fn new(ledger: Ledger, gateway: Arc<dyn PaymentGateway>, metrics: WalletMetrics) -> Self {
        Self {
            ledger,
            gateway,
            metrics,
        }
    }

    /// Open a charge at the gateway and record it as a pending deposit
    pub async fn initialize_deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        email: &str,
    ) -> Result<DepositInit> {
        let amount = Money::positive(amount)?;
        let amount_minor = amount.to_minor_units()?;

        let wallet = self.ledger.get_or_create_wallet(user_id).await?;
        let reference = self
            .ledger
            .allocate_reference(TransactionKind::Deposit)
            .await?;

        let charge = self
            .gateway
            .initialize_charge(email, amount_minor, &reference)
            .await
            .map_err(|e| {
                error!(reference = %reference, error = %e, "Charge initialization failed");
                WalletError::from(e)
            })?;

        let metadata = charge
            .access_code
            .as_ref()
            .map(|code| serde_json::json!({ "access_code": code }));

        let transaction = self
            .ledger
            .create_transaction(NewTransaction {
                reference: reference.clone(),
                user_id,
                wallet_id: wallet.id,
                kind: TransactionKind::Deposit,
                amount,
                status: TransactionStatus::Pending,
                gateway_reference: Some(charge.gateway_reference),
                payment_url: Some(charge.authorization_url.clone()),
                sender_wallet_number: None,
                recipient_wallet_number: None,
                description: Some(DEPOSIT_DESCRIPTION.to_string()),
                metadata,
            })
            .await?;

        self.metrics.deposits_initialized.inc();
        info!(
            reference = %transaction.reference,
            user_id = %user_id,
            wallet_number = %wallet.wallet_number,
            amount = %amount,
            "Deposit initialized"
        );

        Ok(DepositInit {
            reference: transaction.reference,
            authorization_url: charge.authorization_url,
            amount,
            status: transaction.status,
        })
    }

    /// Apply the gateway's final word on a deposit.
    ///
    /// The caller must have verified the webhook signature. A transaction that
    /// is already terminal is returned as-is.
    pub async fn reconcile_webhook(&self, reference: &str, gateway_status: &str) -> Result<Transaction> {
        let transaction = self
            .ledger
            .get_transaction_by_reference(reference)
            .await?
            .ok_or_else(|| WalletError::TransactionNotFound(reference.to_string()))?;

        if transaction.status.is_terminal() {
            self.metrics.webhook_duplicates.inc();
            info!(reference, status = %transaction.status, "Deposit already settled");
            return Ok(transaction);
        }

        let (updates, status) = if ChargeStatus::parse(gateway_status).is_success() {
            (
                vec![WalletUpdate::credit(transaction.wallet_id, transaction.amount)],
                TransactionStatus::Success,
            )
        } else {
            (Vec::new(), TransactionStatus::Failed)
        };

        let outcome = self
            .ledger
            .mutate_balances(
                updates,
                TransactionChange::Settle {
                    reference: reference.to_string(),
                    status,
                },
            )
            .await
            .map_err(|e| {
                error!(reference, error = %e, "Deposit reconciliation failed");
                WalletError::from(e)
            })?;

        match outcome {
            MutationOutcome::Applied { transaction, .. } => {
                if transaction.status == TransactionStatus::Success {
                    self.metrics.webhook_credits.inc();
                    info!(
                        reference,
                        user_id = %transaction.user_id,
                        amount = %transaction.amount,
                        "Deposit credited"
                    );
                } else {
                    self.metrics.webhook_failures.inc();
                    warn!(reference, gateway_status, "Deposit marked failed");
                }
                Ok(transaction)
            }
            MutationOutcome::Unchanged(transaction) => {
                self.metrics.webhook_duplicates.inc();
                info!(reference, status = %transaction.status, "Deposit already settled");
                Ok(transaction)
            }
        }
    }

    /// Authenticate and dispatch a raw webhook delivery
    pub async fn handle_webhook(&self, signature: &str, raw_body: &[u8]) -> Result<WebhookOutcome> {
        if !self.gateway.verify_webhook_signature(signature, raw_body) {
            warn!("Rejected webhook with invalid signature");
            return Err(WalletError::InvalidSignature);
        }

        let envelope: WebhookEnvelope =
            serde_json::from_slice(raw_body).map_err(|e| WalletError::InvalidWebhookPayload {
                detail: e.to_string(),
            })?;

        if envelope.event != CHARGE_SUCCESS_EVENT {
            warn!(event = %envelope.event, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored {
                event: envelope.event,
            });
        }

        let data: ChargeData =
            serde_json::from_value(envelope.data).map_err(|e| WalletError::InvalidWebhookPayload {
                detail: e.to_string(),
            })?;

        let transaction = self.reconcile_webhook(&data.reference, &data.status).await?;
        Ok(WebhookOutcome::Processed(transaction))
    }

    /// Report payment status without touching any balance
    pub async fn verify_transaction(&self, reference: &str) -> Result<Verification> {
        let transaction = self
            .ledger
            .get_transaction_by_reference(reference)
            .await?
            .ok_or_else(|| WalletError::TransactionNotFound(reference.to_string()))?;

        if transaction.status != TransactionStatus::Pending {
            let paid_at = (transaction.status == TransactionStatus::Success)
                .then_some(transaction.updated_at);
            return Ok(Verification {
                reference: transaction.reference,
                status: ChargeStatus::parse(transaction.status.as_str()),
                amount: transaction.amount,
                gateway_message: None,
                paid_at,
                source: VerificationSource::Ledger,
            });
        }

        let charge = self.gateway.verify_charge(reference).await.map_err(|e| {
            error!(reference, error = %e, "Charge verification failed");
            WalletError::from(e)
        })?;

        let amount = Money::from_minor_units(charge.amount_minor).map_err(|e| {
            WalletError::PaymentVerificationFailed {
                detail: format!("Gateway reported an invalid amount: {}", e),
            }
        })?;

        Ok(Verification {
            reference: transaction.reference,
            status: charge.status,
            amount,
            gateway_message: charge.gateway_message,
            paid_at: charge.paid_at,
            source: VerificationSource::Gateway,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChargeInit, ChargeVerification, GatewayError, MockPaymentGateway};
    use crate::store::{LedgerStore, MemoryLedgerStore};
    use rust_decimal_macros::dec;

    fn workflow(gateway: MockPaymentGateway) -> (MemoryLedgerStore, DepositWorkflow) {
        let store = MemoryLedgerStore::new();
        let ledger = Ledger::new(Arc::new(store.clone()));
        let metrics = WalletMetrics::new().unwrap();
        (store, DepositWorkflow::new(ledger, Arc::new(gateway), metrics))
    }

    fn accepting_gateway() -> MockPaymentGateway {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_initialize_charge()
            .returning(|_, _, reference| {
                Ok(ChargeInit {
                    authorization_url: format!("https://checkout.test/{}", reference),
                    gateway_reference: reference.to_string(),
                    access_code: Some("ac_123".to_string()),
                })
            });
        gateway
    }

    #[tokio::test]
    async fn test_amount_sent_in_minor_units() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_initialize_charge()
            .withf(|_, amount, _| *amount == 500_000)
            .times(1)
            .returning(|_, _, reference| {
                Ok(ChargeInit {
                    authorization_url: "https://checkout.test/x".to_string(),
                    gateway_reference: reference.to_string(),
                    access_code: None,
                })
            });
        let (store, deposits) = workflow(gateway);

        let init = deposits
            .initialize_deposit(Uuid::new_v4(), dec!(5000.00), "payer@example.com")
            .await
            .unwrap();

        assert!(init.reference.starts_with("TXN_"));
        assert_eq!(init.status, TransactionStatus::Pending);
        assert_eq!(store.total_balance().await, Money::zero());
    }

    #[tokio::test]
    async fn test_invalid_amount_never_reaches_gateway() {
        let mut gateway = MockPaymentGateway::new();
        gateway.expect_initialize_charge().never();
        let (store, deposits) = workflow(gateway);

        for amount in [dec!(0), dec!(-10), dec!(1.005), dec!(100000000000000.00)] {
            let err = deposits
                .initialize_deposit(Uuid::new_v4(), amount, "payer@example.com")
                .await
                .unwrap_err();
            assert!(matches!(err, WalletError::InvalidAmount(_)), "amount {}", amount);
        }
        assert_eq!(store.wallet_count().await, 0);
    }

    #[tokio::test]
    async fn test_gateway_outage_records_nothing() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_initialize_charge()
            .returning(|_, _, _| Err(GatewayError::Unavailable("connect refused".to_string())));
        let (store, deposits) = workflow(gateway);
        let user_id = Uuid::new_v4();

        let err = deposits
            .initialize_deposit(user_id, dec!(10), "payer@example.com")
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.status_code(), 503);
        let (items, total) = store.transactions_for_user(user_id, 0, 20).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_provider_rejection() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_initialize_charge()
            .returning(|_, _, _| Err(GatewayError::InitFailed("Invalid email".to_string())));
        let (_store, deposits) = workflow(gateway);

        let err = deposits
            .initialize_deposit(Uuid::new_v4(), dec!(10), "not-an-email")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::PaymentInitFailed { .. }));
    }

    #[tokio::test]
    async fn test_failed_status_is_terminal() {
        let (store, deposits) = workflow(accepting_gateway());
        let init = deposits
            .initialize_deposit(Uuid::new_v4(), dec!(25.00), "payer@example.com")
            .await
            .unwrap();

        let failed = deposits.reconcile_webhook(&init.reference, "failed").await.unwrap();
        assert_eq!(failed.status, TransactionStatus::Failed);

        let again = deposits.reconcile_webhook(&init.reference, "success").await.unwrap();
        assert_eq!(again.status, TransactionStatus::Failed);
        assert_eq!(store.total_balance().await, Money::zero());
    }

    #[tokio::test]
    async fn test_verify_pending_asks_gateway_without_crediting() {
        let mut gateway = accepting_gateway();
        gateway.expect_verify_charge().times(1).returning(|reference| {
            Ok(ChargeVerification {
                reference: reference.to_string(),
                status: ChargeStatus::Success,
                amount_minor: 250_000,
                gateway_message: Some("Approved".to_string()),
                paid_at: Some(Utc::now()),
            })
        });
        let (store, deposits) = workflow(gateway);
        let init = deposits
            .initialize_deposit(Uuid::new_v4(), dec!(2500), "payer@example.com")
            .await
            .unwrap();

        let verification = deposits.verify_transaction(&init.reference).await.unwrap();

        assert_eq!(verification.source, VerificationSource::Gateway);
        assert_eq!(verification.status, ChargeStatus::Success);
        assert_eq!(verification.amount, Money::new(dec!(2500.00)).unwrap());
        assert_eq!(store.total_balance().await, Money::zero());
        let stored = store.transaction_by_reference(&init.reference).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_verify_settled_reads_ledger() {
        let mut gateway = accepting_gateway();
        gateway.expect_verify_charge().never();
        let (_store, deposits) = workflow(gateway);
        let init = deposits
            .initialize_deposit(Uuid::new_v4(), dec!(40), "payer@example.com")
            .await
            .unwrap();
        deposits.reconcile_webhook(&init.reference, "success").await.unwrap();

        let verification = deposits.verify_transaction(&init.reference).await.unwrap();
        assert_eq!(verification.source, VerificationSource::Ledger);
        assert!(verification.status.is_success());
        assert!(verification.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_reference() {
        let (_store, deposits) = workflow(MockPaymentGateway::new());
        let err = deposits.reconcile_webhook("TXN_0_00000000", "success").await.unwrap_err();
        assert!(matches!(err, WalletError::TransactionNotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature_and_payload() {
        let mut gateway = MockPaymentGateway::new();
        gateway
            .expect_verify_webhook_signature()
            .returning(|signature, _| signature == "good");
        let (_store, deposits) = workflow(gateway);

        let err = deposits.handle_webhook("bad", b"{}").await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidSignature));

        let err = deposits.handle_webhook("good", b"not json").await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidWebhookPayload { .. }));

        let err = deposits
            .handle_webhook("good", br#"{"event":"charge.success","data":{}}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidWebhookPayload { .. }));

        let outcome = deposits
            .handle_webhook("good", br#"{"event":"transfer.success","data":{}}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event: "transfer.success".to_string()
            }
        );
    }
}
