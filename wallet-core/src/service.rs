//! Caller-facing entry point
//!
//! [`WalletService`] is what a routing layer holds. It owns the ledger handle,
//! the gateway and the metrics, and hands them to the three workflows.

use crate::config::WalletConfig;
use crate::deposit::{DepositInit, DepositWorkflow, Verification, WebhookOutcome};
use crate::error::Result;
use crate::gateway::PaymentGateway;
use crate::ledger::Ledger;
use crate::metrics::WalletMetrics;
use crate::query::{BalanceView, Page, PageRequest, QueryWorkflow};
use crate::store::LedgerStore;
use crate::transfer::TransferWorkflow;
use crate::types::{Transaction, Wallet};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Single entry point over the deposit, transfer and query workflows
pub struct WalletService {
    ledger: Ledger,
    deposits: DepositWorkflow,
    transfers: TransferWorkflow,
    queries: QueryWorkflow,
    metrics: WalletMetrics,
}

impl WalletService {
    /// Wire the workflows over `store` and `gateway`
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        settings: WalletConfig,
        metrics: WalletMetrics,
    ) -> Self {
        let ledger = Ledger::new(store);
        Self {
            deposits: DepositWorkflow::new(ledger.clone(), gateway, metrics.clone()),
            transfers: TransferWorkflow::new(ledger.clone(), metrics.clone()),
            queries: QueryWorkflow::new(ledger.clone(), settings),
            ledger,
            metrics,
        }
    }

    /// Ledger handle shared by the workflows
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Workflow counters
    pub fn metrics(&self) -> &WalletMetrics {
        &self.metrics
    }

    /// Wallet of `user_id`, opened on first call
    pub async fn create_wallet(&self, user_id: Uuid) -> Result<Wallet> {
        Ok(self.ledger.get_or_create_wallet(user_id).await?)
    }

    /// See [`DepositWorkflow::initialize_deposit`]
    pub async fn initialize_deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        email: &str,
    ) -> Result<DepositInit> {
        self.deposits.initialize_deposit(user_id, amount, email).await
    }

    /// Reconcile a deposit whose webhook signature was already checked
    pub async fn reconcile_webhook(&self, reference: &str, gateway_status: &str) -> Result<Transaction> {
        self.deposits.reconcile_webhook(reference, gateway_status).await
    }

    /// Verify, parse and reconcile a raw webhook delivery
    pub async fn handle_webhook(&self, signature: &str, raw_body: &[u8]) -> Result<WebhookOutcome> {
        self.deposits.handle_webhook(signature, raw_body).await
    }

    /// Payment status of a deposit; never credits
    pub async fn verify_transaction(&self, reference: &str) -> Result<Verification> {
        self.deposits.verify_transaction(reference).await
    }

    /// See [`TransferWorkflow::transfer`]
    pub async fn transfer(
        &self,
        sender_user_id: Uuid,
        recipient_wallet_number: &str,
        amount: Decimal,
    ) -> Result<Transaction> {
        self.transfers
            .transfer(sender_user_id, recipient_wallet_number, amount)
            .await
    }

    /// Balance of the wallet owned by `user_id`
    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceView> {
        self.queries.get_balance(user_id).await
    }

    /// Transaction recorded under `reference`
    pub async fn get_transaction_by_reference(&self, reference: &str) -> Result<Transaction> {
        self.queries.get_transaction_by_reference(reference).await
    }

    /// History page; `None` means the first page at the default size
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        request: Option<PageRequest>,
    ) -> Result<Page<Transaction>> {
        let request = request.unwrap_or_else(|| self.queries.default_page());
        self.queries.list_transactions(user_id, request).await
    }
}
