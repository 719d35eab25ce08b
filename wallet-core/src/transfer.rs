//! Wallet-to-wallet transfers

use crate::error::{Result, StoreError, WalletError};
use crate::ledger::Ledger;
use crate::metrics::WalletMetrics;
use crate::money::Money;
use crate::store::{MutationOutcome, TransactionChange, WalletUpdate};
use crate::types::{NewTransaction, Transaction, TransactionKind, TransactionStatus};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Atomic wallet-to-wallet transfers
pub struct TransferWorkflow {
    ledger: Ledger,
    metrics: WalletMetrics,
}

impl TransferWorkflow {
    /// Transfers over `ledger`
    pub fn new(ledger: Ledger, metrics: WalletMetrics) -> Self {
        Self { ledger, metrics }
    }

    /// Move `amount` from the sender's wallet to the wallet numbered
    /// `recipient_wallet_number`.
    ///
    /// The balance check here only fails fast; the debit is re-checked
    /// against the locked balance when the transfer commits.
    pub async fn transfer(
        &self,
        sender_user_id: Uuid,
        recipient_wallet_number: &str,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = Money::positive(amount)?;

        let sender = self
            .ledger
            .get_wallet_by_user(sender_user_id)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("user {}", sender_user_id)))?;

        let recipient = self
            .ledger
            .get_wallet_by_number(recipient_wallet_number)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(recipient_wallet_number.to_string()))?;

        if sender.id == recipient.id {
            self.metrics.transfers_rejected.inc();
            warn!(wallet_number = %sender.wallet_number, "Rejected self transfer");
            return Err(WalletError::SelfTransfer);
        }

        if sender.balance < amount {
            self.metrics.transfers_rejected.inc();
            warn!(
                wallet_number = %sender.wallet_number,
                amount = %amount,
                balance = %sender.balance,
                "Rejected transfer: insufficient balance"
            );
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: sender.balance,
            });
        }

        let reference = self
            .ledger
            .allocate_reference(TransactionKind::Transfer)
            .await?;

        let record = NewTransaction {
            reference: reference.clone(),
            user_id: sender.user_id,
            wallet_id: sender.id,
            kind: TransactionKind::Transfer,
            amount,
            status: TransactionStatus::Success,
            gateway_reference: None,
            payment_url: None,
            sender_wallet_number: Some(sender.wallet_number.clone()),
            recipient_wallet_number: Some(recipient.wallet_number.clone()),
            description: Some(format!("Transfer to {}", recipient.wallet_number)),
            metadata: None,
        };

        let outcome = self
            .ledger
            .mutate_balances(
                vec![
                    WalletUpdate::debit(sender.id, amount),
                    WalletUpdate::credit(recipient.id, amount),
                ],
                TransactionChange::Insert(record),
            )
            .await;

        match outcome {
            Ok(MutationOutcome::Applied { transaction, .. }) => {
                self.metrics.transfers.inc();
                info!(
                    reference = %transaction.reference,
                    from = %sender.wallet_number,
                    to = %recipient.wallet_number,
                    amount = %amount,
                    "Transfer committed"
                );
                Ok(transaction)
            }
            Ok(MutationOutcome::Unchanged(_)) => Err(WalletError::Storage(StoreError::Corrupt(
                format!("transfer {} reported as unchanged", reference),
            ))),
            Err(e @ StoreError::InsufficientBalance { .. }) => {
                self.metrics.transfers_rejected.inc();
                warn!(
                    reference = %reference,
                    wallet_number = %sender.wallet_number,
                    "Transfer lost balance race"
                );
                Err(e.into())
            }
            Err(e) => {
                error!(reference = %reference, error = %e, "Transfer failed");
                Err(e.into())
            }
        }
    }
}
