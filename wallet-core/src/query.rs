//! Read-only views: balance, single transaction, paged history

use crate::config::WalletConfig;
use crate::error::{Result, WalletError};
use crate::ledger::Ledger;
use crate::money::Money;
use crate::types::{Transaction, WalletNumber};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Requested page of history, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u32,
    /// Items per page
    pub page_size: u32,
}

impl PageRequest {
    /// Page `page` of `page_size` items
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// First page at `page_size`
    pub fn first(page_size: u32) -> Self {
        Self { page: 1, page_size }
    }

    /// `InvalidPagination` unless `page >= 1` and `1 <= page_size <= max_page_size`
    pub fn validate(&self, max_page_size: u32) -> Result<()> {
        if self.page < 1 {
            return Err(WalletError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }
        if self.page_size < 1 || self.page_size > max_page_size {
            return Err(WalletError::InvalidPagination(format!(
                "page_size must be between 1 and {}",
                max_page_size
            )));
        }
        Ok(())
    }

    /// Rows to skip before this page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// One page of results with pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Items across all pages
    pub total: u64,
    /// Page number, starting at 1
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// `ceil(total / page_size)`
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Wrap `items` with metadata for `request`
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let page_size = u64::from(request.page_size.max(1));
        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages: (total + page_size - 1) / page_size,
        }
    }
}

/// Balance as reported to the owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    /// Committed balance
    pub balance: Money,
    /// Wallet number
    pub wallet_number: WalletNumber,
    /// Owner
    pub user_id: Uuid,
    /// Currency code from configuration
    pub currency: String,
}

/// Read-only queries over the ledger
pub struct QueryWorkflow {
    ledger: Ledger,
    settings: WalletConfig,
}

impl QueryWorkflow {
    /// Queries over `ledger` using the page sizes in `settings`
    pub fn new(ledger: Ledger, settings: WalletConfig) -> Self {
        Self { ledger, settings }
    }

    /// Page size used when a caller does not pick one
    pub fn default_page(&self) -> PageRequest {
        PageRequest::first(self.settings.default_page_size)
    }

    /// Balance of the wallet owned by `user_id`; never opens a wallet
    pub async fn get_balance(&self, user_id: Uuid) -> Result<BalanceView> {
        let wallet = self
            .ledger
            .get_wallet_by_user(user_id)
            .await?
            .ok_or_else(|| WalletError::WalletNotFound(format!("user {}", user_id)))?;

        Ok(BalanceView {
            balance: wallet.balance,
            wallet_number: wallet.wallet_number,
            user_id: wallet.user_id,
            currency: self.settings.currency.clone(),
        })
    }

    /// Transaction recorded under `reference`
    pub async fn get_transaction_by_reference(&self, reference: &str) -> Result<Transaction> {
        self.ledger
            .get_transaction_by_reference(reference)
            .await?
            .ok_or_else(|| WalletError::TransactionNotFound(reference.to_string()))
    }

    /// Newest-first history of `user_id`
    pub async fn list_transactions(
        &self,
        user_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<Transaction>> {
        request.validate(self.settings.max_page_size)?;

        let (items, total) = self
            .ledger
            .list_transactions(user_id, request.offset(), u64::from(request.page_size))
            .await?;

        Ok(Page::new(items, total, request))
    }
}
