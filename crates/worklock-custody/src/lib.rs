//! Worklock Custody - fund transfer layer
//!
//! Custody never decides anything: it executes transfers the ledger has
//! already committed to, and it is only ever invoked from inside a ledger
//! commit. At most one terminal transfer exists per job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;
use worklock_types::{AccountId, Amount, ReceiptId, Result, WorklockError};

/// Receipt for an executed transfer
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub id: ReceiptId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Amount,
    pub executed_at: DateTime<Utc>,
}

/// Fund transfer layer consumed by the escrow ledger
#[async_trait]
pub trait FundCustody: Send + Sync {
    /// Move funds between accounts. Atomic: either both balances move or
    /// neither does.
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt>;

    /// Current balance of an account
    async fn balance_of(&self, account: &AccountId) -> Amount;
}

/// In-memory custody backend
pub struct InMemoryCustody {
    balances: Arc<RwLock<HashMap<AccountId, Amount>>>,
    receipts: Arc<RwLock<HashMap<ReceiptId, TransferReceipt>>>,
}

impl InMemoryCustody {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            receipts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seed an account balance (test and bootstrap use)
    pub async fn set_balance(&self, account: AccountId, balance: Amount) {
        self.balances.write().await.insert(account, balance);
    }

    /// Look up a receipt by ID
    pub async fn receipt(&self, id: &ReceiptId) -> Option<TransferReceipt> {
        self.receipts.read().await.get(id).cloned()
    }

    /// Total number of executed transfers
    pub async fn transfer_count(&self) -> usize {
        self.receipts.read().await.len()
    }
}

impl Default for InMemoryCustody {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FundCustody for InMemoryCustody {
    async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt> {
        let mut balances = self.balances.write().await;

        let from_balance = balances.get(from).copied().unwrap_or_default();
        if from_balance < amount {
            return Err(WorklockError::InsufficientFunds {
                account: from.to_string(),
                requested: amount.0,
                available: from_balance.0,
            });
        }

        let debited = from_balance.checked_sub(amount)?;
        let credited = balances
            .get(to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)?;
        balances.insert(*from, debited);
        balances.insert(*to, credited);

        let receipt = TransferReceipt {
            id: ReceiptId::new(),
            from: *from,
            to: *to,
            amount,
            executed_at: Utc::now(),
        };
        self.receipts
            .write()
            .await
            .insert(receipt.id, receipt.clone());

        info!(from = %from, to = %to, %amount, receipt = %receipt.id, "Transfer executed");
        Ok(receipt)
    }

    async fn balance_of(&self, account: &AccountId) -> Amount {
        self.balances
            .read()
            .await
            .get(account)
            .copied()
            .unwrap_or_default()
    }
}
