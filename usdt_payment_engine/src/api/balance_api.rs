use std::fmt::Debug;

use log::*;
use upg_common::MicroUsdt;

use crate::{
    db_types::{AccountBalance, LedgerEntry, OrderId},
    traits::{CreditResult, PaymentGatewayDatabase, PaymentGatewayError},
};

/// `BalanceApi` exposes the per-account spendable balance and its audit trail.
///
/// Credits come from settled deposit orders; debits pay for purchases made from the balance. Both are atomic at
/// the account row and every change is paired with an append-only ledger entry.
pub struct BalanceApi<B> {
    db: B,
}

impl<B> Debug for BalanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BalanceApi")
    }
}

impl<B> BalanceApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> BalanceApi<B>
where B: PaymentGatewayDatabase
{
    /// Credits the account for a settled order. Replays for the same order are no-ops.
    pub async fn credit(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<CreditResult, PaymentGatewayError> {
        let result = self.db.credit_balance(account_id, amount, order_id).await?;
        if result.applied {
            info!("💰️ Account {account_id} credited {amount} for order {order_id}");
        }
        Ok(result)
    }

    /// Spends from the account. Exactly one of two concurrent debits racing for the last funds can succeed.
    pub async fn debit(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<AccountBalance, PaymentGatewayError> {
        let balance = self.db.debit_balance(account_id, amount, order_id).await?;
        info!("💰️ Account {account_id} debited {amount} for order {order_id}. Balance: {}", balance.balance);
        Ok(balance)
    }

    pub async fn balance(&self, account_id: &str) -> Result<Option<AccountBalance>, PaymentGatewayError> {
        self.db.fetch_account_balance(account_id).await
    }

    pub async fn history(&self, account_id: &str) -> Result<Vec<LedgerEntry>, PaymentGatewayError> {
        self.db.fetch_ledger_entries(account_id).await
    }

    /// Recomputes the balance from the ledger and compares it with the stored value. Returns the reconstructed
    /// total; a mismatch is logged as an error since it indicates a bug or manual tampering.
    pub async fn audit(&self, account_id: &str) -> Result<MicroUsdt, PaymentGatewayError> {
        let reconstructed = self.db.reconstruct_balance(account_id).await?;
        if let Some(stored) = self.db.fetch_account_balance(account_id).await? {
            if stored.balance != reconstructed {
                error!(
                    "💰️ Balance mismatch for account {account_id}: stored {} but the ledger sums to {reconstructed}",
                    stored.balance
                );
            }
        }
        Ok(reconstructed)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
