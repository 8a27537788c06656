//! `SqliteDatabase` is a concrete implementation of a payment gateway backend.
//!
//! Unsurprisingly, it uses SQLite and implements all the traits defined in the [`crate::traits`] module. Every
//! money-state operation runs inside a single SQLite transaction, and every state transition is a conditional
//! single-row statement, which is what gives the engine its exactly-one-winner race semantics.
use std::fmt::Debug;

use chrono::{Duration, Utc};
use log::*;
use sqlx::SqlitePool;
use upg_common::MicroUsdt;

use super::db::{balances, leases, new_pool, orders, settlements};
use crate::{
    db_types::{
        AccountBalance,
        LedgerEntry,
        NewOrder,
        NewSettlement,
        Order,
        OrderId,
        OrderStatusType,
        OrderType,
        SettlementOutcome,
        SuffixLease,
    },
    traits::{
        CreditResult,
        ExpiryResult,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        SuffixLeaseStore,
        SuffixPoolConfig,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
    suffix_pool: SuffixPoolConfig,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(
        url: &str,
        max_connections: u32,
        suffix_pool: SuffixPoolConfig,
    ) -> Result<Self, PaymentGatewayError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool, suffix_pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn suffix_pool_config(&self) -> &SuffixPoolConfig {
        &self.suffix_pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn create_order(
        &self,
        order: NewOrder,
        expiry: Duration,
        lease_ttl: Duration,
    ) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let suffix = match leases::acquire(&order.order_id, &self.suffix_pool, lease_ttl, &mut tx).await? {
            Some(s) => s,
            None => {
                // Nothing to roll back; dropping the transaction discards the scan.
                return Err(PaymentGatewayError::SuffixPoolExhausted);
            },
        };
        let total = MicroUsdt::compose(order.base_amount, suffix)?;
        let expires_at = Utc::now() + expiry;
        let order = orders::insert_order(order, suffix, total, expires_at, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{}] created: {} + suffix {} = {}", order.order_id, order.base_amount, suffix, total);
        Ok(order)
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn process_settlement(&self, settlement: NewSettlement) -> Result<SettlementOutcome, PaymentGatewayError> {
        let txid = settlement.tx_reference.clone();
        let mut tx = self.pool.begin().await?;
        if let Some(record) = settlements::idempotent_insert(&settlement, &mut tx).await? {
            tx.commit().await?;
            debug!("🗃️ Transfer [{txid}] was already processed ({}). Returning the recorded outcome.", record.outcome);
            return Ok(SettlementOutcome::AlreadySettled { record });
        }
        let order = match orders::fetch_pending_order_by_amount(settlement.amount, &mut tx).await? {
            Some(order) => order,
            None => {
                tx.commit().await?;
                info!("🗃️ Transfer [{txid}] of {} matches no pending order. Recorded as unmatched.", settlement.amount);
                return Ok(SettlementOutcome::Unmatched);
            },
        };
        if let Some(hint) = &settlement.order_id_hint {
            if hint != &order.order_id {
                tx.commit().await?;
                warn!(
                    "🗃️ Transfer [{txid}] claims order {hint} but the amount {} resolves to order {}. Recorded as \
                     unmatched for manual reconciliation.",
                    settlement.amount, order.order_id
                );
                return Ok(SettlementOutcome::Unmatched);
            }
        }
        // The row is locked by this transaction and was Pending when fetched, so the conditional update can only
        // fail if the fetch itself raced a concurrent settlement commit.
        let paid = orders::mark_paid(&order.order_id, &mut tx)
            .await?
            .ok_or(PaymentGatewayError::OrderModificationForbidden)?;
        leases::release(&paid.order_id, &mut tx).await?;
        if paid.order_type == OrderType::BalanceDeposit {
            balances::credit(&paid.account_id, paid.total_amount, &paid.order_id, &mut tx).await?;
        }
        settlements::record_match(&txid, &paid.order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Transfer [{txid}] settled order [{}] for {}", paid.order_id, paid.total_amount);
        Ok(SettlementOutcome::Settled { order: paid })
    }

    async fn record_delivery_success(&self, order_id: &OrderId, complete: bool) -> Result<Order, PaymentGatewayError> {
        let new_status = if complete { OrderStatusType::Delivered } else { OrderStatusType::PartialDelivery };
        let mut tx = self.pool.begin().await?;
        let order = orders::mark_terminal(order_id, new_status, &[OrderStatusType::Paid], &mut tx)
            .await?
            .ok_or(PaymentGatewayError::OrderModificationForbidden)?;
        // Usually a no-op: the lease was already released when the order was paid.
        leases::release(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] closed as {new_status}");
        Ok(order)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let allowed = [OrderStatusType::Pending, OrderStatusType::Paid];
        let order = match orders::mark_terminal(order_id, OrderStatusType::Cancelled, &allowed, &mut tx).await? {
            Some(order) => order,
            None => {
                return match orders::fetch_order_by_order_id(order_id, &mut tx).await? {
                    Some(_) => Err(PaymentGatewayError::OrderModificationForbidden),
                    None => Err(PaymentGatewayError::OrderNotFound(order_id.clone())),
                };
            },
        };
        leases::release(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order [{order_id}] cancelled");
        Ok(order)
    }

    async fn expire_old_orders(&self) -> Result<ExpiryResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let expired = orders::expire_orders(Utc::now(), &mut tx).await?;
        for order in &expired {
            leases::release(&order.order_id, &mut tx).await?;
        }
        tx.commit().await?;
        if !expired.is_empty() {
            debug!("🗃️ {} orders expired and their suffixes released", expired.len());
        }
        Ok(ExpiryResult::new(expired))
    }

    async fn prune_settlements(&self, retention: Duration) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let pruned = settlements::prune(retention, &mut conn).await?;
        Ok(pruned)
    }

    async fn credit_balance(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<CreditResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let result = balances::credit(account_id, amount, order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn debit_balance(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<AccountBalance, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let balance = balances::debit(account_id, amount, order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(balance)
    }

    async fn fetch_account_balance(&self, account_id: &str) -> Result<Option<AccountBalance>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let balance = balances::fetch_balance(account_id, &mut conn).await?;
        Ok(balance)
    }

    async fn fetch_ledger_entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let entries = balances::fetch_ledger_entries(account_id, &mut conn).await?;
        Ok(entries)
    }

    async fn reconstruct_balance(&self, account_id: &str) -> Result<MicroUsdt, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        let total = balances::reconstruct_balance(account_id, &mut conn).await?;
        Ok(total)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SuffixLeaseStore for SqliteDatabase {
    async fn acquire_suffix(&self, order_id: &OrderId, ttl: Duration) -> Result<u16, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        leases::acquire(order_id, &self.suffix_pool, ttl, &mut conn)
            .await?
            .ok_or(PaymentGatewayError::SuffixPoolExhausted)
    }

    async fn release_suffix(&self, order_id: &OrderId) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        leases::release(order_id, &mut conn).await
    }

    async fn renew_suffix(
        &self,
        order_id: &OrderId,
        additional_ttl: Duration,
    ) -> Result<SuffixLease, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let lease = leases::renew(order_id, additional_ttl, &mut tx).await?;
        tx.commit().await?;
        Ok(lease)
    }

    async fn fetch_lease(&self, order_id: &OrderId) -> Result<Option<SuffixLease>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        leases::fetch_by_order_id(order_id, &mut conn).await
    }
}
