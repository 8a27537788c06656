use std::fmt::Debug;

use chrono::Duration;
use log::*;
use upg_common::Secret;

use crate::{
    db_types::{NewOrder, NewSettlement, Order, OrderId, SettlementOutcome, SuffixLease},
    delivery::{DeliveryRegistry, DeliveryResult},
    helpers::{signature_message, CallbackSignature},
    traits::{ExpiryResult, PaymentGatewayDatabase, PaymentGatewayError, SuffixLeaseStore},
};

/// Timing policy for the order flow. All values come from server configuration; nothing is hard-coded.
#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    /// How long a pending order waits for its transfer before the reaper expires it.
    pub order_expiry: Duration,
    /// How long a suffix lease lives. Kept slightly longer than the order expiry so the lease never lapses under a
    /// still-pending order.
    pub lease_ttl: Duration,
    /// How long settlement dedup markers are retained before pruning.
    pub settlement_retention: Duration,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            order_expiry: Duration::minutes(30),
            lease_ttl: Duration::minutes(35),
            settlement_retention: Duration::days(7),
        }
    }
}

/// `OrderFlowApi` is the primary API for creating orders and settling incoming transfers against them.
pub struct OrderFlowApi<B> {
    db: B,
    policy: OrderPolicy,
    deliveries: DeliveryRegistry,
    webhook_secret: Secret<String>,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, policy: OrderPolicy, deliveries: DeliveryRegistry, webhook_secret: Secret<String>) -> Self {
        Self { db, policy, deliveries, webhook_secret }
    }
}

impl<B> OrderFlowApi<B>
where B: PaymentGatewayDatabase + SuffixLeaseStore
{
    /// Submit a new order.
    ///
    /// A suffix lease is acquired and the order persisted in one atomic step; if the pool is exhausted, nothing is
    /// persisted and the caller gets a retryable [`PaymentGatewayError::SuffixPoolExhausted`]. On success the
    /// returned order carries the exact total the buyer must transfer.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        if order.base_amount.value() <= 0 {
            return Err(PaymentGatewayError::ValidationError(format!(
                "Order base amount must be positive, got {}",
                order.base_amount
            )));
        }
        let order = self.db.create_order(order, self.policy.order_expiry, self.policy.lease_ttl).await?;
        debug!(
            "🔄️📦️ Order [{}] created for account {}. Total charge {} expires at {}",
            order.order_id, order.account_id, order.total_amount, order.expires_at
        );
        Ok(order)
    }

    /// Handle an incoming transfer notification, start to finish.
    ///
    /// The steps, each a hard precondition for the next:
    /// 1. the signature is verified against the shared watcher secret;
    /// 2. the backend deduplicates, matches, transitions `Pending → Paid`, releases the lease and credits deposits,
    ///    all in one committed transaction;
    /// 3. only then, purchase orders are dispatched to their delivery handler. A failing handler leaves the order
    ///    `Paid` — the money has been received, and delivery is retried by the operator's retry policy.
    pub async fn process_settlement(
        &self,
        settlement: NewSettlement,
        signature: &CallbackSignature,
    ) -> Result<SettlementOutcome, PaymentGatewayError> {
        let message = signature_message(settlement.order_id_hint.as_ref(), settlement.amount, &settlement.tx_reference);
        if !signature.is_valid(&message, &self.webhook_secret) {
            warn!(
                "🔄️💰️ Transfer [{}] carried an invalid signature. Rejecting without processing. This may be a \
                 forgery attempt.",
                settlement.tx_reference
            );
            return Err(PaymentGatewayError::InvalidSignature);
        }
        let txid = settlement.tx_reference.clone();
        let outcome = self.db.process_settlement(settlement).await?;
        trace!("🔄️💰️ Transfer [{txid}] processed.");
        if let SettlementOutcome::Settled { order } = &outcome {
            if order.order_type.is_purchase() {
                self.dispatch_delivery(order.clone()).await?;
            }
        }
        Ok(outcome)
    }

    /// Dispatches a paid purchase order to its registered delivery handler and records the verdict.
    ///
    /// Called with no transaction or lock held: the payment is already committed, so a slow collaborator cannot
    /// stall settlement processing for other orders.
    async fn dispatch_delivery(&self, order: Order) -> Result<(), PaymentGatewayError> {
        let order_id = order.order_id.clone();
        let handler = match self.deliveries.handler_for(order.order_type) {
            Some(h) => h,
            None => {
                // Unreachable when the registry was built through the builder, which checks the closed type set.
                error!("🔄️🚚️ No delivery handler for order type {}. Order [{order_id}] stays Paid.", order.order_type);
                return Ok(());
            },
        };
        debug!("🔄️🚚️ Dispatching order [{order_id}] ({}) for delivery", order.order_type);
        let result = (handler)(order).await;
        match &result {
            DeliveryResult::Delivered => {
                self.db.record_delivery_success(&order_id, true).await?;
                info!("🔄️🚚️ Order [{order_id}] delivered in full");
            },
            DeliveryResult::Partial(reason) => {
                self.db.record_delivery_success(&order_id, false).await?;
                warn!("🔄️🚚️ Order [{order_id}] only partially delivered: {reason}. Manual follow-up needed.");
            },
            DeliveryResult::Failed(reason) => {
                warn!(
                    "🔄️🚚️ Delivery for order [{order_id}] failed: {reason}. The order stays Paid and delivery will \
                     be retried."
                );
            },
        }
        Ok(())
    }

    /// Retries delivery for a paid purchase order whose earlier dispatch failed.
    pub async fn retry_delivery(&self, order_id: &OrderId) -> Result<(), PaymentGatewayError> {
        let order = self
            .db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_id.clone()))?;
        if order.status != crate::db_types::OrderStatusType::Paid || !order.order_type.is_purchase() {
            return Err(PaymentGatewayError::OrderModificationForbidden);
        }
        self.dispatch_delivery(order).await
    }

    /// Cancels a pending (or paid-but-undelivered) order and frees its suffix.
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError> {
        let order = self.db.cancel_order(order_id).await?;
        info!("🔄️📦️ Order [{order_id}] cancelled by request");
        Ok(order)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    /// Extends the suffix lease for an order that needs more time, e.g. when the buyer asks for a fresh QR code.
    pub async fn renew_lease(&self, order_id: &OrderId, additional_ttl: Duration) -> Result<SuffixLease, PaymentGatewayError> {
        let lease = self.db.renew_suffix(order_id, additional_ttl).await?;
        debug!("🔄️🏷️ Lease for order [{order_id}] renewed until {}", lease.expires_at);
        Ok(lease)
    }

    /// One reaper sweep: expire overdue pending orders (releasing their suffixes) and prune old dedup markers.
    pub async fn expire_old_orders(&self) -> Result<ExpiryResult, PaymentGatewayError> {
        let result = self.db.expire_old_orders().await?;
        let pruned = self.db.prune_settlements(self.policy.settlement_retention).await?;
        if pruned > 0 {
            debug!("🔄️🕰️ Pruned {pruned} settlement markers past the retention window");
        }
        Ok(result)
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
