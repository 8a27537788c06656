use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use upg_common::MicroUsdt;
use usdt_payment_engine::{
    db_types::{NewSettlement, Order, OrderId, OrderStatusType, OrderType},
    PaymentGatewayError,
};

/// The body of a new order request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub account_id: String,
    pub order_type: OrderType,
    /// The advertised price as a decimal USDT string, e.g. "10" or "10.25". At most six decimal places.
    pub amount: String,
    /// Opaque, type-specific data for the delivery integration, e.g. the recipient and duration of a premium
    /// subscription. Stored and passed through verbatim.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

/// Everything the buyer needs to pay: the shared address and the exact, suffix-disambiguated amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    pub order_id: OrderId,
    pub account_id: String,
    pub order_type: OrderType,
    /// The exact amount to transfer, rendered with the three suffix decimals, e.g. "10.047".
    pub total_amount: String,
    /// The shared TRC20 deposit address.
    pub pay_to: String,
    pub expires_at: DateTime<Utc>,
}

impl OrderCreatedResponse {
    pub fn new(order: &Order, deposit_address: &str) -> Self {
        Self {
            order_id: order.order_id.clone(),
            account_id: order.account_id.clone(),
            order_type: order.order_type,
            total_amount: order.total_amount.to_string(),
            pay_to: deposit_address.to_string(),
            expires_at: order.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub account_id: String,
    pub order_type: OrderType,
    pub base_amount: String,
    pub total_amount: String,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.order_id,
            account_id: order.account_id,
            order_type: order.order_type,
            base_amount: order.base_amount.to_string(),
            total_amount: order.total_amount.to_string(),
            status: order.status,
            created_at: order.created_at,
            expires_at: order.expires_at,
            paid_at: order.paid_at,
        }
    }
}

/// A transfer notification as posted by the chain watcher.
///
/// The watcher signs `{order_id}:{amount}:{tx_reference}` (six-decimal amount, empty order id when it has none)
/// with the shared secret and sends the result in the `x-payment-signature` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementNotification {
    /// The on-chain transaction hash.
    pub tx_reference: String,
    /// The transferred amount as a decimal USDT string, exact to the micro.
    pub amount: String,
    /// The order the watcher believes this pays for, if it knows. Matching by amount is authoritative.
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

impl TryFrom<SettlementNotification> for NewSettlement {
    type Error = PaymentGatewayError;

    fn try_from(n: SettlementNotification) -> Result<Self, Self::Error> {
        let amount = MicroUsdt::from_decimal_str(&n.amount)?;
        let mut settlement = NewSettlement::new(n.tx_reference, amount);
        if let Some(order_id) = n.order_id {
            settlement = settlement.with_order_hint(order_id);
        }
        if let Some(observed_at) = n.observed_at {
            settlement.observed_at = observed_at;
        }
        Ok(settlement)
    }
}

/// The webhook acknowledgement. The watcher treats any 2xx as "delivered, do not retry".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResponse {
    pub outcome: String,
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: String,
    pub updated_at: Option<DateTime<Utc>>,
}
