use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use upg_common::MicroUsdt;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

//--------------------------------------        OrderId        -------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct OrderId(pub String);

impl OrderId {
    /// Generates a fresh, globally unique order id.
    pub fn random() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OrderId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//--------------------------------------      OrderType        -------------------------------------------------------
/// The closed set of order types the gateway understands.
///
/// Unknown type strings are a construction-time error ([`ConversionError`]), never a runtime dispatch surprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    PremiumPurchase,
    BalanceDeposit,
    EnergyPurchase,
}

impl OrderType {
    /// Purchase types are fulfilled by an external delivery collaborator after payment. Deposits are credited to the
    /// balance ledger directly and never dispatched.
    pub fn is_purchase(&self) -> bool {
        !matches!(self, OrderType::BalanceDeposit)
    }

    pub const PURCHASE_TYPES: [OrderType; 2] = [OrderType::PremiumPurchase, OrderType::EnergyPurchase];
}

impl Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::PremiumPurchase => write!(f, "premium_purchase"),
            OrderType::BalanceDeposit => write!(f, "balance_deposit"),
            OrderType::EnergyPurchase => write!(f, "energy_purchase"),
        }
    }
}

impl FromStr for OrderType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium_purchase" => Ok(Self::PremiumPurchase),
            "balance_deposit" => Ok(Self::BalanceDeposit),
            "energy_purchase" => Ok(Self::EnergyPurchase),
            s => Err(ConversionError(format!("Unknown order type: {s}"))),
        }
    }
}

//--------------------------------------   OrderStatusType     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created and no transfer has been matched against it.
    Pending,
    /// A transfer settled the order in full. Delivery (for purchase types) may still be outstanding.
    Paid,
    /// Downstream delivery completed successfully.
    Delivered,
    /// Downstream delivery completed, but only partially. Requires manual follow-up.
    PartialDelivery,
    /// The order expired before any transfer was matched.
    Expired,
    /// The order was cancelled by the user or an admin.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::PartialDelivery | Self::Expired | Self::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Paid => write!(f, "Paid"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
            OrderStatusType::PartialDelivery => write!(f, "PartialDelivery"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Paid" => Ok(Self::Paid),
            "Delivered" => Ok(Self::Delivered),
            "PartialDelivery" => Ok(Self::PartialDelivery),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------        Order        ---------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: i64,
    pub order_id: OrderId,
    pub account_id: String,
    pub order_type: OrderType,
    pub base_amount: MicroUsdt,
    /// The leased three-digit disambiguator. Always in 1..=999.
    pub suffix: i64,
    /// `base_amount + suffix × 1000`, exactly. This is what the buyer must transfer.
    pub total_amount: MicroUsdt,
    /// Type-specific payload, opaque to the engine. Passed through to the delivery collaborator.
    pub payload: Option<String>,
    pub status: OrderStatusType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub terminal_at: Option<DateTime<Utc>>,
}

//--------------------------------------       NewOrder        -------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub account_id: String,
    pub order_type: OrderType,
    /// The advertised price, before the disambiguating suffix is added.
    pub base_amount: MicroUsdt,
    pub payload: Option<String>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(account_id: S, order_type: OrderType, base_amount: MicroUsdt) -> Self {
        Self { order_id: OrderId::random(), account_id: account_id.into(), order_type, base_amount, payload: None }
    }

    pub fn with_payload<S: Into<String>>(mut self, payload: S) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

//--------------------------------------     SuffixLease       -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct SuffixLease {
    pub suffix: i64,
    pub order_id: OrderId,
    pub leased_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

//--------------------------------------    AccountBalance     -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct AccountBalance {
    pub account_id: String,
    pub balance: MicroUsdt,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     LedgerReason      -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum LedgerReason {
    Deposit,
    Debit,
}

impl Display for LedgerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerReason::Deposit => write!(f, "Deposit"),
            LedgerReason::Debit => write!(f, "Debit"),
        }
    }
}

impl FromStr for LedgerReason {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Deposit" => Ok(Self::Deposit),
            "Debit" => Ok(Self::Debit),
            s => Err(ConversionError(format!("Invalid ledger reason: {s}"))),
        }
    }
}

//--------------------------------------     LedgerEntry       -------------------------------------------------------
/// One immutable row of the audit trail. Summing `delta` over an account reconstructs its balance exactly.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerEntry {
    pub id: i64,
    pub account_id: String,
    pub delta: MicroUsdt,
    pub reason: LedgerReason,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------    NewSettlement      -------------------------------------------------------
/// An incoming transfer notification from the external chain watcher, after amount parsing.
#[derive(Debug, Clone)]
pub struct NewSettlement {
    /// The transaction hash on chain. Unique per real-world transfer; keys the dedup store.
    pub tx_reference: String,
    pub amount: MicroUsdt,
    /// The order id the watcher believes this transfer settles. A hint only; amount matching is authoritative,
    /// and a conflicting hint makes the transfer unmatched.
    pub order_id_hint: Option<OrderId>,
    pub observed_at: DateTime<Utc>,
}

impl NewSettlement {
    pub fn new<S: Into<String>>(tx_reference: S, amount: MicroUsdt) -> Self {
        Self { tx_reference: tx_reference.into(), amount, order_id_hint: None, observed_at: Utc::now() }
    }

    pub fn with_order_hint(mut self, order_id: OrderId) -> Self {
        self.order_id_hint = Some(order_id);
        self
    }
}

//--------------------------------------   SettlementStatus    -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum SettlementStatus {
    Settled,
    Unmatched,
}

impl Display for SettlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementStatus::Settled => write!(f, "Settled"),
            SettlementStatus::Unmatched => write!(f, "Unmatched"),
        }
    }
}

//--------------------------------------   SettlementRecord    -------------------------------------------------------
/// The durable dedup marker for a processed transfer, including the outcome that was recorded for it.
/// Replaying the same `tx_reference` returns this record instead of re-applying any effects.
#[derive(Debug, Clone, FromRow)]
pub struct SettlementRecord {
    pub tx_reference: String,
    pub amount: MicroUsdt,
    pub order_id: Option<OrderId>,
    pub outcome: SettlementStatus,
    pub observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------  SettlementOutcome    -------------------------------------------------------
/// What became of a transfer notification.
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    /// The transfer matched a pending order, which is now paid.
    Settled { order: Order },
    /// This `tx_reference` was already processed; the previously recorded result is returned unchanged.
    AlreadySettled { record: SettlementRecord },
    /// No pending order charges exactly this amount. Recorded for manual reconciliation.
    Unmatched,
}

impl SettlementOutcome {
    pub fn matched_order_id(&self) -> Option<&OrderId> {
        match self {
            SettlementOutcome::Settled { order } => Some(&order.order_id),
            SettlementOutcome::AlreadySettled { record } => record.order_id.as_ref(),
            SettlementOutcome::Unmatched => None,
        }
    }
}
