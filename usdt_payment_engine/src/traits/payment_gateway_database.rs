use chrono::Duration;
use thiserror::Error;
use upg_common::{MicroUsdt, MicroUsdtConversionError};

use crate::{
    db_types::{AccountBalance, LedgerEntry, NewOrder, NewSettlement, Order, OrderId, SettlementOutcome},
    traits::{CreditResult, ExpiryResult},
};

/// This trait defines the highest level of behaviour for backends supporting the payment engine.
///
/// This behaviour includes:
/// * Creating orders together with their suffix lease, atomically.
/// * Matching incoming transfer notifications to pending orders and driving the order state machine.
/// * Maintaining per-account balances and the append-only audit ledger.
///
/// Implementations must guarantee row-level atomic check-and-update semantics for every state transition: two
/// concurrent `Pending → Paid` attempts for one order resolve with exactly one winner, and two concurrent debits
/// can never jointly overdraw an account.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// In a single atomic transaction, leases a suffix for the order, computes the total charge, and persists the
    /// order as `Pending`. If no suffix is free, nothing is persisted and
    /// [`PaymentGatewayError::SuffixPoolExhausted`] is returned.
    async fn create_order(
        &self,
        order: NewOrder,
        expiry: Duration,
        lease_ttl: Duration,
    ) -> Result<Order, PaymentGatewayError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, PaymentGatewayError>;

    /// Processes a verified transfer notification in one atomic transaction:
    /// * inserts the dedup marker for `tx_reference`; a replay returns the previously recorded outcome untouched,
    /// * resolves the pending order whose total charge equals the transfer amount exactly,
    /// * transitions it `Pending → Paid`, releases its suffix lease, and
    /// * credits the balance ledger when the order is a balance deposit.
    ///
    /// Authenticity verification is the caller's job and a hard precondition; unverified notifications must never
    /// reach this method. No downstream delivery happens here — that is dispatched by the API layer after this
    /// transaction has committed.
    async fn process_settlement(&self, settlement: NewSettlement) -> Result<SettlementOutcome, PaymentGatewayError>;

    /// Records the delivery collaborator's verdict for a paid purchase order: `Paid → Delivered` or
    /// `Paid → PartialDelivery`. A failed delivery leaves the order `Paid` for a later retry.
    async fn record_delivery_success(&self, order_id: &OrderId, complete: bool) -> Result<Order, PaymentGatewayError>;

    /// Cancels a `Pending` or `Paid` order and releases its suffix lease.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<Order, PaymentGatewayError>;

    /// Marks every `Pending` order past its expiry as `Expired` and releases the associated suffix leases.
    /// An order settled by a concurrent callback is simply not `Pending` any more and is left alone.
    async fn expire_old_orders(&self) -> Result<ExpiryResult, PaymentGatewayError>;

    /// Deletes settlement dedup markers older than `retention`. Returns the number of rows removed.
    async fn prune_settlements(&self, retention: Duration) -> Result<u64, PaymentGatewayError>;

    /// Credits `amount` to the account, appending a ledger entry in the same transaction. Idempotent per
    /// `order_id`: a second credit for the same order is a no-op that reports `applied = false`.
    async fn credit_balance(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<CreditResult, PaymentGatewayError>;

    /// Debits `amount` from the account if, and only if, the balance covers it, appending a ledger entry in the
    /// same transaction. The balance check and decrement are a single conditional update.
    async fn debit_balance(
        &self,
        account_id: &str,
        amount: MicroUsdt,
        order_id: &OrderId,
    ) -> Result<AccountBalance, PaymentGatewayError>;

    async fn fetch_account_balance(&self, account_id: &str) -> Result<Option<AccountBalance>, PaymentGatewayError>;

    async fn fetch_ledger_entries(&self, account_id: &str) -> Result<Vec<LedgerEntry>, PaymentGatewayError>;

    /// Sums the audit ledger for the account. Always equals the stored balance; used as a consistency check.
    async fn reconstruct_balance(&self, account_id: &str) -> Result<MicroUsdt, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine error (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since it already exists: {0}")]
    OrderAlreadyExists(OrderId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested order change is forbidden.")]
    OrderModificationForbidden,
    #[error("Every suffix in the pool is currently leased. Try again shortly.")]
    SuffixPoolExhausted,
    #[error("Order {0} holds no suffix lease")]
    LeaseNotFound(OrderId),
    #[error("Account {0} has insufficient balance for the requested debit")]
    InsufficientBalance(String),
    #[error("The requested account {0} does not exist")]
    AccountNotFound(String),
    #[error("Settlement notification signature is invalid.")]
    InvalidSignature,
    #[error("Invalid amount: {0}")]
    AmountError(#[from] MicroUsdtConversionError),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}
