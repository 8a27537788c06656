//! USDT Payment Engine
//!
//! Many independent buyers pay into one shared deposit address, and the chain gives us no per-payer reference
//! field. This engine solves the resulting disambiguation problem: every pending order leases a unique
//! three-decimal amount suffix, so the exact transferred amount identifies the order. The engine owns the suffix
//! lease pool, the order lifecycle state machine, settlement matching, and the per-account balance ledger.
//!
//! The library is divided into two main sections:
//! 1. Database management and control. SQLite is the supported backend. You should never need to access the
//!    database directly; use the public APIs instead. The exception is the data types used in the database, which
//!    are defined in the [`db_types`] module and are public.
//! 2. The engine public API: [`OrderFlowApi`] for order creation and settlement, [`BalanceApi`] for the spendable
//!    balance and its audit trail. Backends implement the traits in [`traits`] to plug in.
//!
//! Settlement notifications are authenticated (HMAC, see [`helpers`]), deduplicated by transaction reference, and
//! idempotent: replaying one changes nothing and returns the recorded outcome. Paid purchase orders are handed to
//! the delivery handlers registered in a [`delivery::DeliveryRegistry`], strictly after the payment transaction
//! has committed.
mod api;

pub mod db_types;
pub mod delivery;
pub mod helpers;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{BalanceApi, OrderFlowApi, OrderPolicy};
pub use traits::{PaymentGatewayDatabase, PaymentGatewayError, SuffixLeaseStore, SuffixPoolConfig};
