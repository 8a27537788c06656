//! # Storage interface contracts.
//!
//! This module defines the interfaces that database backends must implement to support the payment engine.
//!
//! ## Traits
//! * [`PaymentGatewayDatabase`] defines the highest level of behaviour: order creation, settlement processing,
//!   the order state machine, and the balance ledger. Every method that touches money state is required to be
//!   atomic at the row level, so that concurrent callers race cleanly (exactly one winner, the rest observe the
//!   already-applied state).
//! * [`SuffixLeaseStore`] is the storage contract for the suffix lease pool. It is split out so that the pool can
//!   be exercised, and substituted, independently of the rest of the gateway.

mod data_objects;
mod lease_store;
mod payment_gateway_database;

pub use data_objects::{CreditResult, ExpiryResult, SuffixPoolConfig};
pub use lease_store::SuffixLeaseStore;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
