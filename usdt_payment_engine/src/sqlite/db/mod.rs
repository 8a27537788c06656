//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or create an atomic transaction
//! as the need arises and call through to the functions without any other changes.
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::traits::PaymentGatewayError;

pub mod balances;
pub mod leases;
pub mod orders;
pub mod settlements;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, PaymentGatewayError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| PaymentGatewayError::DatabaseError(e.to_string()))?;
    Ok(pool)
}
