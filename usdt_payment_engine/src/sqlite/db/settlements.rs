use chrono::{Duration, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewSettlement, OrderId, SettlementRecord, SettlementStatus},
    traits::PaymentGatewayError,
};

/// Claims the dedup slot for this transfer.
///
/// Inserts the marker as `Unmatched` (the caller upgrades it once the order is resolved, inside the same
/// transaction). If the `tx_reference` was already processed, returns the existing record instead — that is the
/// idempotent-replay signal, and nothing else may be applied for this notification.
pub async fn idempotent_insert(
    settlement: &NewSettlement,
    conn: &mut SqliteConnection,
) -> Result<Option<SettlementRecord>, PaymentGatewayError> {
    let inserted = sqlx::query(
        "INSERT INTO settlements (tx_reference, amount, outcome, observed_at) VALUES ($1, $2, 'Unmatched', $3) ON \
         CONFLICT (tx_reference) DO NOTHING",
    )
    .bind(settlement.tx_reference.as_str())
    .bind(settlement.amount)
    .bind(settlement.observed_at)
    .execute(&mut *conn)
    .await?
    .rows_affected();
    if inserted == 1 {
        trace!("🧾️ Dedup marker recorded for transfer [{}]", settlement.tx_reference);
        return Ok(None);
    }
    let existing = fetch(&settlement.tx_reference, conn).await?.ok_or_else(|| {
        PaymentGatewayError::DatabaseError(format!(
            "Settlement {} exists but could not be fetched",
            settlement.tx_reference
        ))
    })?;
    Ok(Some(existing))
}

/// Upgrades the dedup marker with the resolved order once the transfer has been matched.
pub async fn record_match(
    tx_reference: &str,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<(), PaymentGatewayError> {
    sqlx::query("UPDATE settlements SET order_id = $1, outcome = $2 WHERE tx_reference = $3")
        .bind(order_id.as_str())
        .bind(SettlementStatus::Settled)
        .bind(tx_reference)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch(
    tx_reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<SettlementRecord>, PaymentGatewayError> {
    let record = sqlx::query_as("SELECT * FROM settlements WHERE tx_reference = $1")
        .bind(tx_reference)
        .fetch_optional(conn)
        .await?;
    Ok(record)
}

/// Drops dedup markers older than the retention window. The watcher never replays transfers that old, so keeping
/// them would only grow the table without bound.
pub async fn prune(retention: Duration, conn: &mut SqliteConnection) -> Result<u64, PaymentGatewayError> {
    let cutoff = Utc::now() - retention;
    let result = sqlx::query("DELETE FROM settlements WHERE observed_at < $1").bind(cutoff).execute(conn).await?;
    Ok(result.rows_affected())
}
