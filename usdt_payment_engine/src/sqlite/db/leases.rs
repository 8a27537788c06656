use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use rand::seq::SliceRandom;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderId, SuffixLease},
    traits::{PaymentGatewayError, SuffixPoolConfig},
};

/// Tries to lease a free suffix for `order_id`.
///
/// A suffix is free when no lease row exists for it, or when the existing lease expired more than the grace window
/// ago. Candidates are visited in random order and claimed with a conditional upsert, so two concurrent acquires
/// can never both claim the same suffix: the second upsert's WHERE clause sees a live lease and affects no rows.
///
/// Returns `None` when every suffix in the configured range is leased.
pub async fn acquire(
    order_id: &OrderId,
    pool: &SuffixPoolConfig,
    ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<Option<u16>, PaymentGatewayError> {
    let now = Utc::now();
    let reclaim_deadline = now - pool.grace;
    let taken: Vec<i64> = sqlx::query_scalar("SELECT suffix FROM suffix_leases WHERE expires_at >= $1")
        .bind(reclaim_deadline)
        .fetch_all(&mut *conn)
        .await?;
    let mut candidates: Vec<u16> =
        (pool.min_suffix..=pool.max_suffix).filter(|s| !taken.contains(&i64::from(*s))).collect();
    if candidates.is_empty() {
        debug!("🏷️ All {} suffixes are leased; pool exhausted", pool.capacity());
        return Ok(None);
    }
    candidates.shuffle(&mut rand::thread_rng());
    for suffix in candidates {
        let claimed = try_claim(suffix, order_id, now, now + ttl, reclaim_deadline, conn).await?;
        if claimed {
            trace!("🏷️ Suffix {suffix} leased to order {order_id}");
            return Ok(Some(suffix));
        }
        // Another order claimed this suffix between the scan and our upsert. Try the next candidate.
        trace!("🏷️ Lost the race for suffix {suffix}; retrying with another candidate");
    }
    Ok(None)
}

/// A single conditional upsert: insert the lease, or take over an existing row only if its lease is reclaimable.
async fn try_claim(
    suffix: u16,
    order_id: &OrderId,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    reclaim_deadline: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let result = sqlx::query(
        r#"
        INSERT INTO suffix_leases (suffix, order_id, leased_at, expires_at) VALUES ($1, $2, $3, $4)
        ON CONFLICT (suffix) DO UPDATE
            SET order_id = excluded.order_id, leased_at = excluded.leased_at, expires_at = excluded.expires_at
            WHERE suffix_leases.expires_at < $5
        "#,
    )
    .bind(i64::from(suffix))
    .bind(order_id.as_str())
    .bind(now)
    .bind(expires_at)
    .bind(reclaim_deadline)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Removes the lease held by `order_id`, if any. Returns whether a row was deleted.
pub async fn release(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<bool, PaymentGatewayError> {
    let result = sqlx::query("DELETE FROM suffix_leases WHERE order_id = $1")
        .bind(order_id.as_str())
        .execute(conn)
        .await?;
    let released = result.rows_affected() > 0;
    if released {
        trace!("🏷️ Lease for order {order_id} released");
    }
    Ok(released)
}

/// Pushes the expiry of the order's lease forward by `additional_ttl`.
pub async fn renew(
    order_id: &OrderId,
    additional_ttl: Duration,
    conn: &mut SqliteConnection,
) -> Result<SuffixLease, PaymentGatewayError> {
    let lease = fetch_by_order_id(order_id, &mut *conn)
        .await?
        .ok_or_else(|| PaymentGatewayError::LeaseNotFound(order_id.clone()))?;
    let new_expiry = lease.expires_at + additional_ttl;
    let renewed = sqlx::query_as(
        "UPDATE suffix_leases SET expires_at = $1 WHERE order_id = $2 RETURNING *",
    )
    .bind(new_expiry)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PaymentGatewayError::LeaseNotFound(order_id.clone()))?;
    Ok(renewed)
}

pub async fn fetch_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<SuffixLease>, PaymentGatewayError> {
    let lease = sqlx::query_as("SELECT * FROM suffix_leases WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(lease)
}
