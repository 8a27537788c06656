use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;
use upg_common::MicroUsdt;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType},
    traits::PaymentGatewayError,
};

/// Inserts a new `Pending` order with its computed total charge. This is not atomic on its own; embed the call in a
/// transaction together with the suffix lease acquisition and pass `&mut *tx` as the connection argument.
pub async fn insert_order(
    order: NewOrder,
    suffix: u16,
    total_amount: MicroUsdt,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, PaymentGatewayError> {
    if fetch_order_by_order_id(&order.order_id, &mut *conn).await?.is_some() {
        return Err(PaymentGatewayError::OrderAlreadyExists(order.order_id));
    }
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                account_id,
                order_type,
                base_amount,
                suffix,
                total_amount,
                payload,
                expires_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.account_id)
    .bind(order.order_type)
    .bind(order.base_amount)
    .bind(i64::from(suffix))
    .bind(total_amount)
    .bind(order.payload)
    .bind(expires_at)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Order [{}] inserted with id {}, charging {}", order.order_id, order.id, order.total_amount);
    Ok(order)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Resolves the pending order whose total charge equals `amount` exactly.
///
/// Suffix uniqueness among active leases guarantees at most one pending order per total, so this lookup is
/// unambiguous. Uses the `(status, total_amount)` index.
pub async fn fetch_pending_order_by_amount(
    amount: MicroUsdt,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE status = 'Pending' AND total_amount = $1 LIMIT 1")
        .bind(amount)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Atomically transitions the order to `Paid`, but only if it is still `Pending`.
///
/// Returns `None` when the order was not `Pending` any more — the caller lost the race (or replayed) and must treat
/// the order's current state as authoritative.
pub async fn mark_paid(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let now = Utc::now();
    let order: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Paid', paid_at = $1, updated_at = $1 WHERE order_id = $2 AND status = 'Pending' \
         RETURNING *",
    )
    .bind(now)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    if let Some(o) = &order {
        trace!("📝️ Order [{}] marked as paid", o.order_id);
    }
    Ok(order)
}

/// Atomically transitions the order to a terminal status, but only from one of the `allowed_from` statuses.
/// Every terminal transition stamps `terminal_at`. Returns `None` if the order was in none of the allowed states.
pub async fn mark_terminal(
    order_id: &OrderId,
    new_status: OrderStatusType,
    allowed_from: &[OrderStatusType],
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let from_clause = allowed_from.iter().map(|s| format!("'{s}'")).collect::<Vec<_>>().join(",");
    let now = Utc::now();
    let order: Option<Order> = sqlx::query_as(
        format!(
            "UPDATE orders SET status = $1, terminal_at = $2, updated_at = $2 WHERE order_id = $3 AND status IN \
             ({from_clause}) RETURNING *"
        )
        .as_str(),
    )
    .bind(new_status)
    .bind(now)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Expires every pending order whose expiry has passed. The status check and the update are a single statement, so
/// an order settled by a concurrent callback is left untouched.
pub async fn expire_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PaymentGatewayError> {
    let rows: Vec<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Expired', terminal_at = $1, updated_at = $1 WHERE status = 'Pending' AND \
         expires_at < $1 RETURNING *",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}
