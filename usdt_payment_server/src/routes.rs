//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
//!
//! Handlers are async and must never block the worker thread. Database access goes through the engine APIs, which
//! are stored in app data and shared across workers.
use actix_web::{get, post, web, HttpRequest, HttpResponse, Responder};
use log::*;
use usdt_payment_engine::{
    db_types::{NewOrder, NewSettlement, OrderId, SettlementOutcome},
    helpers::CallbackSignature,
    BalanceApi,
    OrderFlowApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    data_objects::{
        BalanceResponse,
        NewOrderRequest,
        OrderCreatedResponse,
        OrderResponse,
        SettlementNotification,
        SettlementResponse,
    },
    errors::ServerError,
};

/// The header carrying the watcher's HMAC over the notification fields.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// Route handler for creating a new order.
///
/// Leases a suffix, computes the exact total the buyer must transfer, and returns it together with the shared
/// deposit address. A `503` means the suffix pool is momentarily exhausted and the client should retry shortly.
#[post("/order")]
pub async fn create_order(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let req = body.into_inner();
    let amount = upg_common::MicroUsdt::from_decimal_str(&req.amount)
        .map_err(|e| ServerError::InvalidRequestBody(e.to_string()))?;
    let mut order = NewOrder::new(req.account_id, req.order_type, amount);
    if let Some(payload) = req.payload {
        order = order.with_payload(payload.to_string());
    }
    let order = api.process_new_order(order).await?;
    debug!("💻️ Created order [{}]. Buyer must transfer exactly {}", order.order_id, order.total_amount);
    let response = OrderCreatedResponse::new(&order, &config.deposit_address);
    Ok(HttpResponse::Created().json(response))
}

/// Route handler for the TRC20 settlement webhook.
///
/// The chain watcher posts every transfer into the shared deposit address here. The notification must carry a
/// valid HMAC in the [`SIGNATURE_HEADER`] header; anything else is rejected with `401` before any state is
/// touched. Replays of an already processed transaction are acknowledged as duplicates, so the watcher can retry
/// freely on timeouts.
#[post("/webhook/trc20")]
pub async fn trc20_webhook(
    request: HttpRequest,
    body: web::Json<SettlementNotification>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::InvalidSignature)?;
    let signature = CallbackSignature::new(signature).map_err(|e| {
        warn!("💻️ Settlement notification carried a malformed signature: {e}");
        ServerError::InvalidSignature
    })?;
    let settlement = NewSettlement::try_from(body.into_inner())?;
    let txid = settlement.tx_reference.clone();
    let outcome = api.process_settlement(settlement, &signature).await?;
    let response = match outcome {
        SettlementOutcome::Settled { order } => {
            info!("💻️ Transfer [{txid}] settled order [{}]", order.order_id);
            SettlementResponse { outcome: "settled".to_string(), order_id: Some(order.order_id) }
        },
        SettlementOutcome::AlreadySettled { record } => {
            debug!("💻️ Transfer [{txid}] was a replay. Acknowledging without changes.");
            SettlementResponse { outcome: "duplicate".to_string(), order_id: record.order_id }
        },
        SettlementOutcome::Unmatched => {
            warn!("💻️ Transfer [{txid}] matched no pending order. Recorded for manual reconciliation.");
            SettlementResponse { outcome: "unmatched".to_string(), order_id: None }
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

/// Route handler for fetching a single order.
#[get("/order/{order_id}")]
pub async fn order_by_id(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_id}")))?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// Route handler for cancelling a pending order. The leased suffix returns to the pool immediately.
#[post("/order/{order_id}/cancel")]
pub async fn cancel_order(
    path: web::Path<String>,
    api: web::Data<OrderFlowApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId(path.into_inner());
    let order = api.cancel_order(&order_id).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

/// Route handler for the spendable balance of an account. Accounts with no ledger history report a zero balance.
#[get("/balance/{account_id}")]
pub async fn balance(
    path: web::Path<String>,
    api: web::Data<BalanceApi<SqliteDatabase>>,
) -> Result<HttpResponse, ServerError> {
    let account_id = path.into_inner();
    let response = match api.balance(&account_id).await? {
        Some(b) => {
            BalanceResponse { account_id, balance: b.balance.to_string(), updated_at: Some(b.updated_at) }
        },
        None => BalanceResponse { account_id, balance: upg_common::MicroUsdt::from(0).to_string(), updated_at: None },
    };
    Ok(HttpResponse::Ok().json(response))
}
