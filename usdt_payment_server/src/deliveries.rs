//! Delivery integrations.
//!
//! Each purchase order type needs a handler that grants the purchased benefit once the order is paid. The real
//! integrations (the Telegram premium gifting API, the energy rental provider) are operated out-of-process; the
//! handlers here hand the paid order over and report the verdict.
use log::*;
use usdt_payment_engine::{
    db_types::OrderType,
    delivery::{DeliveryRegistry, DeliveryResult},
};

use crate::errors::ServerError;

/// Builds the registry of delivery handlers, one per purchase order type.
///
/// TODO: wire the premium handler to the gifting service once its endpoint is stable. Until then both handlers
/// acknowledge immediately and rely on the payload being consumed by the fulfilment queue downstream.
pub fn build_registry() -> Result<DeliveryRegistry, ServerError> {
    DeliveryRegistry::builder()
        .register(OrderType::PremiumPurchase, |order| {
            Box::pin(async move {
                info!(
                    "🚚️ Premium purchase [{}] for account {} is ready for fulfilment. Payload: {}",
                    order.order_id,
                    order.account_id,
                    order.payload.as_deref().unwrap_or("<none>")
                );
                DeliveryResult::Delivered
            })
        })
        .register(OrderType::EnergyPurchase, |order| {
            Box::pin(async move {
                info!(
                    "🚚️ Energy purchase [{}] for account {} is ready for fulfilment. Payload: {}",
                    order.order_id,
                    order.account_id,
                    order.payload.as_deref().unwrap_or("<none>")
                );
                DeliveryResult::Delivered
            })
        })
        .build()
        .map_err(|e| ServerError::InitializeError(e.to_string()))
}
