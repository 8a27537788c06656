use log::*;
use tokio::task::JoinHandle;
use usdt_payment_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};

use crate::{config::ServerConfig, deliveries};

/// Starts the expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each sweep expires overdue pending orders (returning their suffixes to the pool) and prunes settlement dedup
/// markers past the retention window.
pub fn start_expiry_worker(db: SqliteDatabase, config: ServerConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(config.reaper_interval);
        let registry = match deliveries::build_registry() {
            Ok(r) => r,
            Err(e) => {
                error!("🕰️ Could not build the delivery registry for the expiry worker. {e}");
                return;
            },
        };
        let api = OrderFlowApi::new(db, config.order_policy, registry, config.webhook_secret.clone());
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            debug!("🕰️ Running order expiry job");
            match api.expire_old_orders().await {
                Ok(result) if result.count() > 0 => {
                    info!("🕰️ {} orders expired: {}", result.count(), order_list(&result.expired));
                },
                Ok(_) => {},
                Err(e) => {
                    error!("🕰️ Error running order expiry job: {e}");
                },
            }
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] account: {} total: {}", o.order_id, o.account_id, o.total_amount))
        .collect::<Vec<String>>()
        .join(", ")
}
