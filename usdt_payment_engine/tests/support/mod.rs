// Not every test binary uses every helper.
#![allow(dead_code)]

use tempfile::TempDir;
use upg_common::Secret;
use usdt_payment_engine::{
    db_types::{NewSettlement, OrderType},
    delivery::{DeliveryRegistry, DeliveryResult},
    helpers::{signature_message, CallbackSignature},
    test_utils::prepare_test_env,
    OrderFlowApi,
    OrderPolicy,
    SqliteDatabase,
    SuffixPoolConfig,
};

pub const TEST_SECRET: &str = "test-webhook-secret";

/// Creates a fresh SQLite database in a temp directory. The `TempDir` guard must be kept alive for the duration of
/// the test. A single pool connection keeps test transactions strictly serialized; tests that need to see writers
/// on separate connections use [`new_test_db_with_connections`] instead.
pub async fn new_test_db(suffix_pool: SuffixPoolConfig) -> (SqliteDatabase, TempDir) {
    new_test_db_with_connections(suffix_pool, 1).await
}

/// Same as [`new_test_db`], with a configurable pool size for exercising cross-connection contention.
pub async fn new_test_db_with_connections(
    suffix_pool: SuffixPoolConfig,
    max_connections: u32,
) -> (SqliteDatabase, TempDir) {
    let dir = TempDir::new().expect("Could not create temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("gateway.db").display());
    prepare_test_env(&url).await;
    let db =
        SqliteDatabase::new_with_url(&url, max_connections, suffix_pool).await.expect("Could not open test database");
    (db, dir)
}

pub fn webhook_secret() -> Secret<String> {
    Secret::new(TEST_SECRET.to_string())
}

/// A registry whose purchase handlers immediately report full delivery.
pub fn all_delivered_registry() -> DeliveryRegistry {
    DeliveryRegistry::builder()
        .register(OrderType::PremiumPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
        .register(OrderType::EnergyPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
        .build()
        .expect("registry is complete")
}

pub fn new_api(db: SqliteDatabase, policy: OrderPolicy, registry: DeliveryRegistry) -> OrderFlowApi<SqliteDatabase> {
    OrderFlowApi::new(db, policy, registry, webhook_secret())
}

/// Signs a settlement the way the chain watcher would.
pub fn sign(settlement: &NewSettlement) -> CallbackSignature {
    let message = signature_message(settlement.order_id_hint.as_ref(), settlement.amount, &settlement.tx_reference);
    CallbackSignature::sign(&message, &webhook_secret())
}
