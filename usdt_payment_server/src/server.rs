use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use usdt_payment_engine::{BalanceApi, OrderFlowApi, SqliteDatabase};

use crate::{
    config::ServerConfig,
    deliveries,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{balance, cancel_order, create_order, health, order_by_id, trc20_webhook},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25, config.suffix_pool)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let _reaper = start_expiry_worker(db.clone(), config.clone());
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let app_config = config.clone();
    let srv = HttpServer::new(move || {
        let registry = deliveries::build_registry().expect("The delivery registry covers every purchase type");
        let orders_api =
            OrderFlowApi::new(db.clone(), app_config.order_policy, registry, app_config.webhook_secret.clone());
        let balance_api = BalanceApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("upg::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(balance_api))
            .app_data(web::Data::new(app_config.clone()))
            .service(health)
            .service(create_order)
            .service(trc20_webhook)
            .service(order_by_id)
            .service(cancel_order)
            .service(balance)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
