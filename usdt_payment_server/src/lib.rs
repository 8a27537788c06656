//! # USDT payment gateway server
//! This module hosts the HTTP front-end for the payment gateway. It is responsible for:
//! * Creating orders and quoting the exact, suffix-disambiguated amount the buyer must transfer.
//! * Listening for signed settlement notifications from the chain watcher and feeding them to the engine.
//! * Serving order and balance lookups.
//! * Running the background worker that expires overdue orders.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/order`: Creates a new order.
//! * `/order/{order_id}`: Fetches an order. `/order/{order_id}/cancel` cancels it.
//! * `/webhook/trc20`: The webhook route for receiving transfer notifications from the chain watcher.
//! * `/balance/{account_id}`: The spendable balance of an account.

pub mod config;
pub mod data_objects;
pub mod deliveries;
pub mod errors;
pub mod expiry_worker;
pub mod routes;
pub mod server;
