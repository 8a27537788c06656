mod balance_api;
mod order_flow_api;

pub use balance_api::BalanceApi;
pub use order_flow_api::{OrderFlowApi, OrderPolicy};
