mod prepare_env;

pub use prepare_env::{create_database, prepare_test_env};

use upg_common::MicroUsdt;

use crate::db_types::{NewOrder, OrderType};

pub fn random_account_id() -> String {
    format!("acct-{:08x}", rand::random::<u32>())
}

pub fn random_deposit_order(amount_usdt: i64) -> NewOrder {
    NewOrder::new(random_account_id(), OrderType::BalanceDeposit, MicroUsdt::from_whole(amount_usdt))
}

pub fn random_purchase_order(order_type: OrderType, amount_usdt: i64) -> NewOrder {
    NewOrder::new(random_account_id(), order_type, MicroUsdt::from_whole(amount_usdt))
        .with_payload(r#"{"recipient":"@buyer","package":"3m"}"#)
}
