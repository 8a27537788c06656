mod micro_usdt;

pub mod op;
mod secret;

pub use micro_usdt::{MicroUsdt, MicroUsdtConversionError};
pub use secret::Secret;
