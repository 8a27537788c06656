//! # Settlement callback signature format
//!
//! Transfer notifications arrive from an external chain watcher over plain HTTP. Anyone who can reach the endpoint
//! could otherwise forge a "payment received" message and get their order settled for free, so every notification
//! must carry a keyed MAC computed with a secret shared between the watcher and this server.
//!
//! ## Message format
//!
//! The MAC is HMAC-SHA256 over the canonical concatenation
//!
//! ```text
//!     {order_id}:{amount}:{tx_reference}
//! ```
//!
//! where
//!   * `order_id` is the claimed order id, or the empty string if the watcher does not know it,
//!   * `amount` is the transfer amount as a six-decimal string (e.g. `10.456000`), and
//!   * `tx_reference` is the on-chain transaction hash.
//!
//! The amount is rendered from the integer microUSDT form, never from a float, so both sides always produce the
//! identical byte string. The signature travels hex-encoded in the `x-payment-signature` header and verification
//! is constant-time.

use std::str::FromStr;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use upg_common::{MicroUsdt, Secret};

use crate::db_types::OrderId;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
#[error("Invalid callback signature: {0}")]
pub struct CallbackSignatureError(String);

impl From<String> for CallbackSignatureError {
    fn from(e: String) -> Self {
        Self(e)
    }
}

/// A hex-encoded HMAC-SHA256 tag over the canonical settlement message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackSignature(Vec<u8>);

impl CallbackSignature {
    pub fn new(hex: &str) -> Result<Self, CallbackSignatureError> {
        if hex.len() != 64 {
            return Err(CallbackSignatureError(format!("expected 64 hex characters, got {}", hex.len())));
        }
        let bytes = from_hex(hex)?;
        Ok(Self(bytes))
    }

    /// Computes the signature the watcher should have sent for `message`.
    pub fn sign(message: &str, secret: &Secret<String>) -> Self {
        let mut mac = HmacSha256::new_from_slice(secret.reveal().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        Self(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time verification of this signature against `message` and the shared secret.
    pub fn is_valid(&self, message: &str, secret: &Secret<String>) -> bool {
        let mut mac = match HmacSha256::new_from_slice(secret.reveal().as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(message.as_bytes());
        mac.verify_slice(&self.0).is_ok()
    }

    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl FromStr for CallbackSignature {
    type Err = CallbackSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The canonical message the MAC covers. Both the watcher and the gateway must build this identically.
pub fn signature_message(order_id: Option<&OrderId>, amount: MicroUsdt, tx_reference: &str) -> String {
    let oid = order_id.map(OrderId::as_str).unwrap_or_default();
    format!("{oid}:{}:{tx_reference}", amount.to_decimal_string())
}

fn from_hex(s: &str) -> Result<Vec<u8>, CallbackSignatureError> {
    if s.len() % 2 != 0 {
        return Err(CallbackSignatureError("odd-length hex string".into()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| CallbackSignatureError(format!("'{}' is not valid hex", &s[i..i + 2])))
        })
        .collect()
}
