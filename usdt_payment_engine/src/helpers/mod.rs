mod callback_signature;

pub use callback_signature::{signature_message, CallbackSignature, CallbackSignatureError};
