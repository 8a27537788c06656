use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use thiserror::Error;
use usdt_payment_engine::PaymentGatewayError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The notification signature is missing or invalid.")]
    InvalidSignature,
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The requested change is not allowed. {0}")]
    RequestForbidden(String),
    #[error("Every payment suffix is currently in use. Try again in a few minutes.")]
    SuffixPoolExhausted,
    #[error("Insufficient balance. {0}")]
    InsufficientBalance(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::RequestForbidden(_) => StatusCode::CONFLICT,
            Self::SuffixPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            Self::InsufficientBalance(_) => StatusCode::PAYMENT_REQUIRED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::InvalidSignature => Self::InvalidSignature,
            PaymentGatewayError::SuffixPoolExhausted => Self::SuffixPoolExhausted,
            PaymentGatewayError::OrderNotFound(id) => Self::NoRecordFound(format!("Order {id}")),
            PaymentGatewayError::AccountNotFound(id) => Self::NoRecordFound(format!("Account {id}")),
            PaymentGatewayError::LeaseNotFound(id) => Self::NoRecordFound(format!("Lease for order {id}")),
            PaymentGatewayError::OrderModificationForbidden => {
                Self::RequestForbidden("The order is not in a state that allows this change.".to_string())
            },
            PaymentGatewayError::OrderAlreadyExists(id) => {
                Self::RequestForbidden(format!("Order {id} already exists."))
            },
            PaymentGatewayError::InsufficientBalance(acct) => Self::InsufficientBalance(acct),
            PaymentGatewayError::AmountError(e) => Self::InvalidRequestBody(e.to_string()),
            PaymentGatewayError::ValidationError(e) => Self::InvalidRequestBody(e),
            PaymentGatewayError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
