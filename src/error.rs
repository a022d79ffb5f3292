//! Error types for the x402 challenge/response flow

use std::time::Duration;
use thiserror::Error;

/// Result type alias for x402 operations
pub type Result<T> = std::result::Result<T, X402Error>;

/// Errors raised by the issuer, the encoder and the signing coordinator.
///
/// Verification failures are never raised through this type: the
/// orchestrator folds them into a [`VerificationResult`](crate::types::VerificationResult).
#[derive(Error, Debug)]
pub enum X402Error {
    /// Missing or invalid configuration (fatal at startup)
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Price is not a non-negative decimal
    #[error("Invalid price: {message}")]
    InvalidPrice { message: String },

    /// Address cannot be encoded as a 20-byte account
    #[error("Invalid address: {address}")]
    InvalidAddress { address: String },

    /// Signature or key material is malformed
    #[error("Invalid signature: {message}")]
    InvalidSignature { message: String },

    /// Payment proof could not be decoded
    #[error("Invalid payment payload: {message}")]
    InvalidPaymentPayload { message: String },

    /// No remote signer is connected to the coordinator
    #[error("No signer connected. Connect a signing client to the coordinator first.")]
    NoSignerConnected,

    /// The remote signer did not answer within the configured budget
    #[error("Payment signing request timed out after {}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    /// The coordinator stopped while the request was in flight
    #[error("Payment signing request cancelled: coordinator stopped")]
    Cancelled,

    /// Every connection the request was sent to went away
    #[error("Signer disconnected before responding")]
    SignerDisconnected,

    /// The remote signer answered with an error
    #[error("Signer rejected request: {message}")]
    SignerRejected { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl X402Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid price error
    pub fn invalid_price(message: impl Into<String>) -> Self {
        Self::InvalidPrice {
            message: message.into(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    /// Create an invalid signature error
    pub fn invalid_signature(message: impl Into<String>) -> Self {
        Self::InvalidSignature {
            message: message.into(),
        }
    }

    /// Create an invalid payment payload error
    pub fn invalid_payment_payload(message: impl Into<String>) -> Self {
        Self::InvalidPaymentPayload {
            message: message.into(),
        }
    }

    /// Create a signer rejection error
    pub fn signer_rejected(message: impl Into<String>) -> Self {
        Self::SignerRejected {
            message: message.into(),
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoSignerConnected | Self::Timeout { .. } | Self::SignerDisconnected
        )
    }

    /// HTTP status used when the error reaches a route handler
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Self::NoSignerConnected | Self::Cancelled | Self::SignerDisconnected => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::SignerRejected { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::InvalidPrice { .. }
            | Self::InvalidAddress { .. }
            | Self::InvalidSignature { .. }
            | Self::InvalidPaymentPayload { .. }
            | Self::Json(_)
            | Self::Url(_) => StatusCode::BAD_REQUEST,
            Self::Http(_) => StatusCode::BAD_GATEWAY,
            Self::Config { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for X402Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
