//! Wire protocol between the coordinator and remote signers
//!
//! Every frame is a JSON object carried in a WebSocket text frame and
//! discriminated by its `type` field:
//!
//! | type            | direction          | fields                    |
//! |-----------------|--------------------|---------------------------|
//! | `connected`     | server → signer    | `clientId`, `message`     |
//! | `sign-request`  | server → signer    | `id`, `challenge`         |
//! | `sign-response` | signer → server    | `id`, `result` or `error` |
//! | `pong`          | signer → server    |                           |
//! | `error`         | both               | optional `id`, `error`    |

use crate::types::{Challenge, PaymentProof};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Text of the `connected` acknowledgement
pub const CONNECTED_MESSAGE: &str = "Connected to x402 WebSocket server";

/// A coordinator protocol frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignerMessage {
    /// Sent once when a signer connects
    Connected {
        #[serde(rename = "clientId")]
        client_id: String,
        message: String,
    },
    /// Ask a signer to sign a challenge
    SignRequest { id: String, challenge: Challenge },
    /// Signer's answer to a `sign-request`
    SignResponse {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<PaymentProof>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Heartbeat reply
    Pong,
    /// Error report, tied to a request when `id` is present
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        error: String,
    },
}

impl SignerMessage {
    /// The `connected` acknowledgement for a new connection
    pub fn connected(client_id: impl Into<String>) -> Self {
        Self::Connected {
            client_id: client_id.into(),
            message: CONNECTED_MESSAGE.to_string(),
        }
    }

    /// An error frame not tied to any request
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            id: None,
            error: error.into(),
        }
    }

    /// Frame type as it appears on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::SignRequest { .. } => "sign-request",
            Self::SignResponse { .. } => "sign-response",
            Self::Pong => "pong",
            Self::Error { .. } => "error",
        }
    }

    /// Decode a text frame
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Encode as a text frame
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frame queued for delivery to one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// JSON text frame
    Text(String),
    /// Close the connection
    Close,
}
