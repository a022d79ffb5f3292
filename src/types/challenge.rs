//! Challenge, proof and verification result types

use serde::{Deserialize, Serialize};

/// HTTP 402 payment challenge
///
/// Immutable once issued. The signer echoes it back unchanged inside a
/// [`PaymentProof`] so the server can recompute the exact signing digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Price in token units (e.g., "0.01")
    pub price: String,
    /// Token symbol (e.g., "USDC")
    pub currency: String,
    /// Chain id (e.g., 8453 for Base)
    pub chain_id: u64,
    /// Merchant wallet address
    pub merchant: String,
    /// Unix timestamp of issuance
    pub timestamp: u64,
    /// Optional payment description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional nonce for replay protection
    #[serde(default)]
    pub nonce: Option<String>,
}

impl Challenge {
    /// Create a challenge stamped with the current time and no nonce
    pub fn new(
        price: impl Into<String>,
        currency: impl Into<String>,
        chain_id: u64,
        merchant: impl Into<String>,
    ) -> Self {
        Self {
            price: price.into(),
            currency: currency.into(),
            chain_id,
            merchant: merchant.into(),
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            description: None,
            nonce: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the issuance timestamp
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Signed payment proof, carried JSON-encoded in the `X-PAYMENT` header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProof {
    /// 65-byte `r || s || v` signature, hex encoded
    pub signature: String,
    /// Address claimed to have produced the signature
    pub signer: String,
    /// The challenge exactly as issued
    pub challenge: Challenge,
    /// Digest the signer saw; informational only, never trusted by the verifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_hash: Option<String>,
}

impl PaymentProof {
    /// Create a new proof
    pub fn new(
        signature: impl Into<String>,
        signer: impl Into<String>,
        challenge: Challenge,
    ) -> Self {
        Self {
            signature: signature.into(),
            signer: signer.into(),
            challenge,
            message_hash: None,
        }
    }

    /// Encode as the `X-PAYMENT` header value
    pub fn to_header(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an `X-PAYMENT` header value
    pub fn from_header(header: &str) -> crate::Result<Self> {
        serde_json::from_str(header).map_err(|e| {
            crate::X402Error::invalid_payment_payload(format!("Failed to decode payment: {}", e))
        })
    }
}

/// Outcome of verifying a payment proof
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether the proof is valid for its challenge
    pub valid: bool,
    /// Recovered signer on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,
    /// Human-readable failure reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerificationResult {
    /// Successful verification
    pub fn valid(signer: impl Into<String>) -> Self {
        Self {
            valid: true,
            signer: Some(signer.into()),
            error: None,
        }
    }

    /// Failed verification
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            signer: None,
            error: Some(error.into()),
        }
    }
}

/// Body of an HTTP 402 response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequiredResponse {
    /// Always "Payment Required"
    pub error: String,
    /// Challenge the client must get signed
    pub challenge: Challenge,
}

impl PaymentRequiredResponse {
    /// Wrap a challenge in a 402 body
    pub fn new(challenge: Challenge) -> Self {
        Self {
            error: "Payment Required".to_string(),
            challenge,
        }
    }
}
