//! Payment guard implementation

use crate::issuer::ChallengeIssuer;
use crate::storage::NonceStorage;
use crate::types::{headers, Challenge, PaymentProof};
use crate::verifier::verify_payment_header;
use crate::Result;
use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Failure reason when the request carries no proof
pub const MISSING_HEADER: &str = "Missing X-PAYMENT header";
/// Failure reason when a valid proof was made for a different price, payee or chain
pub const CHALLENGE_MISMATCH: &str = "Payment challenge does not match this resource";
/// Failure reason when replay protection is on and the challenge has no nonce
pub const MISSING_NONCE: &str = "Payment challenge is missing a nonce";
/// Failure reason for a nonce that was already redeemed
pub const NONCE_REUSED: &str = "Payment nonce has already been used";

/// Proof details made available to the protected handler as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Address that signed the challenge
    pub signer: String,
    /// The challenge that was paid
    pub challenge: Challenge,
}

/// Guards a route behind a signed payment challenge
#[derive(Clone)]
pub struct PaymentGuard {
    pub price: String,
    pub currency: Option<String>,
    pub chain_id: Option<u64>,
    pub description: Option<String>,
    issuer: Arc<ChallengeIssuer>,
    nonce_storage: Option<Arc<dyn NonceStorage>>,
}

impl std::fmt::Debug for PaymentGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentGuard")
            .field("price", &self.price)
            .field("currency", &self.currency)
            .field("chain_id", &self.chain_id)
            .field("description", &self.description)
            .field("issuer", &self.issuer)
            .field("replay_protection", &self.nonce_storage.is_some())
            .finish()
    }
}

/// Outcome of guarding one request
#[derive(Debug)]
pub enum PaymentResult {
    /// Proof accepted; carries the handler's response
    Success {
        response: Response,
        payment: VerifiedPayment,
    },
    /// No proof attached; carries the 402 challenge
    PaymentRequired { response: Response },
    /// Proof rejected; carries the 402 error
    VerificationFailed { response: Response },
}

impl PaymentGuard {
    /// Guard priced at `price`, using the issuer's currency and chain defaults
    pub fn new(issuer: impl Into<Arc<ChallengeIssuer>>, price: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            currency: None,
            chain_id: None,
            description: None,
            issuer: issuer.into(),
            nonce_storage: None,
        }
    }

    /// Set the currency
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Set the chain id
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Set the payment description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Reject proofs whose challenge nonce was already redeemed
    pub fn with_nonce_storage(mut self, storage: Arc<dyn NonceStorage>) -> Self {
        self.nonce_storage = Some(storage);
        self
    }

    /// Issue a fresh challenge for this resource
    pub fn issue_challenge(&self) -> Result<Challenge> {
        self.issuer.issue(
            &self.price,
            self.currency.as_deref(),
            self.chain_id,
            self.description.as_deref(),
        )
    }

    /// Build the 402 challenge response
    pub fn payment_required_response(&self) -> Result<Response> {
        let challenge = self.issue_challenge()?;
        let body = self.issuer.payment_required_body(challenge);

        let mut response = (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
        response.headers_mut().insert(
            HeaderName::from_static("x-payment-required"),
            HeaderValue::from_static("true"),
        );
        Ok(response)
    }

    /// Check a verified challenge against what this resource charges
    pub fn matches_resource(&self, challenge: &Challenge) -> bool {
        let config = self.issuer.config();
        let currency = self
            .currency
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&config.currency);
        let chain_id = self.chain_id.filter(|id| *id != 0).unwrap_or(config.chain_id);

        challenge
            .merchant
            .eq_ignore_ascii_case(&config.merchant_address)
            && same_price(&challenge.price, &self.price)
            && challenge.currency == currency
            && challenge.chain_id == chain_id
    }

    /// Run the guard for one request
    pub async fn process_payment(
        &self,
        mut request: Request,
        next: Next,
    ) -> Result<PaymentResult> {
        let header = request
            .headers()
            .get(headers::X_PAYMENT)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_owned);

        let header = match header {
            Some(header) => header,
            None => {
                tracing::debug!(uri = %request.uri(), "{}; issuing challenge", MISSING_HEADER);
                return Ok(PaymentResult::PaymentRequired {
                    response: self.payment_required_response()?,
                });
            }
        };

        let verification = verify_payment_header(&header);
        if !verification.valid {
            let reason = verification
                .error
                .unwrap_or_else(|| "Invalid payment".to_string());
            return Ok(rejected(reason));
        }

        let proof = PaymentProof::from_header(&header)?;
        if !self.matches_resource(&proof.challenge) {
            tracing::warn!(
                uri = %request.uri(),
                price = %proof.challenge.price,
                currency = %proof.challenge.currency,
                chain_id = proof.challenge.chain_id,
                "Proof was signed for a different resource"
            );
            return Ok(rejected(CHALLENGE_MISMATCH));
        }

        if let Some(storage) = &self.nonce_storage {
            let nonce = match proof.challenge.nonce.as_deref() {
                Some(nonce) if !nonce.is_empty() => nonce,
                _ => return Ok(rejected(MISSING_NONCE)),
            };
            if !storage.mark_nonce(nonce).await? {
                tracing::warn!(nonce = %nonce, "Replayed payment nonce rejected");
                return Ok(rejected(NONCE_REUSED));
            }
        }

        let payment = VerifiedPayment {
            signer: verification.signer.unwrap_or_else(|| proof.signer.clone()),
            challenge: proof.challenge,
        };
        tracing::info!(
            signer = %payment.signer,
            price = %payment.challenge.price,
            "Payment accepted"
        );

        request.extensions_mut().insert(payment.clone());
        let response = next.run(request).await;
        Ok(PaymentResult::Success { response, payment })
    }
}

fn rejected(reason: impl Into<String>) -> PaymentResult {
    let body = serde_json::json!({ "error": reason.into() });
    PaymentResult::VerificationFailed {
        response: (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response(),
    }
}

fn same_price(signed: &str, expected: &str) -> bool {
    match (Decimal::from_str(signed.trim()), Decimal::from_str(expected.trim())) {
        (Ok(a), Ok(b)) => a == b,
        _ => signed.trim() == expected.trim(),
    }
}

/// Axum middleware function guarding a route with a [`PaymentGuard`]
pub async fn payment_middleware(
    State(guard): State<PaymentGuard>,
    request: Request,
    next: Next,
) -> Result<Response> {
    match guard.process_payment(request, next).await? {
        PaymentResult::Success { response, .. } => Ok(response),
        PaymentResult::PaymentRequired { response } => Ok(response),
        PaymentResult::VerificationFailed { response } => Ok(response),
    }
}
