//! Payment verification
//!
//! Answers one question: is this attached proof a valid signature over its
//! own challenge? Every failure is folded into a [`VerificationResult`] so
//! callers never have to handle an error at this boundary.
//!
//! Replay protection and matching the challenge against the resource being
//! requested are the caller's job (see [`crate::middleware`]).

use crate::crypto::{eip712, signature};
use crate::types::{PaymentProof, VerificationResult};

/// Failure reason for a proof missing its signature, signer or challenge
pub const INVALID_FORMAT: &str = "Invalid payment header format";

/// Failure reason for a signature that does not recover to the claimed signer
pub const SIGNATURE_MISMATCH: &str = "Signature verification failed";

/// Verify a decoded payment proof
pub fn verify_payment(proof: &PaymentProof) -> VerificationResult {
    if proof.signature.trim().is_empty() || proof.signer.trim().is_empty() {
        return VerificationResult::invalid(INVALID_FORMAT);
    }

    let hash = match eip712::challenge_hash(&proof.challenge) {
        Ok(hash) => hash,
        Err(e) => return verification_error(e),
    };

    if signature::verify_signature(&proof.signature, hash, &proof.signer) {
        tracing::debug!(signer = %proof.signer, "Payment signature verified");
        VerificationResult::valid(proof.signer.clone())
    } else {
        tracing::debug!(signer = %proof.signer, "Payment signature rejected");
        VerificationResult::invalid(SIGNATURE_MISMATCH)
    }
}

/// Verify a raw `X-PAYMENT` header value
pub fn verify_payment_header(header: &str) -> VerificationResult {
    let value: serde_json::Value = match serde_json::from_str(header) {
        Ok(value) => value,
        Err(e) => return verification_error(e),
    };

    if !has_required_fields(&value) {
        return VerificationResult::invalid(INVALID_FORMAT);
    }

    match serde_json::from_value::<PaymentProof>(value) {
        Ok(proof) => verify_payment(&proof),
        Err(e) => verification_error(e),
    }
}

fn has_required_fields(value: &serde_json::Value) -> bool {
    let non_empty = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .is_some_and(|s| !s.is_empty())
    };
    non_empty("signature")
        && non_empty("signer")
        && value.get("challenge").is_some_and(|c| c.is_object())
}

fn verification_error(error: impl std::fmt::Display) -> VerificationResult {
    tracing::debug!("Payment verification error: {}", error);
    VerificationResult::invalid(format!("Verification error: {}", error))
}
