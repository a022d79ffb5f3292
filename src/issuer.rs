//! Challenge issuer
//!
//! Builds fresh [`Challenge`]s for protected resources from the merchant
//! defaults in [`PaymentConfig`].

use crate::crypto::signature::generate_nonce;
use crate::types::{Challenge, PaymentConfig, PaymentRequiredResponse};
use crate::{Result, X402Error};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Issues payment challenges on behalf of a merchant
#[derive(Debug, Clone)]
pub struct ChallengeIssuer {
    config: PaymentConfig,
}

impl ChallengeIssuer {
    /// Create an issuer, failing when the merchant address is missing
    pub fn new(config: PaymentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an issuer from `X402_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(PaymentConfig::from_env()?)
    }

    /// Merchant defaults in use
    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Issue a challenge for `price`
    ///
    /// Currency and chain id fall back to the configured defaults when absent,
    /// empty or zero. The challenge is stamped with the current time and a
    /// fresh 128-bit nonce.
    pub fn issue(
        &self,
        price: &str,
        currency: Option<&str>,
        chain_id: Option<u64>,
        description: Option<&str>,
    ) -> Result<Challenge> {
        let price = validate_price(price)?;

        let currency = currency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.config.currency);
        let chain_id = chain_id
            .filter(|id| *id != 0)
            .unwrap_or(self.config.chain_id);

        let mut challenge = Challenge::new(
            price,
            currency,
            chain_id,
            self.config.merchant_address.clone(),
        )
        .with_nonce(generate_nonce());
        if let Some(description) = description {
            challenge = challenge.with_description(description);
        }

        tracing::debug!(
            price = %challenge.price,
            currency = %challenge.currency,
            chain_id = challenge.chain_id,
            "Issued payment challenge"
        );

        Ok(challenge)
    }

    /// Wrap a challenge in the HTTP 402 response body
    pub fn payment_required_body(&self, challenge: Challenge) -> PaymentRequiredResponse {
        PaymentRequiredResponse::new(challenge)
    }
}

/// Check that a price is a non-negative decimal and return it trimmed
fn validate_price(price: &str) -> Result<&str> {
    let trimmed = price.trim();
    if trimmed.is_empty() {
        return Err(X402Error::invalid_price("Price cannot be empty"));
    }

    let value = Decimal::from_str(trimmed)
        .map_err(|e| X402Error::invalid_price(format!("'{}' is not a decimal: {}", trimmed, e)))?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(X402Error::invalid_price(format!(
            "'{}' must not be negative",
            trimmed
        )));
    }

    Ok(trimmed)
}
