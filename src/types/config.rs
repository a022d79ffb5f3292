//! Merchant payment configuration

use super::constants::defaults;
use crate::{Result, X402Error};

/// Merchant defaults consumed by the challenge issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfig {
    /// Merchant wallet address that receives payments
    pub merchant_address: String,
    /// Default chain id
    pub chain_id: u64,
    /// Default token symbol
    pub currency: String,
}

impl PaymentConfig {
    /// Create a config with the default chain (8453) and currency ("USDC")
    pub fn new(merchant_address: impl Into<String>) -> Self {
        Self {
            merchant_address: merchant_address.into(),
            chain_id: defaults::CHAIN_ID,
            currency: defaults::CURRENCY.to_string(),
        }
    }

    /// Set the default chain id
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set the default currency
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.merchant_address.trim().is_empty() {
            return Err(X402Error::config("Merchant address is required"));
        }
        if self.currency.trim().is_empty() {
            return Err(X402Error::config("Currency cannot be empty"));
        }
        if self.chain_id == 0 {
            return Err(X402Error::config("Chain id cannot be zero"));
        }
        Ok(())
    }

    /// Load from `X402_MERCHANT_ADDRESS`, `X402_CHAIN_ID` and `X402_CURRENCY`,
    /// reading a `.env` file first if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let merchant_address = lookup("X402_MERCHANT_ADDRESS")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                X402Error::config("X402_MERCHANT_ADDRESS environment variable is required")
            })?;

        let chain_id = match lookup("X402_CHAIN_ID") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| X402Error::config(format!("Invalid X402_CHAIN_ID: {}", raw)))?,
            None => defaults::CHAIN_ID,
        };

        let currency = lookup("X402_CURRENCY").unwrap_or_else(|| defaults::CURRENCY.to_string());

        let config = Self {
            merchant_address,
            chain_id,
            currency,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_load_config_from_lookup() {
        let config = PaymentConfig::from_lookup(lookup(&[
            (
                "X402_MERCHANT_ADDRESS",
                "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0",
            ),
            ("X402_CHAIN_ID", "84532"),
            ("X402_CURRENCY", "EURC"),
        ]))
        .unwrap();

        assert_eq!(
            config.merchant_address,
            "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0"
        );
        assert_eq!(config.chain_id, 84532);
        assert_eq!(config.currency, "EURC");
    }

    #[test]
    fn test_defaults_applied() {
        let config =
            PaymentConfig::from_lookup(lookup(&[("X402_MERCHANT_ADDRESS", "0xabc")])).unwrap();
        assert_eq!(config.chain_id, 8453);
        assert_eq!(config.currency, "USDC");
    }

    #[test]
    fn test_missing_merchant_is_config_error() {
        let err = PaymentConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, X402Error::Config { .. }));
    }

    #[test]
    fn test_bad_chain_id_rejected() {
        let err = PaymentConfig::from_lookup(lookup(&[
            ("X402_MERCHANT_ADDRESS", "0xabc"),
            ("X402_CHAIN_ID", "base"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("X402_CHAIN_ID"));
    }

    #[test]
    fn test_builder() {
        let config = PaymentConfig::new("0xabc")
            .with_chain_id(43114)
            .with_currency("USDT");
        assert_eq!(config.chain_id, 43114);
        assert_eq!(config.currency, "USDT");
        assert!(config.validate().is_ok());
        assert!(PaymentConfig::new("  ").validate().is_err());
    }
}
