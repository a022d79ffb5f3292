//! Core types for the x402 challenge/response protocol
//!
//! This module defines the data exchanged between the issuing server, the
//! signer and the verifier.
//!
//! # Architecture
//!
//! - [`challenge`] - Challenge, proof, verification result and 402 body
//! - [`config`] - Merchant defaults used by the issuer
//! - [`constants`] - Header names, defaults, typed-data domain and chain ids
//!
//! # Examples
//!
//! ## Building a challenge by hand
//!
//! ```
//! use x402_challenge::types::Challenge;
//!
//! let challenge = Challenge::new(
//!     "0.01",                                          // price
//!     "USDC",                                          // currency
//!     8453,                                            // chain id (Base)
//!     "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0",    // merchant
//! )
//! .with_description("API access fee");
//!
//! assert_eq!(challenge.description.as_deref(), Some("API access fee"));
//! ```
//!
//! ## Decoding a proof header
//!
//! ```
//! use x402_challenge::types::PaymentProof;
//!
//! let header = r#"{"signature":"0x00","signer":"0xabc","challenge":{
//!     "price":"0.01","currency":"USDC","chain_id":8453,
//!     "merchant":"0xabc","timestamp":1699123456}}"#;
//! let proof = PaymentProof::from_header(header).unwrap();
//! assert_eq!(proof.challenge.chain_id, 8453);
//! ```

pub mod challenge;
pub mod config;
pub mod constants;

pub use challenge::{Challenge, PaymentProof, PaymentRequiredResponse, VerificationResult};
pub use config::PaymentConfig;
pub use constants::{defaults, domain, headers, networks};
