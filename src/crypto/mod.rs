//! Cryptographic utilities for x402 challenges
//!
//! This module turns a challenge into the exact digest both sides sign and
//! verify, and checks secp256k1 signatures over that digest.
//!
//! # Architecture
//!
//! - [`eip712`] - Canonical `Payment` message, address normalization and typed-data hashing
//! - [`signature`] - Signature recovery, verification, local signing and nonces
//!
//! # Examples
//!
//! ## Encoding a challenge
//!
//! ```
//! use x402_challenge::crypto::eip712;
//! use x402_challenge::types::Challenge;
//!
//! let challenge = Challenge::new("0.01", "USDC", 8453, "0x742d35cc6634c0532925a3b844bc9e7595f0beb0")
//!     .with_timestamp(1699123456);
//! let (message, hash) = eip712::encode_challenge(&challenge).unwrap();
//!
//! assert!(message.merchant.starts_with("0x742d35Cc"));
//! assert_eq!(hash, eip712::challenge_hash(&challenge).unwrap());
//! ```
//!
//! ## Sign and verify round trip
//!
//! ```
//! use x402_challenge::crypto::{eip712, signature};
//! use x402_challenge::types::Challenge;
//!
//! let key = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
//! let signer = signature::address_from_private_key(key).unwrap();
//! let challenge = Challenge::new("0.01", "USDC", 8453, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0");
//!
//! let hash = eip712::challenge_hash(&challenge).unwrap();
//! let sig = signature::sign_message_hash(hash, key).unwrap();
//! assert!(signature::verify_signature(&sig, hash, &signer));
//! ```

pub mod eip712;
pub mod signature;


// Re-export commonly used items
pub use eip712::{
    challenge_hash, encode_challenge, normalize_address, to_checksum_address,
    AddressNormalization, Domain, PaymentMessage,
};
pub use signature::{
    address_from_private_key, generate_nonce, recover_signer, sign_message_hash,
    verify_signature,
};
