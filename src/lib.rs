//! # x402 challenge/response
//!
//! A Rust implementation of an HTTP 402 "payment required" challenge/response
//! protocol. A server answers an unpaid request with a structured payment
//! challenge; a signer produces an EIP-712 signature over that exact
//! challenge; the server recovers the signer from the signature before
//! releasing the resource.
//!
//! ## Features
//!
//! - **Canonical encoding**: byte-exact EIP-712 digest of a challenge, shared by signer and verifier
//! - **Signature verification**: secp256k1 public-key recovery with case-insensitive address comparison
//! - **Remote signing**: a WebSocket coordinator that forwards challenges to connected wallets
//!   and correlates their answers, with timeouts, cancellation and target selection
//! - **Axum integration**: a payment guard middleware with optional replay protection
//! - **Paying client**: retries a request once with an `X-PAYMENT` proof after a 402
//!
//! ## Quick Start
//!
//! ### Protecting a route
//!
//! ```rust,no_run
//! use axum::{routing::get, Router};
//! use x402_challenge::{
//!     issuer::ChallengeIssuer,
//!     middleware::{payment_middleware, PaymentGuard},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads X402_MERCHANT_ADDRESS, X402_CHAIN_ID and X402_CURRENCY
//!     let issuer = ChallengeIssuer::from_env()?;
//!     let guard = PaymentGuard::new(issuer, "0.01").with_description("Premium joke");
//!
//!     let app = Router::new()
//!         .route("/joke", get(|| async { "Why do programmers prefer dark mode?" }))
//!         .layer(axum::middleware::from_fn_with_state(guard, payment_middleware));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ### Signing through a connected wallet
//!
//! ```rust,no_run
//! use x402_challenge::{
//!     coordinator::{CoordinatorConfig, SigningCoordinator},
//!     verifier::verify_payment,
//!     types::Challenge,
//! };
//!
//! # async fn example() -> x402_challenge::Result<()> {
//! let coordinator = SigningCoordinator::new(CoordinatorConfig::default());
//! coordinator.start().await?;
//!
//! let challenge = Challenge::new("0.01", "USDC", 8453, "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0");
//! let proof = coordinator.request_signature(&challenge).await?;
//! assert!(verify_payment(&proof).valid);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`types`**: Challenge, proof, verification result, merchant config and constants
//! - **`crypto`**: EIP-712 encoding, signature recovery, local signing and nonces
//! - **`issuer`**: Builds challenges and 402 bodies from merchant defaults
//! - **`verifier`**: Turns a proof into a verification result, never an error
//! - **`signer`**: The `PaymentSigner` capability and a private-key implementation
//! - **`coordinator`**: Correlation-keyed remote signing over WebSocket
//! - **`client`**: HTTP transport abstraction and a 402-aware client
//! - **`middleware`**: Axum payment guard
//! - **`storage`**: Redeemed-nonce storage for replay protection
//! - **`error`**: Error taxonomy
//!
//! ## Non-goals
//!
//! Verification is a signature check only. Nothing is settled or submitted
//! on-chain.

pub mod client;
pub mod coordinator;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod middleware;
pub mod signer;
pub mod storage;
pub mod types;
pub mod verifier;

// Re-exports for convenience
pub use client::X402Client;
pub use coordinator::{CoordinatorConfig, SelectionPolicy, SigningCoordinator};
pub use error::{Result, X402Error};
pub use issuer::ChallengeIssuer;
pub use signer::{LocalSigner, PaymentSigner};
pub use types::*;
pub use verifier::{verify_payment, verify_payment_header};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
