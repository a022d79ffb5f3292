//! Axum middleware for x402 payment protection
//!
//! This module puts routes behind a signed payment challenge. A request
//! without an `X-PAYMENT` header receives a 402 carrying a fresh challenge;
//! a request with a valid proof for this resource reaches the handler.
//!
//! # Architecture
//!
//! - [`payment`] - [`PaymentGuard`] and the [`payment_middleware`] function
//!
//! Replay protection is opt-in: give the guard a
//! [`NonceStorage`](crate::storage::NonceStorage) and each challenge nonce is
//! accepted once.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use x402_challenge::issuer::ChallengeIssuer;
//! use x402_challenge::middleware::{payment_middleware, PaymentGuard};
//! use x402_challenge::storage::InMemoryStorage;
//! use x402_challenge::types::PaymentConfig;
//!
//! # fn example() -> x402_challenge::Result<()> {
//! let issuer = ChallengeIssuer::new(PaymentConfig::new(
//!     "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb0",
//! ))?;
//!
//! let guard = PaymentGuard::new(issuer, "0.01")
//!     .with_description("Premium API access")
//!     .with_nonce_storage(Arc::new(InMemoryStorage::new()));
//!
//! let app: Router = Router::new()
//!     .route("/paid", get(|| async { "you paid!" }))
//!     .layer(axum::middleware::from_fn_with_state(guard, payment_middleware));
//! # Ok(())
//! # }
//! ```

pub mod payment;


pub use payment::{
    payment_middleware, PaymentGuard, PaymentResult, VerifiedPayment, CHALLENGE_MISMATCH,
    MISSING_HEADER, MISSING_NONCE, NONCE_REUSED,
};
