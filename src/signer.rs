//! Signer capability contract
//!
//! Anything able to turn a [`Challenge`] into a [`PaymentProof`] implements
//! [`PaymentSigner`]. The crate ships two implementations: [`LocalSigner`],
//! which holds a private key in-process, and
//! [`SigningCoordinator`](crate::coordinator::SigningCoordinator), which
//! forwards the challenge to a remote signer over WebSocket.
//!
//! Signers are passed around as explicit handles (`Arc<dyn PaymentSigner>`).

use crate::crypto::{eip712, signature};
use crate::types::{Challenge, PaymentProof};
use crate::{Result, X402Error};
use async_trait::async_trait;

/// Produces signed payment proofs
#[async_trait]
pub trait PaymentSigner: Send + Sync {
    /// Sign a challenge
    async fn sign_payment(&self, challenge: &Challenge) -> Result<PaymentProof>;

    /// Address this signer signs with, if known up front
    async fn address(&self) -> Option<String>;

    /// Whether a signature can be produced right now
    async fn is_ready(&self) -> bool;
}

/// Signs with a private key held in memory
#[derive(Clone)]
pub struct LocalSigner {
    private_key: String,
    address: String,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Create a signer from a hex private key (with or without `0x`)
    pub fn new(private_key: impl Into<String>) -> Result<Self> {
        let private_key = private_key.into();
        let address = signature::address_from_private_key(&private_key)?;
        Ok(Self {
            private_key,
            address,
        })
    }

    /// Create a signer from `X402_PRIVATE_KEY`
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let key = std::env::var("X402_PRIVATE_KEY")
            .map_err(|_| X402Error::config("X402_PRIVATE_KEY environment variable is required"))?;
        Self::new(key)
    }

    /// Checksummed signer address
    pub fn signer_address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl PaymentSigner for LocalSigner {
    async fn sign_payment(&self, challenge: &Challenge) -> Result<PaymentProof> {
        let hash = eip712::challenge_hash(challenge)?;
        let sig = signature::sign_message_hash(hash, &self.private_key)?;

        let mut proof = PaymentProof::new(sig, self.address.clone(), challenge.clone());
        proof.message_hash = Some(format!("0x{}", hex::encode(hash.as_bytes())));
        Ok(proof)
    }

    async fn address(&self) -> Option<String> {
        Some(self.address.clone())
    }

    async fn is_ready(&self) -> bool {
        true
    }
}
