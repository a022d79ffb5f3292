//! Storage trait for redeemed challenge nonces
//!
//! The verifier itself is stateless. Servers that want replay protection
//! record each nonce they accept here and reject a proof whose challenge
//! nonce has already been redeemed.

use crate::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Trait for storing and retrieving redeemed nonces
#[async_trait]
pub trait NonceStorage: Send + Sync {
    /// Check if a nonce has been redeemed
    async fn has_nonce(&self, nonce: &str) -> Result<bool>;

    /// Mark a nonce as redeemed, returning `true` if it was not seen before
    async fn mark_nonce(&self, nonce: &str) -> Result<bool>;

    /// Forget a nonce
    async fn remove_nonce(&self, nonce: &str) -> Result<()>;
}

/// Redeemed nonces held in process memory, lost on restart
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    nonces: Arc<DashMap<String, u64>>,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of redeemed nonces held
    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    /// Whether no nonce has been redeemed yet
    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    /// Unix time at which `nonce` was redeemed
    pub fn redeemed_at(&self, nonce: &str) -> Option<u64> {
        self.nonces.get(nonce).map(|entry| *entry.value())
    }
}

#[async_trait]
impl NonceStorage for InMemoryStorage {
    async fn has_nonce(&self, nonce: &str) -> Result<bool> {
        Ok(self.nonces.contains_key(nonce))
    }

    async fn mark_nonce(&self, nonce: &str) -> Result<bool> {
        // The entry API makes check-and-insert a single step under the shard lock
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        match self.nonces.entry(nonce.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(now);
                Ok(true)
            }
        }
    }

    async fn remove_nonce(&self, nonce: &str) -> Result<()> {
        self.nonces.remove(nonce);
        Ok(())
    }
}
