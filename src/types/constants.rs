//! Protocol constants: header names, defaults and known chains

/// HTTP header names used by the protocol
pub mod headers {
    /// Request header carrying the JSON-encoded payment proof
    pub const X_PAYMENT: &str = "X-PAYMENT";
    /// Response header marking a 402 challenge
    pub const X_PAYMENT_REQUIRED: &str = "X-Payment-Required";
}

/// Defaults applied when the merchant configuration omits a field
pub mod defaults {
    /// Base mainnet
    pub const CHAIN_ID: u64 = 8453;
    /// Default token symbol
    pub const CURRENCY: &str = "USDC";
}

/// Typed-data domain values; bumping `VERSION` invalidates every outstanding signature
pub mod domain {
    pub const NAME: &str = "x402";
    pub const VERSION: &str = "1";
    pub const VERIFYING_CONTRACT: &str = "0x0000000000000000000000000000000000000000";
}

/// Chain ids of commonly used networks
pub mod networks {
    /// Base mainnet chain id
    pub const BASE_MAINNET: u64 = 8453;
    /// Base Sepolia testnet chain id
    pub const BASE_SEPOLIA: u64 = 84532;
    /// Avalanche C-Chain mainnet chain id
    pub const AVALANCHE_MAINNET: u64 = 43114;
    /// Avalanche Fuji testnet chain id
    pub const AVALANCHE_FUJI: u64 = 43113;

    /// Human-readable network name for a chain id
    pub fn name_for_chain(chain_id: u64) -> Option<&'static str> {
        match chain_id {
            BASE_MAINNET => Some("base"),
            BASE_SEPOLIA => Some("base-sepolia"),
            AVALANCHE_MAINNET => Some("avalanche"),
            AVALANCHE_FUJI => Some("avalanche-fuji"),
            _ => None,
        }
    }
}
