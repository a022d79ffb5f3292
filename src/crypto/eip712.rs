//! EIP-712 typed data utilities for the x402 `Payment` message

use crate::types::{domain, Challenge};
use crate::{Result, X402Error};
use ethereum_types::{Address, H256};

/// EIP-712 domain separator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Domain {
    /// The static x402 domain bound to a chain id
    pub fn x402(chain_id: u64) -> Self {
        Self {
            name: domain::NAME.to_string(),
            version: domain::VERSION.to_string(),
            chain_id,
            verifying_contract: Address::zero(),
        }
    }
}

/// Canonical `Payment` message derived from a [`Challenge`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentMessage {
    pub price: String,
    pub currency: String,
    pub chain_id: u64,
    /// Checksummed when the challenge merchant was recognizable
    pub merchant: String,
    pub timestamp: u64,
    /// Empty when the challenge carried no description
    pub description: String,
}

/// How a merchant address was turned into its canonical form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressNormalization {
    /// Input already carried a valid EIP-55 checksum
    Checksummed(String),
    /// Input was re-cased (and possibly `0x`-prefixed) into checksum form
    Normalized(String),
    /// Input is not a 20-byte hex address; kept as-is with a `0x` prefix
    Passthrough(String),
}

impl AddressNormalization {
    /// The best-effort address string
    pub fn as_str(&self) -> &str {
        match self {
            Self::Checksummed(s) | Self::Normalized(s) | Self::Passthrough(s) => s,
        }
    }

    /// Consume into the best-effort address string
    pub fn into_string(self) -> String {
        match self {
            Self::Checksummed(s) | Self::Normalized(s) | Self::Passthrough(s) => s,
        }
    }

    /// Whether the input was a well-formed address
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Passthrough(_))
    }
}

const EIP712_DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

const PAYMENT_TYPE: &[u8] = b"Payment(string price,string currency,uint256 chainId,address merchant,uint256 timestamp,string description)";

/// Primary type name of the signed struct
pub const PRIMARY_TYPE: &str = "Payment";

/// Type definitions in the JSON shape wallets expect for `eth_signTypedData_v4`
pub fn payment_types() -> serde_json::Value {
    serde_json::json!({
        "EIP712Domain": [
            {"name": "name", "type": "string"},
            {"name": "version", "type": "string"},
            {"name": "chainId", "type": "uint256"},
            {"name": "verifyingContract", "type": "address"}
        ],
        "Payment": [
            {"name": "price", "type": "string"},
            {"name": "currency", "type": "string"},
            {"name": "chainId", "type": "uint256"},
            {"name": "merchant", "type": "address"},
            {"name": "timestamp", "type": "uint256"},
            {"name": "description", "type": "string"}
        ]
    })
}

/// Full typed-data document for a challenge, ready to hand to a wallet
pub fn typed_data_json(challenge: &Challenge) -> serde_json::Value {
    let typed_domain = Domain::x402(challenge.chain_id);
    let message = create_payment_message(challenge);
    serde_json::json!({
        "types": payment_types(),
        "primaryType": PRIMARY_TYPE,
        "domain": {
            "name": typed_domain.name,
            "version": typed_domain.version,
            "chainId": typed_domain.chain_id,
            "verifyingContract": domain::VERIFYING_CONTRACT,
        },
        "message": {
            "price": message.price,
            "currency": message.currency,
            "chainId": message.chain_id,
            "merchant": message.merchant,
            "timestamp": message.timestamp,
            "description": message.description,
        }
    })
}

/// Compute the EIP-55 checksummed form of a 20-byte hex address
pub fn to_checksum_address(address: &str) -> Result<String> {
    let hex_part = strip_hex_prefix(address);
    if hex_part.len() != 40 || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(X402Error::invalid_address(address));
    }

    let lower = hex_part.to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut checksummed = String::with_capacity(42);
    checksummed.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            checksummed.push(c.to_ascii_uppercase());
        } else {
            checksummed.push(c);
        }
    }
    Ok(checksummed)
}

/// Normalize a merchant address without ever failing
pub fn normalize_address(input: &str) -> AddressNormalization {
    let lower = input.to_lowercase();
    let mixed_case = input != lower && input != input.to_uppercase();

    if mixed_case {
        return match to_checksum_address(&lower) {
            Ok(checksummed) if checksummed == input => {
                AddressNormalization::Checksummed(checksummed)
            }
            Ok(checksummed) => AddressNormalization::Normalized(checksummed),
            Err(_) => AddressNormalization::Passthrough(input.to_string()),
        };
    }

    let prefixed = if lower.starts_with("0x") {
        lower
    } else {
        format!("0x{}", lower)
    };
    match to_checksum_address(&prefixed) {
        Ok(checksummed) if checksummed == input => AddressNormalization::Checksummed(checksummed),
        Ok(checksummed) => AddressNormalization::Normalized(checksummed),
        Err(_) if input.starts_with("0x") => AddressNormalization::Passthrough(input.to_string()),
        Err(_) => AddressNormalization::Passthrough(format!("0x{}", input)),
    }
}

/// Build the canonical message for a challenge
pub fn create_payment_message(challenge: &Challenge) -> PaymentMessage {
    let merchant = normalize_address(&challenge.merchant);
    if !merchant.is_recognized() {
        tracing::debug!(
            merchant = %challenge.merchant,
            "Merchant is not a 20-byte hex address; encoding it unchanged"
        );
    }

    PaymentMessage {
        price: challenge.price.clone(),
        currency: challenge.currency.clone(),
        chain_id: challenge.chain_id,
        merchant: merchant.into_string(),
        timestamp: challenge.timestamp,
        description: challenge.description.clone().unwrap_or_default(),
    }
}

/// Encode a challenge into its canonical message and EIP-712 digest
///
/// Fails only when the merchant cannot be encoded as an address.
pub fn encode_challenge(challenge: &Challenge) -> Result<(PaymentMessage, H256)> {
    let domain = Domain::x402(challenge.chain_id);
    let message = create_payment_message(challenge);
    let hash = hash_typed_data(&domain, &message)?;
    Ok((message, hash))
}

/// EIP-712 digest of a challenge
pub fn challenge_hash(challenge: &Challenge) -> Result<H256> {
    encode_challenge(challenge).map(|(_, hash)| hash)
}

/// Hash EIP-712 typed data
pub fn hash_typed_data(domain: &Domain, message: &PaymentMessage) -> Result<H256> {
    let domain_separator = hash_domain(domain);
    let struct_hash = hash_payment_message(message)?;

    // EIP-712: hash(0x1901 || domain_separator || struct_hash)
    let mut data = Vec::with_capacity(66);
    data.extend_from_slice(&[0x19, 0x01]);
    data.extend_from_slice(domain_separator.as_bytes());
    data.extend_from_slice(struct_hash.as_bytes());

    Ok(H256::from(keccak256(&data)))
}

/// Hash the domain separator
pub fn hash_domain(domain: &Domain) -> H256 {
    let mut data = Vec::with_capacity(5 * 32);
    data.extend_from_slice(&keccak256(EIP712_DOMAIN_TYPE));
    data.extend_from_slice(&keccak256(domain.name.as_bytes()));
    data.extend_from_slice(&keccak256(domain.version.as_bytes()));
    data.extend_from_slice(&encode_uint(domain.chain_id));
    data.extend_from_slice(&encode_address_bytes(&domain.verifying_contract));

    H256::from(keccak256(&data))
}

/// Hash the `Payment` struct
pub fn hash_payment_message(message: &PaymentMessage) -> Result<H256> {
    let merchant = parse_address(&message.merchant)?;

    let mut data = Vec::with_capacity(7 * 32);
    data.extend_from_slice(&keccak256(PAYMENT_TYPE));
    data.extend_from_slice(&keccak256(message.price.as_bytes()));
    data.extend_from_slice(&keccak256(message.currency.as_bytes()));
    data.extend_from_slice(&encode_uint(message.chain_id));
    data.extend_from_slice(&encode_address_bytes(&merchant));
    data.extend_from_slice(&encode_uint(message.timestamp));
    data.extend_from_slice(&keccak256(message.description.as_bytes()));

    Ok(H256::from(keccak256(&data)))
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address
pub fn parse_address(address: &str) -> Result<Address> {
    let bytes = hex::decode(strip_hex_prefix(address))
        .map_err(|_| X402Error::invalid_address(address))?;
    if bytes.len() != 20 {
        return Err(X402Error::invalid_address(address));
    }
    Ok(Address::from_slice(&bytes))
}

fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

fn encode_uint(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn encode_address_bytes(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Keccak-256 hash function
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use sha3::{Digest, Keccak256};
    Keccak256::digest(data).into()
}
