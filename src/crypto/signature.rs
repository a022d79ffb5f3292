//! Signature utilities

use super::eip712::{keccak256, parse_address, to_checksum_address};
use crate::{Result, X402Error};
use ethereum_types::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

/// Check that `signature` over `message_hash` was produced by `claimed_signer`
///
/// Never fails: malformed input of any kind yields `false`.
pub fn verify_signature(signature: &str, message_hash: H256, claimed_signer: &str) -> bool {
    let claimed = match parse_address(claimed_signer) {
        Ok(address) => address,
        Err(_) => return false,
    };

    match recover_signer(signature, message_hash) {
        Ok(recovered) => recovered == claimed,
        Err(e) => {
            tracing::debug!("Signature recovery failed: {}", e);
            false
        }
    }
}

/// Recover the address that signed a 32-byte digest
pub fn recover_signer(signature: &str, message_hash: H256) -> Result<Address> {
    let sig_bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| X402Error::invalid_signature("Invalid hex signature"))?;

    if sig_bytes.len() != 65 {
        return Err(X402Error::invalid_signature("Signature must be 65 bytes"));
    }

    // Wallets emit v as 27/28; raw secp256k1 uses 0/1
    let v = match sig_bytes[64] {
        v @ 0..=1 => v,
        v @ 27..=28 => v - 27,
        _ => return Err(X402Error::invalid_signature("Invalid recovery ID")),
    };
    let recovery_id =
        RecoveryId::try_from(v).map_err(|_| X402Error::invalid_signature("Invalid recovery ID"))?;

    let k256_sig = K256Signature::try_from(&sig_bytes[..64])
        .map_err(|_| X402Error::invalid_signature("Invalid signature format"))?;

    let verifying_key =
        VerifyingKey::recover_from_prehash(message_hash.as_bytes(), &k256_sig, recovery_id)
            .map_err(|_| X402Error::invalid_signature("Failed to recover public key"))?;

    let encoded = verifying_key.to_encoded_point(false);
    ethereum_address_from_uncompressed(encoded.as_bytes())
}

/// Sign a 32-byte digest, returning a `0x`-prefixed 65-byte `r || s || v` signature
pub fn sign_message_hash(message_hash: H256, private_key: &str) -> Result<String> {
    let secret_key = parse_private_key(private_key)?;

    let secp = Secp256k1::new();
    let message = Message::from_digest_slice(message_hash.as_bytes())
        .map_err(|_| X402Error::invalid_signature("Invalid message hash"))?;

    let signature = secp.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut sig_bytes = [0u8; 65];
    sig_bytes[..64].copy_from_slice(&compact);
    sig_bytes[64] = 27 + recovery_id.to_i32() as u8;

    Ok(format!("0x{}", hex::encode(sig_bytes)))
}

/// Checksummed address controlled by a private key
pub fn address_from_private_key(private_key: &str) -> Result<String> {
    let secret_key = parse_private_key(private_key)?;
    let secp = Secp256k1::new();
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    let address = ethereum_address_from_uncompressed(&public_key.serialize_uncompressed())?;
    to_checksum_address(&hex::encode(address.as_bytes()))
}

/// Generate a random nonce for replay protection: 16 bytes, hex encoded
pub fn generate_nonce() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether a string is a 20-byte hex address (checksum not enforced)
pub fn is_valid_address(address: &str) -> bool {
    address.starts_with("0x") && parse_address(address).is_ok()
}

fn parse_private_key(private_key: &str) -> Result<SecretKey> {
    let private_key_bytes = hex::decode(private_key.trim().trim_start_matches("0x"))
        .map_err(|_| X402Error::invalid_signature("Invalid hex private key"))?;

    SecretKey::from_slice(&private_key_bytes)
        .map_err(|_| X402Error::invalid_signature("Invalid private key"))
}

/// Convert an uncompressed SEC1 public key to an Ethereum address
fn ethereum_address_from_uncompressed(pubkey_bytes: &[u8]) -> Result<Address> {
    if pubkey_bytes.len() != 65 {
        return Err(X402Error::invalid_signature("Invalid public key length"));
    }

    // Drop the 0x04 tag, hash the 64-byte point, keep the last 20 bytes
    let pubkey_hash = keccak256(&pubkey_bytes[1..]);
    Ok(Address::from_slice(&pubkey_hash[12..]))
}
