// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Uses Keccak-256 (Ethereum's standard hash function) for all operations.

use crate::models::operation::Transition;
use ethers::utils::keccak256;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// Digest an authorization proof signs for `transition` at `nonce`.
///
/// The preimage is `operation || 0x00 || did || 0x00 || payload || 0x00 ||
/// nonce (big-endian u64)`, binding the signature to the exact operation,
/// subject and payload being admitted.
pub fn authorization_digest(
    transition: &Transition<'_>,
    nonce: u64,
) -> Result<[u8; 32], serde_json::Error> {
    let payload = transition.payload_bytes()?;
    let operation = transition.operation.as_str().as_bytes();

    let mut preimage =
        Vec::with_capacity(operation.len() + transition.did.len() + payload.len() + 11);
    preimage.extend_from_slice(operation);
    preimage.push(0);
    preimage.extend_from_slice(transition.did.as_bytes());
    preimage.push(0);
    preimage.extend_from_slice(&payload);
    preimage.push(0);
    preimage.extend_from_slice(&nonce.to_be_bytes());

    Ok(hash_data(&preimage))
}
