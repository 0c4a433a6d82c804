// src/wallet/key_management.rs
//! Cryptographic key management for registry authorities.
//!
//! Holds the secp256k1 key of an authority allowed to approve registry
//! transitions, and turns approvals into [`Proof`]s that
//! [`crate::services::proof_gate::SignatureGate`] accepts.
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - Keccak-256 hashing (via `ethers` crate)
//! - Cryptographically secure random number generation

use crate::models::operation::Transition;
use crate::services::proof_gate::Proof;
use crate::utils::crypto::{authorization_digest, hash_data};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::{PublicKey, SecretKey};
use std::error::Error;

/// Secure key management system for elliptic curve cryptography.
///
/// # Security Notes
/// - Secret keys are never exposed publicly
/// - Signatures are deterministic ECDSA (RFC 6979) over Keccak-256 digests
#[derive(Clone)]
pub struct KeyManager {
    /// Securely stored private key (never exposed)
    secret_key: SecretKey,
    /// Derived public key for verification
    pub public_key: PublicKey,
}

impl KeyManager {
    /// Generates a new KeyManager with a fresh random secp256k1 key.
    pub fn new() -> Self {
        let secret_key = SecretKey::random(&mut rand::thread_rng());
        let public_key = secret_key.public_key();
        KeyManager { secret_key, public_key }
    }

    /// Restores a KeyManager from a hex-encoded 32-byte secret key (with or
    /// without 0x prefix).
    pub fn from_hex(secret_key_hex: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let bytes = hex::decode(secret_key_hex.trim_start_matches("0x"))?;
        let secret_key = SecretKey::from_slice(&bytes)?;
        let public_key = secret_key.public_key();
        Ok(KeyManager { secret_key, public_key })
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(&self.public_key)
    }

    /// Hex of the uncompressed SEC1 public key, the format `SignatureGate`
    /// is configured with.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.to_sec1_bytes())
    }

    /// Signs a message using ECDSA (secp256k1) with Keccak-256 prehashing.
    ///
    /// # Returns
    /// 64-byte compact ECDSA signature (R || S values)
    pub fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        self.sign_digest(&hash_data(message))
    }

    /// Produces the proof authorizing `transition` at `nonce`.
    ///
    /// The nonce must be higher than any nonce previously accepted for the
    /// transition's DID, or the gate treats the proof as replayed.
    pub fn sign_transition(
        &self,
        transition: &Transition<'_>,
        nonce: u64,
    ) -> Result<Proof, Box<dyn Error + Send + Sync>> {
        let digest = authorization_digest(transition, nonce)?;
        let signature = self.sign_digest(&digest)?;
        Ok(Proof { nonce, signature: hex::encode(signature) })
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>> {
        let signing_key = SigningKey::from(&self.secret_key);
        let signature: Signature = signing_key.sign_prehash(digest)?;
        Ok(signature.to_bytes().to_vec())
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}
