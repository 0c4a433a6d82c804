// src/services/proof_gate.rs
//! Authorization of registry transitions.
//!
//! The registry asks a [`ProofGate`] whether a validated transition may be
//! committed. The gate runs after all structural checks pass and before any
//! write, so a rejected proof leaves nothing behind and a malformed request
//! never spends a valid proof.
//!
//! Two gates ship with the crate:
//! - [`TrustAll`]: accepts everything, used when no verification is configured
//! - [`SignatureGate`]: requires a secp256k1 signature from a configured
//!   authority key, bound to the exact transition and a per-DID nonce

use crate::models::operation::Transition;
use crate::utils::crypto::authorization_digest;
use async_trait::async_trait;
use dashmap::DashMap;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Caller-supplied authorization artifact.
///
/// # Fields
/// - `nonce`: Must exceed the last nonce accepted for the same DID
/// - `signature`: Hex-encoded 64-byte compact ECDSA signature (R || S) over
///   [`authorization_digest`]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    pub nonce: u64,
    pub signature: String,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Accepted,
    Rejected(String),
}

/// Pluggable authorization capability.
#[async_trait]
pub trait ProofGate: Send + Sync {
    /// Decides whether `transition` may be committed.
    ///
    /// `proof` is whatever the caller supplied, if anything.
    async fn authorize(&self, transition: &Transition<'_>, proof: Option<&Proof>) -> Authorization;
}

/// Unconditional trust. Every transition is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustAll;

#[async_trait]
impl ProofGate for TrustAll {
    async fn authorize(&self, _transition: &Transition<'_>, _proof: Option<&Proof>) -> Authorization {
        Authorization::Accepted
    }
}

/// Gate requiring an ECDSA signature from a single authority key.
///
/// Replay protection is a per-DID high-water mark: a proof is accepted only
/// if its nonce is strictly greater than the last accepted nonce for the
/// transition's DID. The mark advances only on acceptance.
pub struct SignatureGate {
    authority: VerifyingKey,
    nonces: DashMap<String, u64>,
}

impl SignatureGate {
    pub fn new(authority: VerifyingKey) -> Self {
        SignatureGate { authority, nonces: DashMap::new() }
    }

    /// Builds a gate from a hex-encoded SEC1 public key (compressed or not).
    pub fn from_hex(public_key_hex: &str) -> Result<Self, String> {
        let bytes = hex::decode(public_key_hex.trim_start_matches("0x"))
            .map_err(|e| format!("Invalid hex public key: {}", e))?;
        let authority = VerifyingKey::from_sec1_bytes(&bytes)
            .map_err(|e| format!("Invalid secp256k1 public key: {}", e))?;
        Ok(Self::new(authority))
    }

    /// Last nonce accepted for `did`, if any.
    pub fn last_nonce(&self, did: &str) -> Option<u64> {
        self.nonces.get(did).map(|n| *n.value())
    }

    fn verify(&self, transition: &Transition<'_>, proof: &Proof) -> Result<(), String> {
        let bytes = hex::decode(proof.signature.trim_start_matches("0x"))
            .map_err(|e| format!("signature is not hex: {}", e))?;
        let signature =
            Signature::from_slice(&bytes).map_err(|e| format!("malformed signature: {}", e))?;
        let digest = authorization_digest(transition, proof.nonce)
            .map_err(|e| format!("cannot encode payload: {}", e))?;

        self.authority
            .verify_prehash(&digest, &signature)
            .map_err(|_| "signature does not match the authority key".to_string())
    }
}

#[async_trait]
impl ProofGate for SignatureGate {
    async fn authorize(&self, transition: &Transition<'_>, proof: Option<&Proof>) -> Authorization {
        let Some(proof) = proof else {
            return Authorization::Rejected("missing proof".into());
        };
        if let Err(reason) = self.verify(transition, proof) {
            return Authorization::Rejected(reason);
        }

        // check-and-advance under the entry lock so two racing proofs with
        // the same nonce cannot both pass
        let mut last = self.nonces.entry(transition.did.to_owned()).or_insert(0);
        if proof.nonce <= *last {
            return Authorization::Rejected(format!(
                "stale proof: nonce {} not above {}",
                proof.nonce, *last
            ));
        }
        *last = proof.nonce;
        Authorization::Accepted
    }
}
