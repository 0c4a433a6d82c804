// src/models/did.rs
//! Decentralized Identifier (DID) data model implementation.
//!
//! Defines the DID Document held by the registry together with its two kinds
//! of entries: public keys and service endpoints. Field names on the wire
//! follow the registry's contract drafts (`@context`, `publicKeys`,
//! `service`).

use serde::{Deserialize, Serialize};

/// A public key entry of a DID Document.
///
/// # Fields
/// - `id`: Key identifier, unique within one document
/// - `type_`: Key type tag (e.g. `Ed25519`)
/// - `controller`: DID controlling this key
/// - `public_key_hex`: Hex-encoded key material
///
/// Entries are immutable once created; a document only ever gains new ones.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Key identifier
    /// Example: "did:example:123#keys-1"
    pub id: String,

    /// Key type tag
    #[serde(rename = "type")]
    pub type_: String,

    /// DID of the key's controller
    pub controller: String,

    /// Hex-encoded public key material
    #[serde(rename = "publicKeyHex")]
    pub public_key_hex: String,
}

/// A service endpoint entry of a DID Document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Service identifier, unique within one document
    pub id: String,

    /// Service type tag
    #[serde(rename = "type")]
    pub type_: String,

    /// URI for interacting with the DID subject
    /// Example: "https://example.com/did-ops"
    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

/// A DID Document representing a decentralized identity.
///
/// # Fields
/// - `context`: JSON-LD contexts, order-significant, duplicates permitted
/// - `id`: The subject DID, fixed at creation
/// - `public_keys`: Append-only list of keys with distinct ids
/// - `services`: Append-only list of services with distinct ids
///
/// # DID Format
/// The `id` field should follow DID syntax:
/// ```text
/// did:<method>:<method-specific-id>
/// ```
///
/// Documents are never edited in place. The registry derives a new value for
/// every mutation (see [`crate::registry::invariants`]) and swaps it in.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DIDDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// The complete DID string identifier
    /// Example: "did:example:123456789abcdefghi"
    pub id: String,

    #[serde(rename = "publicKeys", default)]
    pub public_keys: Vec<PublicKey>,

    #[serde(rename = "service", default)]
    pub services: Vec<Service>,
}

impl DIDDocument {
    /// Returns `true` if a public key with `id` is present.
    pub fn has_key(&self, id: &str) -> bool {
        self.public_keys.iter().any(|k| k.id == id)
    }

    /// Returns `true` if a service with `id` is present.
    pub fn has_service(&self, id: &str) -> bool {
        self.services.iter().any(|s| s.id == id)
    }
}
