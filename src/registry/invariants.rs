// src/registry/invariants.rs
//! Pure document rules.
//!
//! These functions never touch storage. They take document fragments and
//! either return the next document value or say which id broke uniqueness.

use crate::error::RegistryError;
use crate::models::did::{DIDDocument, PublicKey, Service};
use std::collections::HashSet;

/// Builds the initial document for `did`, rejecting duplicate key or service
/// ids within the supplied lists.
pub fn validate_new_document(
    did: &str,
    context: Vec<String>,
    public_keys: Vec<PublicKey>,
    services: Vec<Service>,
) -> Result<DIDDocument, RegistryError> {
    if let Some(id) = first_duplicate(public_keys.iter().map(|k| k.id.as_str())) {
        return Err(RegistryError::DuplicateKeyId(id.to_owned()));
    }
    if let Some(id) = first_duplicate(services.iter().map(|s| s.id.as_str())) {
        return Err(RegistryError::DuplicateServiceId(id.to_owned()));
    }

    Ok(DIDDocument { context, id: did.to_owned(), public_keys, services })
}

/// Returns a copy of `document` with `key` appended after the existing keys.
pub fn append_key(document: &DIDDocument, key: PublicKey) -> Result<DIDDocument, RegistryError> {
    if document.has_key(&key.id) {
        return Err(RegistryError::KeyAlreadyExists(key.id));
    }
    let mut next = document.clone();
    next.public_keys.push(key);
    Ok(next)
}

/// Returns a copy of `document` with `service` appended after the existing
/// services.
pub fn append_service(
    document: &DIDDocument,
    service: Service,
) -> Result<DIDDocument, RegistryError> {
    if document.has_service(&service.id) {
        return Err(RegistryError::ServiceAlreadyExists(service.id));
    }
    let mut next = document.clone();
    next.services.push(service);
    Ok(next)
}

fn first_duplicate<'a>(ids: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}
