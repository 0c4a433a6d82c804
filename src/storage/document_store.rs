// src/storage/document_store.rs
//! Document storage for the registry.
//!
//! Two tables back every store:
//! - a primary table keyed by DID that owns one shared document per DID
//! - an alias table mapping alias names to the DID they stand for
//!
//! Aliases are resolved at read time, so a document replaced under its DID is
//! immediately visible through every alias. Stores enforce no uniqueness
//! rules; [`crate::registry::RegistryCore`] checks existence before writing.

use crate::error::RegistryError;
use crate::models::did::DIDDocument;
use dashmap::DashMap;
use std::sync::Arc;

/// Storage backend contract.
pub trait DocumentStore: Send + Sync {
    /// Returns `true` if `key` is a registered DID or alias.
    fn exists(&self, key: &str) -> bool;

    /// Resolves `key` (DID or alias) to the DID owning the document.
    fn canonical(&self, key: &str) -> Option<String>;

    /// Fetches the document reachable through `key`.
    ///
    /// # Errors
    /// `NotFound` when `key` is neither a DID nor an alias.
    fn get(&self, key: &str) -> Result<Arc<DIDDocument>, RegistryError>;

    /// Stores `document` under the DID `key`, replacing any previous value.
    fn put(&self, key: &str, document: Arc<DIDDocument>) -> Result<(), RegistryError>;

    /// Records that `alias` resolves to the DID `target`.
    fn alias(&self, alias: &str, target: &str) -> Result<(), RegistryError>;
}

/// In-memory store over sharded concurrent maps.
///
/// Writes to one key only contend with keys hashed to the same shard, and a
/// reader always sees either the previous or the next `Arc`, never a partly
/// written document.
#[derive(Default)]
pub struct MemoryStore {
    documents: DashMap<String, Arc<DIDDocument>>,
    aliases: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered DIDs (aliases excluded).
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Copies both tables out, used by durable backends to snapshot state.
    pub(crate) fn tables(&self) -> (Vec<(String, DIDDocument)>, Vec<(String, String)>) {
        let documents = self
            .documents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().as_ref().clone()))
            .collect();
        let aliases = self
            .aliases
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        (documents, aliases)
    }
}

impl DocumentStore for MemoryStore {
    fn exists(&self, key: &str) -> bool {
        self.documents.contains_key(key) || self.aliases.contains_key(key)
    }

    fn canonical(&self, key: &str) -> Option<String> {
        if self.documents.contains_key(key) {
            return Some(key.to_owned());
        }
        self.aliases.get(key).map(|target| target.value().clone())
    }

    fn get(&self, key: &str) -> Result<Arc<DIDDocument>, RegistryError> {
        let did = self
            .canonical(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_owned()))?;
        self.documents
            .get(&did)
            .map(|document| Arc::clone(document.value()))
            .ok_or_else(|| RegistryError::NotFound(key.to_owned()))
    }

    fn put(&self, key: &str, document: Arc<DIDDocument>) -> Result<(), RegistryError> {
        self.documents.insert(key.to_owned(), document);
        Ok(())
    }

    fn alias(&self, alias: &str, target: &str) -> Result<(), RegistryError> {
        self.aliases.insert(alias.to_owned(), target.to_owned());
        Ok(())
    }
}
