// src/storage/file_store.rs
//! On-disk document store.
//!
//! Keeps the same two tables as [`MemoryStore`] and mirrors them into a
//! single JSON snapshot file. Every write produces the next snapshot, writes
//! it to a temporary sibling file and renames it over the old one; only after
//! the rename succeeds do the in-memory tables change. A failed write leaves
//! both the file and memory at the previous state.

use crate::error::RegistryError;
use crate::models::did::DIDDocument;
use crate::storage::document_store::{DocumentStore, MemoryStore};
use crate::utils::serialization::{deserialize, serialize_pretty};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Layout of the snapshot file.
#[derive(Serialize, Deserialize, Debug, Default)]
struct Snapshot {
    documents: BTreeMap<String, DIDDocument>,
    aliases: BTreeMap<String, String>,
}

/// Durable store backed by a JSON snapshot file.
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    /// Serializes snapshot writes so two writers never race on the file.
    flush: Mutex<()>,
}

impl JsonFileStore {
    /// Opens the store at `path`, loading the snapshot if the file exists.
    ///
    /// # Errors
    /// `Storage` if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let inner = MemoryStore::new();

        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| storage_error(&path, e))?;
            let snapshot: Snapshot = deserialize(&raw).map_err(|e| storage_error(&path, e))?;
            for (did, document) in snapshot.documents {
                inner.put(&did, Arc::new(document))?;
            }
            for (alias, target) in snapshot.aliases {
                inner.alias(&alias, &target)?;
            }
            log::info!("loaded {} DID documents from {}", inner.len(), path.display());
        }

        Ok(JsonFileStore { path, inner, flush: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn snapshot(&self) -> Snapshot {
        let (documents, aliases) = self.inner.tables();
        Snapshot {
            documents: documents.into_iter().collect(),
            aliases: aliases.into_iter().collect(),
        }
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), RegistryError> {
        let body = serialize_pretty(snapshot).map_err(|e| storage_error(&self.path, e))?;
        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp).map_err(|e| storage_error(&tmp, e))?;
        file.write_all(body.as_bytes()).map_err(|e| storage_error(&tmp, e))?;
        file.sync_all().map_err(|e| storage_error(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| storage_error(&self.path, e))?;
        sync_parent(&self.path)
    }
}

impl DocumentStore for JsonFileStore {
    fn exists(&self, key: &str) -> bool {
        self.inner.exists(key)
    }

    fn canonical(&self, key: &str) -> Option<String> {
        self.inner.canonical(key)
    }

    fn get(&self, key: &str) -> Result<Arc<DIDDocument>, RegistryError> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, document: Arc<DIDDocument>) -> Result<(), RegistryError> {
        let _guard = self.flush.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = self.snapshot();
        snapshot.documents.insert(key.to_owned(), document.as_ref().clone());
        self.persist(&snapshot)?;
        self.inner.put(key, document)
    }

    fn alias(&self, alias: &str, target: &str) -> Result<(), RegistryError> {
        let _guard = self.flush.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = self.snapshot();
        snapshot.aliases.insert(alias.to_owned(), target.to_owned());
        self.persist(&snapshot)?;
        self.inner.alias(alias, target)
    }
}

/// Flushes the directory entry created by the rename.
#[cfg(unix)]
fn sync_parent(path: &Path) -> Result<(), RegistryError> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    File::open(dir)
        .and_then(|dir| dir.sync_all())
        .map_err(|e| storage_error(dir, e))
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

fn storage_error(path: &Path, e: impl std::fmt::Display) -> RegistryError {
    RegistryError::Storage(format!("{}: {}", path.display(), e))
}
