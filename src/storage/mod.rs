// src/storage/mod.rs
//! Storage backends implementing [`DocumentStore`].

pub mod document_store;
pub mod file_store;

pub use document_store::{DocumentStore, MemoryStore};
pub use file_store::JsonFileStore;
