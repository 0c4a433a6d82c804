// src/lib.rs

//! # DID Registry
//!
//! A registry of DID documents with alias names, append-only key and service
//! sets, pluggable authorization and an optional zkSync ledger.
//!
//! ## Layout
//! 1. **Registry Layer**: `RegistryCore` orchestration and document invariants
//! 2. **Storage Layer**: in-memory and JSON-file document stores
//! 3. **Services Layer**: proof gates and the HTTP API
//! 4. **Blockchain Layer**: ledger adapters, including zkSync Era
//! 5. **Wallet Layer**: secp256k1 keys for signing authorization proofs

pub mod blockchain; // Ledger adapters and zkSync interactions
pub mod config; // Layered runtime settings
pub mod error; // Registry error types
pub mod models; // Data structures
pub mod registry; // Registry orchestration
pub mod services; // Proof gates and API
pub mod storage; // Document stores
pub mod utils; // Helper functions
pub mod wallet; // Cryptographic key operations

pub use error::{RegistryError, SubmissionError};
pub use models::did::{DIDDocument, PublicKey, Service};
pub use registry::RegistryCore;
pub use storage::{DocumentStore, JsonFileStore, MemoryStore};
