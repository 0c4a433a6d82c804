// src/config.rs
//! Runtime configuration.
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. built-in defaults
//! 2. an optional config file (`registry.toml` by default, or the path in
//!    `DID_REGISTRY_CONFIG`)
//! 3. environment variables prefixed `DID_REGISTRY__`, with `__` separating
//!    nesting levels, e.g. `DID_REGISTRY__LEDGER__ENABLED=true`
//!
//! A `.env` file is loaded into the environment first by the binary.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Address the HTTP API listens on
    pub bind_address: String,
    pub storage: StorageSettings,
    pub proof_gate: ProofGateSettings,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Snapshot file used by the `file` backend
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProofGateSettings {
    /// Hex SEC1 public key of the authority; enables signature checks when set
    pub authority_public_key: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub enabled: bool,
    pub rpc_url: String,
    /// Address of the deployed DIDRegistry contract
    pub contract_address: Option<String>,
    /// Hex-encoded wallet private key used to sign transactions
    pub private_key: Option<String>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl ProofGateSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl LedgerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Settings {
    /// Loads settings from defaults, the config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DID_REGISTRY_CONFIG").unwrap_or_else(|_| "registry.toml".into());
        Self::build(Some(Path::new(&path)), true)
    }

    /// Loads settings from defaults and `file` only, ignoring the
    /// environment.
    pub fn from_file(file: &Path) -> Result<Self, ConfigError> {
        Self::build(Some(file), false)
    }

    /// Built-in defaults alone.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::build(None, false)
    }

    fn build(file: Option<&Path>, with_env: bool) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("bind_address", "127.0.0.1:3000")?
            .set_default("storage.backend", "memory")?
            .set_default("storage.path", "registry.json")?
            .set_default("proof_gate.timeout_ms", 10_000_i64)?
            .set_default("ledger.enabled", false)?
            .set_default("ledger.rpc_url", "https://sepolia.era.zksync.dev")?
            .set_default("ledger.timeout_ms", 60_000_i64)?
            .set_default("ledger.max_attempts", 3_i64)?
            .set_default("ledger.backoff_ms", 500_i64)?;

        if let Some(file) = file {
            builder = builder.add_source(File::from(file).required(false));
        }
        if with_env {
            builder = builder.add_source(Environment::with_prefix("DID_REGISTRY").separator("__"));
        }

        builder.build()?.try_deserialize()
    }
}
