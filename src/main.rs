// src/main.rs

//! # DID Registry - Main Entry Point
//!
//! Builds a [`RegistryCore`] from [`Settings`] and serves it over HTTP.
//!
//! ## Initialization Sequence
//! 1. Load `.env` and the layered settings
//! 2. Open the configured document store
//! 3. Install the proof gate and, if enabled, the zkSync ledger
//! 4. Start the API server
//!
//! ## Environment Variables
//! - `DID_REGISTRY_CONFIG`: (Optional) config file path (default: registry.toml)
//! - `DID_REGISTRY__*`: overrides for any setting, e.g. `DID_REGISTRY__LEDGER__PRIVATE_KEY`
//! - `RUST_LOG`: log filter (default: info)

use anyhow::{anyhow, Context};
use did_registry::blockchain::ledger::Retrying;
use did_registry::blockchain::zksync_client::ZkSyncClient;
use did_registry::blockchain::zksync_ledger::ZkSyncLedger;
use did_registry::config::{Settings, StorageBackend};
use did_registry::services::api_server::ApiServer;
use did_registry::services::proof_gate::SignatureGate;
use did_registry::storage::{DocumentStore, JsonFileStore, MemoryStore};
use did_registry::RegistryCore;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load settings")?;

    let store: Arc<dyn DocumentStore> = match settings.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(JsonFileStore::open(&settings.storage.path)?),
    };
    log::info!("using {:?} document store", settings.storage.backend);

    let mut registry = RegistryCore::new(store)
        .with_timeouts(settings.proof_gate.timeout(), settings.ledger.timeout());

    if let Some(authority) = &settings.proof_gate.authority_public_key {
        let gate = SignatureGate::from_hex(authority).map_err(|e| anyhow!(e))?;
        registry = registry.with_proof_gate(Arc::new(gate));
        log::info!("signature proof gate enabled");
    } else {
        log::warn!("no authority key configured; all mutations are trusted");
    }

    if settings.ledger.enabled {
        let ledger = &settings.ledger;
        let private_key = ledger
            .private_key
            .as_deref()
            .context("ledger.private_key must be set when the ledger is enabled")?;
        let contract_address = ledger
            .contract_address
            .as_deref()
            .context("ledger.contract_address must be set when the ledger is enabled")?;

        // Initialize the ZkSync client
        let client = ZkSyncClient::new(&ledger.rpc_url, private_key)
            .await
            .map_err(|e| anyhow!("failed to initialize ZkSyncClient: {}", e))?;
        log::info!("committing to {} from {:?}", contract_address, client.get_address());

        let adapter = ZkSyncLedger::new(Arc::new(client), contract_address);
        registry = registry.with_ledger(Arc::new(Retrying::new(
            adapter,
            ledger.max_attempts,
            ledger.backoff(),
        )));
    }

    let addr: SocketAddr = settings
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_address))?;

    ApiServer::new(Arc::new(registry)).run(addr).await?;
    Ok(())
}
