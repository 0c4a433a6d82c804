// src/blockchain/zksync_ledger.rs
//! Ledger adapter committing registry transitions to a DID Registry contract
//! on zkSync Era.
//!
//! Contract calls per operation:
//! - `Create` → `createDID(did, documentJson)`
//! - `AddKey` / `AddService` → `updateDID(did, documentJson)`
//! - `RegisterName` → `registerName(name, did)`
//!
//! A transition counts as committed only once its transaction is mined with
//! a success status. Failures that leave nothing on chain (not sent, dropped
//! from the mempool) are retryable. A revert, a malformed call, or a sent
//! transaction whose outcome cannot be observed is permanent, since sending
//! it again could apply it twice.

use crate::blockchain::ledger::{Committed, LedgerAdapter};
use crate::blockchain::zksync_client::{TxError, ZkSyncClient};
use crate::error::SubmissionError;
use crate::models::operation::{OperationKind, Payload, Transition};
use crate::utils::serialization::serialize;
use async_trait::async_trait;
use ethers_core::types::TransactionReceipt;
use std::sync::Arc;

const DID_REGISTRY_ABI: &[u8] = include_bytes!("abi/DIDRegistry.json");

pub struct ZkSyncLedger {
    client: Arc<ZkSyncClient>,
    /// Hex address of the deployed DIDRegistry contract
    contract_address: String,
}

impl ZkSyncLedger {
    pub fn new(client: Arc<ZkSyncClient>, contract_address: impl Into<String>) -> Self {
        ZkSyncLedger { client, contract_address: contract_address.into() }
    }
}

/// Maps a transition onto the contract method and its two string arguments.
fn contract_call(
    transition: &Transition<'_>,
) -> Result<(&'static str, (String, String)), SubmissionError> {
    match (transition.operation, transition.payload) {
        (OperationKind::RegisterName, Payload::Alias(name)) => {
            Ok(("registerName", (name.to_owned(), transition.did.to_owned())))
        }
        (operation, Payload::Document(document)) if operation != OperationKind::RegisterName => {
            let json = serialize(document).map_err(|e| SubmissionError::permanent(e.to_string()))?;
            let method = if operation == OperationKind::Create { "createDID" } else { "updateDID" };
            Ok((method, (transition.did.to_owned(), json)))
        }
        (operation, _) => Err(SubmissionError::permanent(format!(
            "{} transition carries the wrong payload",
            operation
        ))),
    }
}

#[async_trait]
impl LedgerAdapter for ZkSyncLedger {
    async fn submit(&self, transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
        let (method, params) = contract_call(transition)?;
        log::debug!("submitting {} for {} to {}", method, transition.did, self.contract_address);

        let outcome = self
            .client
            .send_transaction(&self.contract_address, DID_REGISTRY_ABI, method, params)
            .await;
        commitment(outcome)
    }
}

/// Decides whether a transaction outcome commits the transition.
fn commitment(outcome: Result<TransactionReceipt, TxError>) -> Result<Committed, SubmissionError> {
    let receipt = outcome.map_err(|e| match e {
        TxError::NotSent(_) | TxError::Dropped(_) => SubmissionError::retryable(e.to_string()),
        TxError::Invalid(_) | TxError::Unconfirmed { .. } => SubmissionError::permanent(e.to_string()),
    })?;

    let reference = format!("0x{:x}", receipt.transaction_hash);
    match receipt.status.map(|status| status.as_u64()) {
        Some(1) => Ok(Committed::now(Some(reference))),
        Some(_) => Err(SubmissionError::permanent(format!("transaction {} reverted", reference))),
        None => Err(SubmissionError::permanent(format!(
            "transaction {} has no status in its receipt",
            reference
        ))),
    }
}
