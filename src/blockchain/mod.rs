// src/blockchain/mod.rs
//! Ledger adapters and the zkSync client they can commit through.

pub mod ledger;
pub mod zksync_client;
pub mod zksync_ledger;
