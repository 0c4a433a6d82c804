// src/models/operation.rs
//! Registry state transitions.
//!
//! A [`Transition`] is the unit both pluggable capabilities see: the proof
//! gate authorizes it and the ledger adapter commits it. It borrows the
//! proposed document so neither capability can alter what gets stored.

use crate::models::did::DIDDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of mutation being admitted.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    AddKey,
    AddService,
    RegisterName,
}

impl OperationKind {
    /// Stable tag used in logs and in the authorization digest.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::AddKey => "add_key",
            OperationKind::AddService => "add_service",
            OperationKind::RegisterName => "register_name",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transition carries besides its DID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Full document after the mutation (`Create`, `AddKey`, `AddService`).
    Document(&'a DIDDocument),
    /// Alias name being bound to the transition's DID (`RegisterName`).
    Alias(&'a str),
}

/// A validated, not yet committed, registry mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<'a> {
    pub operation: OperationKind,
    /// Canonical DID the mutation applies to.
    pub did: &'a str,
    pub payload: Payload<'a>,
}

impl<'a> Transition<'a> {
    pub fn document(operation: OperationKind, did: &'a str, document: &'a DIDDocument) -> Self {
        Transition { operation, did, payload: Payload::Document(document) }
    }

    pub fn alias(name: &'a str, did: &'a str) -> Self {
        Transition { operation: OperationKind::RegisterName, did, payload: Payload::Alias(name) }
    }

    /// Bytes the payload is bound by when signing or submitting.
    ///
    /// Documents are encoded as JSON in field declaration order; aliases as
    /// their raw name.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self.payload {
            Payload::Document(document) => serde_json::to_vec(document),
            Payload::Alias(name) => Ok(name.as_bytes().to_vec()),
        }
    }
}
