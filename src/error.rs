// src/error.rs
//! Error types surfaced by the registry.
//!
//! Every failure is reported to the immediate caller; nothing here is retried
//! inside the registry.

use thiserror::Error;

/// Failure of a registry operation.
///
/// No variant implies a partial write: whichever step fails, the store is
/// left exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The DID or alias name is already registered.
    #[error("`{0}` is already registered")]
    AlreadyExists(String),

    /// No DID or alias with this name exists.
    #[error("`{0}` is not registered")]
    NotFound(String),

    /// Creation input lists the same public key id twice.
    #[error("public key id `{0}` appears more than once")]
    DuplicateKeyId(String),

    /// Creation input lists the same service id twice.
    #[error("service id `{0}` appears more than once")]
    DuplicateServiceId(String),

    #[error("public key `{0}` already exists")]
    KeyAlreadyExists(String),

    #[error("service `{0}` already exists")]
    ServiceAlreadyExists(String),

    /// The proof gate declined the transition.
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),

    /// The ledger adapter did not commit the transition.
    #[error("ledger submission failed (retryable: {retryable}): {reason}")]
    SubmissionFailed { retryable: bool, reason: String },

    /// The storage backend could not persist or load state.
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Error reported by a [`crate::blockchain::ledger::LedgerAdapter`].
///
/// Adapters must make `submit` idempotent per (did, operation) for a retry
/// after a `retryable` failure to be safe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SubmissionError {
    pub retryable: bool,
    pub reason: String,
}

impl SubmissionError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        SubmissionError { retryable: true, reason: reason.into() }
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        SubmissionError { retryable: false, reason: reason.into() }
    }
}

impl From<SubmissionError> for RegistryError {
    fn from(e: SubmissionError) -> Self {
        RegistryError::SubmissionFailed { retryable: e.retryable, reason: e.reason }
    }
}
