// src/blockchain/ledger.rs
//! External commit targets for registry transitions.
//!
//! When a ledger is configured the registry submits each transition here
//! first and only updates its local store once the ledger reports
//! [`Committed`]. The local store then acts as a read cache of ledger state.
//!
//! Retry policy belongs to adapters, never to the registry: wrap an adapter in
//! [`Retrying`] to retry retryable failures with backoff.

use crate::error::SubmissionError;
use crate::models::operation::Transition;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Confirmation that a transition was committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Ledger-side reference, e.g. a transaction hash. `None` for local-only
    /// commits.
    pub reference: Option<String>,
    pub committed_at: DateTime<Utc>,
}

impl Committed {
    pub fn now(reference: Option<String>) -> Self {
        Committed { reference, committed_at: Utc::now() }
    }
}

/// Pluggable persistence capability.
///
/// Implementations must make `submit` idempotent per (did, operation) so a
/// caller retrying after a retryable failure cannot apply a transition twice.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    async fn submit(&self, transition: &Transition<'_>) -> Result<Committed, SubmissionError>;
}

/// No external ledger: every transition commits immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalOnly;

#[async_trait]
impl LedgerAdapter for LocalOnly {
    async fn submit(&self, _transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
        Ok(Committed::now(None))
    }
}

/// Retries retryable failures of the wrapped adapter with exponential
/// backoff.
///
/// Gives up after `max_attempts` submissions (at least one), surfacing the
/// last failure. Permanent failures are surfaced immediately.
pub struct Retrying<L> {
    inner: L,
    max_attempts: u32,
    backoff: Duration,
}

impl<L: LedgerAdapter> Retrying<L> {
    pub fn new(inner: L, max_attempts: u32, backoff: Duration) -> Self {
        Retrying { inner, max_attempts: max_attempts.max(1), backoff }
    }
}

#[async_trait]
impl<L: LedgerAdapter> LedgerAdapter for Retrying<L> {
    async fn submit(&self, transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.inner.submit(transition).await {
                Ok(committed) => return Ok(committed),
                Err(e) if e.retryable && attempt < self.max_attempts => {
                    log::warn!(
                        "{} {} submission attempt {}/{} failed: {}; retrying in {:?}",
                        transition.operation,
                        transition.did,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
