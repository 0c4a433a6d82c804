// src/registry/registrar.rs
//! Registry orchestration.
//!
//! Every mutation follows the same sequence:
//! 1. take the per-key lock of the DID (or name) being written
//! 2. check structural preconditions against the store
//! 3. compute the next document with [`invariants`]
//! 4. ask the [`ProofGate`] to authorize the transition
//! 5. submit it to the [`LedgerAdapter`]
//! 6. write it to the [`DocumentStore`]
//!
//! Steps 1-5 have no visible effect, so a failure or a dropped future at any
//! point before step 6 leaves the registry unchanged. Step 6 runs without an
//! await point.

use crate::blockchain::ledger::{LedgerAdapter, LocalOnly};
use crate::error::RegistryError;
use crate::models::did::{DIDDocument, PublicKey, Service};
use crate::models::operation::{OperationKind, Transition};
use crate::registry::invariants;
use crate::services::proof_gate::{Authorization, Proof, ProofGate, TrustAll};
use crate::storage::document_store::DocumentStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::timeout;

const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(60);

/// The DID registry.
///
/// Writers to the same key are serialized through a per-key async mutex;
/// writers to different keys and all readers proceed independently.
pub struct RegistryCore {
    store: Arc<dyn DocumentStore>,
    gate: Arc<dyn ProofGate>,
    ledger: Arc<dyn LedgerAdapter>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    gate_timeout: Duration,
    ledger_timeout: Duration,
}

impl RegistryCore {
    /// Creates a registry over `store` that trusts every caller and commits
    /// locally only.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        RegistryCore {
            store,
            gate: Arc::new(TrustAll),
            ledger: Arc::new(LocalOnly),
            locks: DashMap::new(),
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            ledger_timeout: DEFAULT_LEDGER_TIMEOUT,
        }
    }

    pub fn with_proof_gate(mut self, gate: Arc<dyn ProofGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn LedgerAdapter>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Bounds on how long the proof gate and ledger may take. An elapsed
    /// bound counts as a rejection or a retryable submission failure.
    pub fn with_timeouts(mut self, gate: Duration, ledger: Duration) -> Self {
        self.gate_timeout = gate;
        self.ledger_timeout = ledger;
        self
    }

    /// Attaches a caller-supplied proof to the next mutation.
    pub fn with_proof(&self, proof: Proof) -> Authorized<'_> {
        Authorized { registry: self, proof }
    }

    /// Registers a new DID document.
    ///
    /// # Errors
    /// - `AlreadyExists` if `did` is a registered DID or alias
    /// - `DuplicateKeyId` / `DuplicateServiceId` for repeated ids in the input
    /// - `AuthorizationRejected`, `SubmissionFailed`, `Storage` from the commit
    pub async fn create(
        &self,
        did: &str,
        context: Vec<String>,
        public_keys: Vec<PublicKey>,
        services: Vec<Service>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.create_inner(did, context, public_keys, services, None).await
    }

    /// Appends `key` to the document reachable through `did` (a DID or alias).
    ///
    /// # Errors
    /// - `NotFound` if no DID or alias is registered under that name
    /// - `KeyAlreadyExists` if the document already has a key with this id
    pub async fn add_public_key(
        &self,
        did: &str,
        key: PublicKey,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.add_public_key_inner(did, key, None).await
    }

    /// Appends `service` to the document reachable through `did`.
    ///
    /// # Errors
    /// - `NotFound` if no DID or alias is registered under that name
    /// - `ServiceAlreadyExists` if the document already has a service with this id
    pub async fn add_service(
        &self,
        did: &str,
        service: Service,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.add_service_inner(did, service, None).await
    }

    /// Resolves a DID or alias to its current document.
    pub fn get_document(&self, key: &str) -> Result<Arc<DIDDocument>, RegistryError> {
        self.store.get(key)
    }

    /// Registers `name` as an alias for `did`.
    ///
    /// If `did` is itself an alias, `name` is bound to the DID behind it.
    ///
    /// # Errors
    /// - `AlreadyExists` if `name` is a registered DID or alias
    /// - `NotFound` if `did` is not registered
    pub async fn register_name(&self, name: &str, did: &str) -> Result<(), RegistryError> {
        self.register_name_inner(name, did, None).await
    }

    async fn create_inner(
        &self,
        did: &str,
        context: Vec<String>,
        public_keys: Vec<PublicKey>,
        services: Vec<Service>,
        proof: Option<&Proof>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        let _guard = self.lock(did).await;
        if self.store.exists(did) {
            return Err(RegistryError::AlreadyExists(did.to_owned()));
        }

        let document = invariants::validate_new_document(did, context, public_keys, services)?;
        self.commit_document(OperationKind::Create, did, document, proof).await
    }

    async fn add_public_key_inner(
        &self,
        key_or_alias: &str,
        key: PublicKey,
        proof: Option<&Proof>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        let did = self.resolve(key_or_alias)?;
        let _guard = self.lock(&did).await;

        let current = self.store.get(&did)?;
        let next = invariants::append_key(&current, key)?;
        self.commit_document(OperationKind::AddKey, &did, next, proof).await
    }

    async fn add_service_inner(
        &self,
        key_or_alias: &str,
        service: Service,
        proof: Option<&Proof>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        let did = self.resolve(key_or_alias)?;
        let _guard = self.lock(&did).await;

        let current = self.store.get(&did)?;
        let next = invariants::append_service(&current, service)?;
        self.commit_document(OperationKind::AddService, &did, next, proof).await
    }

    async fn register_name_inner(
        &self,
        name: &str,
        did: &str,
        proof: Option<&Proof>,
    ) -> Result<(), RegistryError> {
        let _guard = self.lock(name).await;
        if self.store.exists(name) {
            return Err(RegistryError::AlreadyExists(name.to_owned()));
        }
        let target = self.resolve(did)?;

        let transition = Transition::alias(name, &target);
        self.authorize(&transition, proof).await?;
        self.submit(&transition).await?;
        self.store.alias(name, &target)?;

        log::info!("registered name {} for {}", name, target);
        Ok(())
    }

    /// Authorizes, submits and stores `document` under `did`.
    ///
    /// Callers must hold the lock for `did`.
    async fn commit_document(
        &self,
        operation: OperationKind,
        did: &str,
        document: DIDDocument,
        proof: Option<&Proof>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        let transition = Transition::document(operation, did, &document);
        self.authorize(&transition, proof).await?;
        self.submit(&transition).await?;

        let document = Arc::new(document);
        self.store.put(did, Arc::clone(&document))?;

        log::info!(
            "{} committed for {} ({} keys, {} services)",
            operation,
            did,
            document.public_keys.len(),
            document.services.len()
        );
        Ok(document)
    }

    async fn authorize(
        &self,
        transition: &Transition<'_>,
        proof: Option<&Proof>,
    ) -> Result<(), RegistryError> {
        match timeout(self.gate_timeout, self.gate.authorize(transition, proof)).await {
            Ok(Authorization::Accepted) => Ok(()),
            Ok(Authorization::Rejected(reason)) => {
                log::warn!("{} for {} rejected: {}", transition.operation, transition.did, reason);
                Err(RegistryError::AuthorizationRejected(reason))
            }
            Err(_) => {
                log::warn!("{} for {}: proof gate timed out", transition.operation, transition.did);
                Err(RegistryError::AuthorizationRejected(format!(
                    "proof gate timed out after {:?}",
                    self.gate_timeout
                )))
            }
        }
    }

    async fn submit(&self, transition: &Transition<'_>) -> Result<(), RegistryError> {
        match timeout(self.ledger_timeout, self.ledger.submit(transition)).await {
            Ok(Ok(committed)) => {
                if let Some(reference) = &committed.reference {
                    log::debug!(
                        "{} for {} committed to ledger as {}",
                        transition.operation,
                        transition.did,
                        reference
                    );
                }
                Ok(())
            }
            Ok(Err(e)) => {
                log::warn!("{} for {} not committed: {}", transition.operation, transition.did, e);
                Err(e.into())
            }
            Err(_) => {
                log::warn!("{} for {}: ledger timed out", transition.operation, transition.did);
                Err(RegistryError::SubmissionFailed {
                    retryable: true,
                    reason: format!("ledger timed out after {:?}", self.ledger_timeout),
                })
            }
        }
    }

    fn resolve(&self, key: &str) -> Result<String, RegistryError> {
        self.store
            .canonical(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_owned()))
    }

    async fn lock(&self, key: &str) -> KeyLock<'_> {
        // created before waiting so a caller dropped mid-wait still prunes
        let mut held = KeyLock { guard: None, locks: &self.locks, key: key.to_owned() };
        let lock = Arc::clone(self.locks.entry(key.to_owned()).or_default().value());
        held.guard = Some(lock.lock_owned().await);
        held
    }
}

/// Exclusive hold on one key of the lock table.
///
/// On release the entry is removed unless another caller still holds or
/// awaits the same mutex, so the table only holds keys in use.
struct KeyLock<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Mutations carrying a caller-supplied proof for the [`ProofGate`].
///
/// Obtained from [`RegistryCore::with_proof`].
pub struct Authorized<'a> {
    registry: &'a RegistryCore,
    proof: Proof,
}

impl Authorized<'_> {
    pub async fn create(
        &self,
        did: &str,
        context: Vec<String>,
        public_keys: Vec<PublicKey>,
        services: Vec<Service>,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.registry
            .create_inner(did, context, public_keys, services, Some(&self.proof))
            .await
    }

    pub async fn add_public_key(
        &self,
        did: &str,
        key: PublicKey,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.registry.add_public_key_inner(did, key, Some(&self.proof)).await
    }

    pub async fn add_service(
        &self,
        did: &str,
        service: Service,
    ) -> Result<Arc<DIDDocument>, RegistryError> {
        self.registry.add_service_inner(did, service, Some(&self.proof)).await
    }

    pub async fn register_name(&self, name: &str, did: &str) -> Result<(), RegistryError> {
        self.registry.register_name_inner(name, did, Some(&self.proof)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::ledger::Committed;
    use crate::error::SubmissionError;
    use crate::services::proof_gate::SignatureGate;
    use crate::storage::document_store::MemoryStore;
    use crate::wallet::key_management::KeyManager;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn key(id: &str) -> PublicKey {
        PublicKey {
            id: id.into(),
            type_: "Ed25519".into(),
            controller: "did:example:1".into(),
            public_key_hex: "ab12".into(),
        }
    }

    fn service(id: &str) -> Service {
        Service {
            id: id.into(),
            type_: "LinkedDomains".into(),
            service_endpoint: "https://example.com".into(),
        }
    }

    fn key_ids(document: &DIDDocument) -> Vec<&str> {
        document.public_keys.iter().map(|k| k.id.as_str()).collect()
    }

    fn registry() -> RegistryCore {
        RegistryCore::new(Arc::new(MemoryStore::new()))
    }

    /// Gate that records what it saw and answers with a fixed verdict.
    struct Recorder {
        verdict: Authorization,
        seen: StdMutex<Vec<(OperationKind, String)>>,
    }

    impl Recorder {
        fn new(verdict: Authorization) -> Arc<Self> {
            Arc::new(Recorder { verdict, seen: StdMutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<(OperationKind, String)> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProofGate for Recorder {
        async fn authorize(&self, transition: &Transition<'_>, _proof: Option<&Proof>) -> Authorization {
            self.seen.lock().unwrap().push((transition.operation, transition.did.to_owned()));
            self.verdict.clone()
        }
    }

    /// Gate that accepts after a delay, widening race windows.
    struct Slow(Duration);

    #[async_trait]
    impl ProofGate for Slow {
        async fn authorize(&self, _transition: &Transition<'_>, _proof: Option<&Proof>) -> Authorization {
            tokio::time::sleep(self.0).await;
            Authorization::Accepted
        }
    }

    struct FailingLedger(SubmissionError);

    #[async_trait]
    impl LedgerAdapter for FailingLedger {
        async fn submit(&self, _transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
            Err(self.0.clone())
        }
    }

    /// Ledger that checks the local store has not been written yet.
    struct OrderCheck {
        store: Arc<MemoryStore>,
        observed: StdMutex<Vec<bool>>,
    }

    #[async_trait]
    impl LedgerAdapter for OrderCheck {
        async fn submit(&self, transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
            let already_local = match transition.payload {
                crate::models::operation::Payload::Document(document) => self
                    .store
                    .get(transition.did)
                    .map(|stored| *stored == *document)
                    .unwrap_or(false),
                crate::models::operation::Payload::Alias(name) => self.store.exists(name),
            };
            self.observed.lock().unwrap().push(already_local);
            Ok(Committed::now(Some("0xabc".into())))
        }
    }

    #[tokio::test]
    async fn test_create_once() {
        let registry = registry();
        let document = registry
            .create("did:example:1", vec!["ctx1".into()], vec![], vec![])
            .await
            .unwrap();
        assert_eq!(
            *document,
            DIDDocument {
                context: vec!["ctx1".into()],
                id: "did:example:1".into(),
                public_keys: vec![],
                services: vec![],
            }
        );

        let err = registry
            .create("did:example:1", vec!["other".into()], vec![key("k9")], vec![])
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyExists("did:example:1".into()));
        assert_eq!(*registry.get_document("did:example:1").unwrap(), *document);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_input_without_writing() {
        let registry = registry();
        let err = registry
            .create("did:example:1", vec![], vec![key("k1"), key("k1")], vec![])
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateKeyId("k1".into()));

        let err = registry
            .create("did:example:1", vec![], vec![], vec![service("s"), service("s")])
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateServiceId("s".into()));

        assert!(matches!(registry.get_document("did:example:1"), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_keys_append_in_call_order() {
        let registry = registry();
        registry.create("did:example:1", vec![], vec![key("k0")], vec![]).await.unwrap();

        for id in ["k1", "k2", "k3"] {
            registry.add_public_key("did:example:1", key(id)).await.unwrap();
        }
        let before = registry.get_document("did:example:1").unwrap();
        assert_eq!(key_ids(&before), ["k0", "k1", "k2", "k3"]);

        let err = registry.add_public_key("did:example:1", key("k2")).await.unwrap_err();
        assert_eq!(err, RegistryError::KeyAlreadyExists("k2".into()));
        let after = registry.get_document("did:example:1").unwrap();
        assert_eq!(
            serde_json::to_vec(&after.public_keys).unwrap(),
            serde_json::to_vec(&before.public_keys).unwrap()
        );
    }

    #[tokio::test]
    async fn test_add_service() {
        let registry = registry();
        registry.create("did:example:1", vec![], vec![], vec![service("s1")]).await.unwrap();

        let document = registry.add_service("did:example:1", service("s2")).await.unwrap();
        assert_eq!(document.services, vec![service("s1"), service("s2")]);

        assert_eq!(
            registry.add_service("did:example:1", service("s1")).await.unwrap_err(),
            RegistryError::ServiceAlreadyExists("s1".into())
        );
        assert_eq!(
            registry.add_service("did:example:2", service("s1")).await.unwrap_err(),
            RegistryError::NotFound("did:example:2".into())
        );
        assert_eq!(
            registry.add_public_key("did:example:2", key("k1")).await.unwrap_err(),
            RegistryError::NotFound("did:example:2".into())
        );
    }

    #[tokio::test]
    async fn test_alias_transparency() {
        let registry = registry();
        registry.create("did:example:1", vec!["ctx1".into()], vec![], vec![]).await.unwrap();
        registry.register_name("alice", "did:example:1").await.unwrap();
        assert_eq!(
            *registry.get_document("alice").unwrap(),
            *registry.get_document("did:example:1").unwrap()
        );

        registry.add_public_key("did:example:1", key("k1")).await.unwrap();
        assert_eq!(key_ids(&registry.get_document("alice").unwrap()), ["k1"]);

        // mutations through the alias land on the DID
        registry.add_service("alice", service("s1")).await.unwrap();
        assert_eq!(registry.get_document("did:example:1").unwrap().services, vec![service("s1")]);
    }

    #[tokio::test]
    async fn test_register_name_collisions() {
        let registry = registry();
        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();
        registry.create("did:example:2", vec![], vec![], vec![]).await.unwrap();
        registry.register_name("alice", "did:example:1").await.unwrap();

        assert_eq!(
            registry.register_name("alice", "did:example:2").await.unwrap_err(),
            RegistryError::AlreadyExists("alice".into())
        );
        assert_eq!(
            registry.register_name("did:example:2", "did:example:1").await.unwrap_err(),
            RegistryError::AlreadyExists("did:example:2".into())
        );
        assert_eq!(
            registry.register_name("bob", "did:example:404").await.unwrap_err(),
            RegistryError::NotFound("did:example:404".into())
        );
        // a DID cannot be created over a live alias either
        assert_eq!(
            registry.create("alice", vec![], vec![], vec![]).await.unwrap_err(),
            RegistryError::AlreadyExists("alice".into())
        );
        // alice still points where it did
        assert_eq!(registry.get_document("alice").unwrap().id, "did:example:1");
    }

    #[tokio::test]
    async fn test_alias_of_alias_binds_to_the_did() {
        let registry = registry();
        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();
        registry.register_name("alice", "did:example:1").await.unwrap();
        registry.register_name("al", "alice").await.unwrap();

        registry.add_public_key("did:example:1", key("k1")).await.unwrap();
        assert_eq!(key_ids(&registry.get_document("al").unwrap()), ["k1"]);
    }

    #[tokio::test]
    async fn test_gate_sees_canonical_did_and_rejection_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let open = RegistryCore::new(store.clone());
        open.create("did:example:1", vec![], vec![], vec![]).await.unwrap();
        open.register_name("alice", "did:example:1").await.unwrap();

        let recorder = Recorder::new(Authorization::Rejected("no".into()));
        let closed = RegistryCore::new(store.clone()).with_proof_gate(recorder.clone());

        assert_eq!(
            closed.add_public_key("alice", key("k1")).await.unwrap_err(),
            RegistryError::AuthorizationRejected("no".into())
        );
        assert_eq!(
            closed.register_name("bob", "alice").await.unwrap_err(),
            RegistryError::AuthorizationRejected("no".into())
        );
        assert!(closed.create("did:example:2", vec![], vec![], vec![]).await.is_err());

        assert!(store.get("did:example:1").unwrap().public_keys.is_empty());
        assert!(!store.exists("bob"));
        assert!(!store.exists("did:example:2"));
        assert_eq!(
            recorder.seen(),
            vec![
                (OperationKind::AddKey, "did:example:1".to_string()),
                (OperationKind::RegisterName, "did:example:1".to_string()),
                (OperationKind::Create, "did:example:2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_requests_never_reach_the_gate() {
        let recorder = Recorder::new(Authorization::Accepted);
        let registry = RegistryCore::new(Arc::new(MemoryStore::new())).with_proof_gate(recorder.clone());
        registry.create("did:example:1", vec![], vec![key("k1")], vec![]).await.unwrap();

        let _ = registry.create("did:example:1", vec![], vec![], vec![]).await;
        let _ = registry.create("did:example:2", vec![], vec![key("a"), key("a")], vec![]).await;
        let _ = registry.add_public_key("did:example:1", key("k1")).await;
        let _ = registry.add_service("did:example:9", service("s")).await;
        let _ = registry.register_name("did:example:1", "did:example:1").await;
        let _ = registry.get_document("did:example:1");

        assert_eq!(recorder.seen(), vec![(OperationKind::Create, "did:example:1".to_string())]);
    }

    #[tokio::test]
    async fn test_signature_gate_end_to_end() {
        let authority = KeyManager::new();
        let registry = RegistryCore::new(Arc::new(MemoryStore::new()))
            .with_proof_gate(Arc::new(SignatureGate::new(authority.verifying_key())));

        assert!(matches!(
            registry.create("did:example:1", vec![], vec![], vec![]).await,
            Err(RegistryError::AuthorizationRejected(_))
        ));

        let expected = invariants::validate_new_document("did:example:1", vec![], vec![], vec![]).unwrap();
        let proof = authority
            .sign_transition(&Transition::document(OperationKind::Create, "did:example:1", &expected), 1)
            .unwrap();
        let document = registry
            .with_proof(proof.clone())
            .create("did:example:1", vec![], vec![], vec![])
            .await
            .unwrap();
        assert_eq!(*document, expected);

        // the proof is bound to the created document, not to the next one
        assert!(matches!(
            registry.with_proof(proof).add_public_key("did:example:1", key("k1")).await,
            Err(RegistryError::AuthorizationRejected(_))
        ));

        let next = invariants::append_key(&document, key("k1")).unwrap();
        let proof = authority
            .sign_transition(&Transition::document(OperationKind::AddKey, "did:example:1", &next), 2)
            .unwrap();
        let updated = registry.with_proof(proof).add_public_key("did:example:1", key("k1")).await.unwrap();
        assert_eq!(*updated, next);

        let proof = authority.sign_transition(&Transition::alias("alice", "did:example:1"), 3).unwrap();
        registry.with_proof(proof).register_name("alice", "did:example:1").await.unwrap();
        assert_eq!(*registry.get_document("alice").unwrap(), next);
    }

    #[tokio::test]
    async fn test_ledger_failure_leaves_store_unchanged() {
        let store = Arc::new(MemoryStore::new());
        RegistryCore::new(store.clone())
            .create("did:example:1", vec![], vec![], vec![])
            .await
            .unwrap();

        let registry = RegistryCore::new(store.clone())
            .with_ledger(Arc::new(FailingLedger(SubmissionError::retryable("node unreachable"))));

        assert_eq!(
            registry.add_public_key("did:example:1", key("k1")).await.unwrap_err(),
            RegistryError::SubmissionFailed { retryable: true, reason: "node unreachable".into() }
        );
        assert!(matches!(
            registry.register_name("alice", "did:example:1").await,
            Err(RegistryError::SubmissionFailed { retryable: true, .. })
        ));
        assert!(registry.create("did:example:2", vec![], vec![], vec![]).await.is_err());

        assert!(store.get("did:example:1").unwrap().public_keys.is_empty());
        assert!(!store.exists("alice"));
        assert!(!store.exists("did:example:2"));
    }

    #[tokio::test]
    async fn test_ledger_commits_before_local_store() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(OrderCheck { store: store.clone(), observed: StdMutex::new(Vec::new()) });
        let registry = RegistryCore::new(store.clone()).with_ledger(ledger.clone());

        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();
        registry.add_public_key("did:example:1", key("k1")).await.unwrap();
        registry.register_name("alice", "did:example:1").await.unwrap();

        assert_eq!(*ledger.observed.lock().unwrap(), vec![false, false, false]);
        assert!(store.get("alice").unwrap().has_key("k1"));
    }

    #[tokio::test]
    async fn test_gate_timeout_is_a_rejection() {
        let registry = RegistryCore::new(Arc::new(MemoryStore::new()))
            .with_proof_gate(Arc::new(Slow(Duration::from_secs(30))))
            .with_timeouts(Duration::from_millis(20), DEFAULT_LEDGER_TIMEOUT);

        assert!(matches!(
            registry.create("did:example:1", vec![], vec![], vec![]).await,
            Err(RegistryError::AuthorizationRejected(reason)) if reason.contains("timed out")
        ));
        assert!(registry.get_document("did:example:1").is_err());
    }

    #[tokio::test]
    async fn test_cancelled_mutation_has_no_effect() {
        let store = Arc::new(MemoryStore::new());
        RegistryCore::new(store.clone())
            .create("did:example:1", vec![], vec![], vec![])
            .await
            .unwrap();
        let registry = RegistryCore::new(store.clone()).with_proof_gate(Arc::new(Slow(Duration::from_secs(30))));

        // dropping the future mid-authorization cancels the mutation
        let cancelled = tokio::time::timeout(
            Duration::from_millis(20),
            registry.add_public_key("did:example:1", key("k1")),
        )
        .await;
        assert!(cancelled.is_err());
        assert!(store.get("did:example:1").unwrap().public_keys.is_empty());

        // the per-key lock was released and pruned with the dropped future
        assert!(registry.locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_table_only_holds_keys_in_use() {
        let registry = registry();
        for i in 0..100 {
            let did = format!("did:x:{}", i);
            assert!(registry.create(&did, vec![], vec![key("a"), key("a")], vec![]).await.is_err());
            assert!(registry.register_name(&format!("n{}", i), "did:missing").await.is_err());
        }
        assert!(registry.locks.is_empty());

        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();
        registry.register_name("alice", "did:example:1").await.unwrap();
        registry.add_public_key("alice", key("k1")).await.unwrap();
        assert!(registry.locks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_entry_survives_while_contended() {
        let registry = Arc::new(
            RegistryCore::new(Arc::new(MemoryStore::new()))
                .with_proof_gate(Arc::new(Slow(Duration::from_millis(50)))),
        );
        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.add_public_key("did:example:1", key(&format!("k{}", i))).await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }

        assert_eq!(registry.get_document("did:example:1").unwrap().public_keys.len(), 4);
        assert!(registry.locks.is_empty());
    }

    /// Ledger that never answers within the test's timeout.
    struct StalledLedger;

    #[async_trait]
    impl LedgerAdapter for StalledLedger {
        async fn submit(&self, _transition: &Transition<'_>) -> Result<Committed, SubmissionError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Committed::now(None))
        }
    }

    #[tokio::test]
    async fn test_ledger_timeout_is_a_retryable_failure() {
        let store = Arc::new(MemoryStore::new());
        RegistryCore::new(store.clone())
            .create("did:example:1", vec![], vec![], vec![])
            .await
            .unwrap();
        let registry = RegistryCore::new(store.clone())
            .with_ledger(Arc::new(StalledLedger))
            .with_timeouts(DEFAULT_GATE_TIMEOUT, Duration::from_millis(20));

        assert!(matches!(
            registry.add_public_key("did:example:1", key("k1")).await,
            Err(RegistryError::SubmissionFailed { retryable: true, reason }) if reason.contains("timed out")
        ));
        assert!(matches!(
            registry.create("did:example:2", vec![], vec![], vec![]).await,
            Err(RegistryError::SubmissionFailed { retryable: true, .. })
        ));
        assert!(store.get("did:example:1").unwrap().public_keys.is_empty());
        assert!(!store.exists("did:example:2"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_key_single_winner() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        RegistryCore::new(store.clone())
            .create("did:example:1", vec![], vec![], vec![])
            .await
            .unwrap();
        let registry = Arc::new(
            RegistryCore::new(store.clone()).with_proof_gate(Arc::new(Slow(Duration::from_millis(25)))),
        );
        registry.register_name("alice", "did:example:1").await.unwrap();

        // one caller goes through the DID, the other through its alias
        let a = tokio::spawn({
            let registry = registry.clone();
            async move { registry.add_public_key("did:example:1", key("k1")).await }
        });
        let b = tokio::spawn({
            let registry = registry.clone();
            async move { registry.add_public_key("alice", key("k1")).await }
        });
        let results = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RegistryError::KeyAlreadyExists(id)) if id == "k1")));
        assert_eq!(key_ids(&store.get("did:example:1").unwrap()), ["k1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_on_one_name() {
        let registry = Arc::new(
            RegistryCore::new(Arc::new(MemoryStore::new()))
                .with_proof_gate(Arc::new(Slow(Duration::from_millis(25)))),
        );
        registry.create("did:example:1", vec![], vec![], vec![]).await.unwrap();

        let create = tokio::spawn({
            let registry = registry.clone();
            async move { registry.create("carol", vec![], vec![], vec![]).await.map(|_| ()) }
        });
        let alias = tokio::spawn({
            let registry = registry.clone();
            async move { registry.register_name("carol", "did:example:1").await }
        });
        let results = [create.await.unwrap(), alias.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.contains(&Err(RegistryError::AlreadyExists("carol".into()))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unrelated_keys_do_not_wait_on_each_other() {
        let registry = Arc::new(
            RegistryCore::new(Arc::new(MemoryStore::new()))
                .with_proof_gate(Arc::new(Slow(Duration::from_millis(200)))),
        );

        let started = std::time::Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.create(&format!("did:example:{}", i), vec![], vec![], vec![]).await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_ok());
        }
        // eight serialized authorizations would take 1.6s
        assert!(started.elapsed() < Duration::from_millis(1200));
    }
}
