// src/services/api_server.rs
//! API Server for the DID Registry
//!
//! This module provides the REST API interface over [`RegistryCore`].
//!
//! The API is built using Axum and includes endpoints for:
//! - DID creation and resolution (by DID or alias)
//! - Appending public keys and services to a document
//! - Registering alias names
//!
//! Every mutating request body may carry an optional `proof`, handed to the
//! registry's proof gate.

use crate::error::RegistryError;
use crate::models::did::{DIDDocument, PublicKey, Service};
use crate::registry::RegistryCore;
use crate::services::proof_gate::Proof;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

// API request structures

/// Request payload for creating a new DID
#[derive(Serialize, Deserialize)]
struct CreateDIDRequest {
    did: String,
    #[serde(rename = "@context", default)]
    context: Vec<String>,
    #[serde(rename = "publicKeys", default)]
    public_keys: Vec<PublicKey>,
    #[serde(rename = "service", default)]
    services: Vec<Service>,
    proof: Option<Proof>,
}

/// Request payload for appending a public key
#[derive(Serialize, Deserialize)]
struct AddPublicKeyRequest {
    #[serde(rename = "publicKey")]
    public_key: PublicKey,
    proof: Option<Proof>,
}

/// Request payload for appending a service
#[derive(Serialize, Deserialize)]
struct AddServiceRequest {
    service: Service,
    proof: Option<Proof>,
}

/// Request payload for registering an alias name
#[derive(Serialize, Deserialize)]
struct RegisterNameRequest {
    name: String,
    did: String,
    proof: Option<Proof>,
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::AlreadyExists(_)
            | RegistryError::KeyAlreadyExists(_)
            | RegistryError::ServiceAlreadyExists(_) => StatusCode::CONFLICT,
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::DuplicateKeyId(_) | RegistryError::DuplicateServiceId(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RegistryError::AuthorizationRejected(_) => StatusCode::FORBIDDEN,
            RegistryError::SubmissionFailed { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            RegistryError::SubmissionFailed { retryable: false, .. } => StatusCode::BAD_GATEWAY,
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// API server state: the registry every handler works against
#[derive(Clone)]
pub struct ApiServer {
    registry: Arc<RegistryCore>,
}

impl ApiServer {
    pub fn new(registry: Arc<RegistryCore>) -> Self {
        ApiServer { registry }
    }

    /// Builds the router with all API routes
    pub fn router(&self) -> Router {
        Router::new()
            .route("/dids", post(Self::create_did_handler))
            .route("/dids/:key", get(Self::get_document_handler))
            .route("/dids/:key/keys", post(Self::add_public_key_handler))
            .route("/dids/:key/services", post(Self::add_service_handler))
            .route("/names", post(Self::register_name_handler))
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Creates a new DID document
    ///
    /// # Endpoint
    /// POST /dids
    ///
    /// # Responses
    /// - 201 Created: Returns the document
    /// - 409 Conflict: DID or alias already registered
    /// - 422 Unprocessable Entity: Duplicate key or service ids
    async fn create_did_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<CreateDIDRequest>,
    ) -> Result<(StatusCode, Json<DIDDocument>), RegistryError> {
        let CreateDIDRequest { did, context, public_keys, services, proof } = payload;
        let document = match proof {
            Some(proof) => {
                state.registry.with_proof(proof).create(&did, context, public_keys, services).await?
            }
            None => state.registry.create(&did, context, public_keys, services).await?,
        };
        Ok((StatusCode::CREATED, Json(document.as_ref().clone())))
    }

    /// Resolves a DID or alias to its document
    ///
    /// # Endpoint
    /// GET /dids/:key
    async fn get_document_handler(
        State(state): State<Arc<ApiServer>>,
        Path(key): Path<String>,
    ) -> Result<Json<DIDDocument>, RegistryError> {
        let document = state.registry.get_document(&key)?;
        Ok(Json(document.as_ref().clone()))
    }

    /// Appends a public key
    ///
    /// # Endpoint
    /// POST /dids/:key/keys
    async fn add_public_key_handler(
        State(state): State<Arc<ApiServer>>,
        Path(key): Path<String>,
        Json(payload): Json<AddPublicKeyRequest>,
    ) -> Result<Json<DIDDocument>, RegistryError> {
        let document = match payload.proof {
            Some(proof) => state.registry.with_proof(proof).add_public_key(&key, payload.public_key).await?,
            None => state.registry.add_public_key(&key, payload.public_key).await?,
        };
        Ok(Json(document.as_ref().clone()))
    }

    /// Appends a service
    ///
    /// # Endpoint
    /// POST /dids/:key/services
    async fn add_service_handler(
        State(state): State<Arc<ApiServer>>,
        Path(key): Path<String>,
        Json(payload): Json<AddServiceRequest>,
    ) -> Result<Json<DIDDocument>, RegistryError> {
        let document = match payload.proof {
            Some(proof) => state.registry.with_proof(proof).add_service(&key, payload.service).await?,
            None => state.registry.add_service(&key, payload.service).await?,
        };
        Ok(Json(document.as_ref().clone()))
    }

    /// Registers an alias name for a DID
    ///
    /// # Endpoint
    /// POST /names
    ///
    /// # Responses
    /// - 204 No Content: Alias registered
    /// - 404 Not Found: Target DID unknown
    /// - 409 Conflict: Name already taken
    async fn register_name_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<RegisterNameRequest>,
    ) -> Result<StatusCode, RegistryError> {
        match payload.proof {
            Some(proof) => state.registry.with_proof(proof).register_name(&payload.name, &payload.did).await?,
            None => state.registry.register_name(&payload.name, &payload.did).await?,
        }
        Ok(StatusCode::NO_CONTENT)
    }
}
