// src/services/mod.rs
//! Services layered on the registry: authorization and the HTTP API.

pub mod api_server;
pub mod proof_gate;
