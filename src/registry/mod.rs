// src/registry/mod.rs
//! Registry consistency core: pure document rules plus the orchestrating
//! [`RegistryCore`].

pub mod invariants;
pub mod registrar;

pub use registrar::{Authorized, RegistryCore};
