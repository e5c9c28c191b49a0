//! Remote cloud API access.
//!
//! This module provides the typed client contract, the REST implementation,
//! the per-pass connector that resolves credentials, and an in-memory remote
//! collection for tests.

mod client;
mod connection;
mod http;
mod memory;
mod secret;

pub use client::{
    CallContext, DEFAULT_CALL_TIMEOUT_SECS, RemoteClient, RemoteResult, ResponseMetadata,
};
pub use connection::{
    Connector, HttpConnector, SECRET_KEY_ENDPOINT, SECRET_KEY_TOKEN, StaticConnector,
};
pub use http::HttpRemoteClient;
pub use memory::{CreateFn, InMemoryRemote, Operation, RemoteCall, UpdateFn};
pub use secret::{FileSecretStore, SecretRef, SecretStore};

#[cfg(test)]
pub use secret::MockSecretStore;
