//! Resource store trait definition.
//!
//! This module defines the common interface for declarative resource storage.

use async_trait::async_trait;

use crate::error::Result;
use crate::resource::{ManagedOf, ResourceKind};

/// Storage of declarative resources of kind `K`, addressed by name.
#[async_trait]
pub trait ResourceStore<K: ResourceKind>: Send + Sync {
    /// Loads a resource.
    ///
    /// Fails with a not-found store error if it does not exist.
    async fn get(&self, name: &str) -> Result<ManagedOf<K>>;

    /// Creates or replaces a resource.
    async fn update(&self, resource: &ManagedOf<K>) -> Result<()>;

    /// Removes a resource. Removing a missing resource succeeds.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Lists all resources of the kind, ordered by name.
    async fn list(&self) -> Result<Vec<ManagedOf<K>>>;

    /// Gets the backend type name, for logs.
    fn backend_type(&self) -> &'static str;
}
