//! In-memory resource store.
//!
//! Holds resources of every kind as JSON values keyed by kind and name, so one
//! instance can back several reconcilers.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::resource::{ManagedOf, ResourceKind};

use super::resource_store::ResourceStore;

/// In-memory resource store.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    resources: RwLock<BTreeMap<(&'static str, String), serde_json::Value>>,
    writes: AtomicUsize,
}

impl MemoryResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many updates the store has accepted.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

fn decode<K: ResourceKind>(value: &serde_json::Value) -> Result<ManagedOf<K>> {
    serde_json::from_value(value.clone()).map_err(|e| {
        StoreError::Corrupted {
            message: format!("Failed to decode {}: {e}", K::KIND),
        }
        .into()
    })
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for MemoryResourceStore {
    async fn get(&self, name: &str) -> Result<ManagedOf<K>> {
        let resources = self.resources.read().await;
        let value = resources
            .get(&(K::KIND, name.to_string()))
            .ok_or_else(|| StoreError::NotFound {
                kind: K::KIND,
                name: name.to_string(),
            })?;
        decode::<K>(value)
    }

    async fn update(&self, resource: &ManagedOf<K>) -> Result<()> {
        let value = serde_json::to_value(resource)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize resource: {e}")))?;

        self.resources
            .write()
            .await
            .insert((K::KIND, resource.name().to_string()), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.resources
            .write()
            .await
            .remove(&(K::KIND, name.to_string()));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ManagedOf<K>>> {
        let resources = self.resources.read().await;
        resources
            .iter()
            .filter(|((kind, _), _)| *kind == K::KIND)
            .map(|(_, value)| decode::<K>(value))
            .collect()
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::{Database, DatabaseParameters, Role, RoleParameters};
    use crate::resource::ManagedResource;

    fn role(name: &str) -> ManagedOf<Role> {
        ManagedResource::new(
            name,
            RoleParameters {
                display_name: "Editor".to_string(),
                description: None,
                actions: None,
                project_id: None,
                project_id_ref: None,
                project_id_selector: None,
            },
        )
    }

    fn database(name: &str) -> ManagedOf<Database> {
        ManagedResource::new(
            name,
            DatabaseParameters {
                name: name.to_string(),
                engine: "postgres".to_string(),
                region: "eu-west-1".to_string(),
                engine_version: None,
                storage_gb: None,
                backup_retention_days: None,
                deletion_protection: None,
                labels: None,
                network_id: None,
                network_id_ref: None,
            },
        )
    }

    #[tokio::test]
    async fn test_update_counts_writes() {
        let store = MemoryResourceStore::new();
        ResourceStore::<Role>::update(&store, &role("editor"))
            .await
            .expect("save role");
        ResourceStore::<Role>::update(&store, &role("editor"))
            .await
            .expect("save role");

        assert_eq!(store.writes(), 2);
        let loaded = ResourceStore::<Role>::get(&store, "editor")
            .await
            .expect("load role");
        assert_eq!(loaded, role("editor"));
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let store = MemoryResourceStore::new();
        ResourceStore::<Role>::update(&store, &role("shared"))
            .await
            .expect("save role");
        ResourceStore::<Database>::update(&store, &database("shared"))
            .await
            .expect("save database");

        assert_eq!(ResourceStore::<Role>::list(&store).await.expect("list").len(), 1);
        assert_eq!(
            ResourceStore::<Database>::list(&store).await.expect("list").len(),
            1
        );

        ResourceStore::<Role>::remove(&store, "shared")
            .await
            .expect("remove role");
        assert!(ResourceStore::<Role>::get(&store, "shared").await.is_err());
        assert!(ResourceStore::<Database>::get(&store, "shared").await.is_ok());
    }

    #[test]
    fn test_backend_type() {
        let store = MemoryResourceStore::new();
        assert_eq!(ResourceStore::<Role>::backend_type(&store), "memory");
    }
}
