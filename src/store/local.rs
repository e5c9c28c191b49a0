//! Local file-based resource store.
//!
//! Each resource is one pretty-printed JSON file at `<base>/<kind>/<name>.json`.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{ConfigError, ProviderError, Result, StoreError};
use crate::resource::{ManagedOf, ResourceKind};

use super::resource_store::ResourceStore;

/// Default store directory name.
pub const STORE_DIR: &str = ".xprovider";

/// Resource file extension.
const RESOURCE_EXT: &str = "json";

/// Local file-based resource store.
#[derive(Debug, Clone)]
pub struct LocalResourceStore {
    /// Base directory for resource files.
    base_dir: PathBuf,
}

impl LocalResourceStore {
    /// Creates a store under `.xprovider` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| ProviderError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STORE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Returns the base directory.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn kind_dir(&self, kind: &str) -> PathBuf {
        self.base_dir.join(kind.to_lowercase())
    }

    fn resource_path(&self, kind: &str, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(ConfigError::validation(
                format!("invalid resource name '{name}'"),
                "metadata.name",
            )
            .into());
        }
        Ok(self.kind_dir(kind).join(format!("{name}.{RESOURCE_EXT}")))
    }

    /// Ensures a directory exists.
    async fn ensure_dir(dir: &Path) -> Result<()> {
        if !dir.exists() {
            debug!("Creating store directory: {}", dir.display());
            fs::create_dir_all(dir).await.map_err(|e| {
                StoreError::write(format!("Failed to create store directory: {e}"))
            })?;
        }
        Ok(())
    }

    async fn read_resource<K: ResourceKind>(path: &Path) -> Result<ManagedOf<K>> {
        let content = fs::read_to_string(path).await.map_err(|e| StoreError::Corrupted {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ProviderError::Store(StoreError::Corrupted {
                message: format!("Failed to parse {}: {e}", path.display()),
            })
        })
    }
}

#[async_trait]
impl<K: ResourceKind> ResourceStore<K> for LocalResourceStore {
    async fn get(&self, name: &str) -> Result<ManagedOf<K>> {
        let path = self.resource_path(K::KIND, name)?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                kind: K::KIND,
                name: name.to_string(),
            }
            .into());
        }

        debug!("Loading {} '{name}' from {}", K::KIND, path.display());
        Self::read_resource::<K>(&path).await
    }

    async fn update(&self, resource: &ManagedOf<K>) -> Result<()> {
        let path = self.resource_path(K::KIND, resource.name())?;
        Self::ensure_dir(&self.kind_dir(K::KIND)).await?;

        debug!("Saving {} '{}' to {}", K::KIND, resource.name(), path.display());

        let content = serde_json::to_string_pretty(resource)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize resource: {e}")))?;

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| StoreError::write(format!("Failed to create temp file: {e}")))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| StoreError::write(format!("Failed to write resource file: {e}")))?;

        file.sync_all()
            .await
            .map_err(|e| StoreError::write(format!("Failed to sync resource file: {e}")))?;

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StoreError::write(format!("Failed to rename resource file: {e}")))?;

        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.resource_path(K::KIND, name)?;
        if path.exists() {
            info!("Removing {} '{name}' from store", K::KIND);
            fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::write(format!("Failed to delete resource file: {e}")))?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ManagedOf<K>>> {
        let dir = self.kind_dir(K::KIND);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == RESOURCE_EXT) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut resources = Vec::with_capacity(paths.len());
        for path in paths {
            resources.push(Self::read_resource::<K>(&path).await?);
        }
        Ok(resources)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
