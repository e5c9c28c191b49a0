//! Resource manifests.
//!
//! A manifest file holds one or more YAML documents, each declaring a resource
//! of one kind:
//!
//! ```yaml
//! kind: Role
//! metadata:
//!   name: editor
//! spec:
//!   forProvider:
//!     displayName: Editor
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, ProviderError, Result};
use crate::kinds::KindName;
use crate::resource::{DeletionPolicy, ManagedOf, ManagedResource, ResourceKind};

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Resource kind.
    pub kind: KindName,
    /// Name and annotations.
    pub metadata: ManifestMetadata,
    /// Desired state.
    pub spec: ManifestSpec,
}

/// Manifest metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Resource name, unique per kind.
    pub name: String,
    /// Annotations merged into the stored resource.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Manifest spec, decoded per kind on apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSpec {
    /// Kind-specific parameters.
    pub for_provider: serde_json::Value,
    /// Deletion policy.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

impl Manifest {
    /// Merges this manifest into the stored resource, if any.
    ///
    /// Desired state and deletion policy are replaced. Annotations are merged
    /// so the external name and concurrency token survive re-applying, and the
    /// status is kept.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the parameters do not decode as `K`.
    pub fn apply_to<K: ResourceKind>(&self, existing: Option<ManagedOf<K>>) -> Result<ManagedOf<K>> {
        let for_provider: K::Desired = serde_json::from_value(self.spec.for_provider.clone())
            .map_err(|e| {
                ConfigError::validation(
                    format!("{} '{}': {e}", K::KIND, self.metadata.name),
                    "spec.forProvider",
                )
            })?;

        let mut resource =
            existing.unwrap_or_else(|| ManagedResource::new(&self.metadata.name, for_provider.clone()));
        resource.spec.for_provider = for_provider;
        resource.spec.deletion_policy = self.spec.deletion_policy;
        resource.metadata.deletion_requested = false;
        resource.metadata.annotations.extend(
            self.metadata
                .annotations
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Ok(resource)
    }
}

/// Parses every manifest in a multi-document YAML string.
///
/// # Errors
///
/// Returns a parse error naming the offending document.
pub fn parse_manifests(content: &str, source: Option<&Path>) -> Result<Vec<Manifest>> {
    let location = |index: usize| {
        source.map_or_else(
            || format!("document {index}"),
            |p| format!("{} (document {index})", p.display()),
        )
    };

    let mut manifests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: Some(location(index)),
            })
        })?;
        if value.is_null() {
            continue;
        }

        let manifest: Manifest = serde_yaml::from_value(value).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("Invalid manifest: {e}"),
                location: Some(location(index)),
            })
        })?;
        debug!("Parsed {} '{}'", manifest.kind, manifest.metadata.name);
        manifests.push(manifest);
    }

    Ok(manifests)
}

/// Loads manifests from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_manifests(path: impl AsRef<Path>) -> Result<Vec<Manifest>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ProviderError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }
    let content = std::fs::read_to_string(path)?;
    parse_manifests(&content, Some(path))
}
