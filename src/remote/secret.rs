//! Credentials secret lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::{ConfigError, Result};

/// Location of a credentials secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    /// Secret namespace.
    pub namespace: String,
    /// Secret name.
    pub name: String,
}

/// Key/value secret source.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Returns every key of the secret `namespace/name`.
    async fn get(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>>;
}

/// Secrets read from a YAML file of `namespace -> name -> key -> value`.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

type SecretsFile = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

impl FileSecretStore {
    /// Creates a store reading `path` on every lookup.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let unavailable = |message: String| ConfigError::SecretUnavailable {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message,
        };

        debug!("Reading secret {namespace}/{name} from {}", self.path.display());

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| unavailable(format!("cannot read {}: {e}", self.path.display())))?;

        let mut secrets: SecretsFile = serde_yaml::from_str(&content)
            .map_err(|e| unavailable(format!("cannot parse {}: {e}", self.path.display())))?;

        let secret = secrets
            .get_mut(namespace)
            .and_then(|names| names.remove(name))
            .ok_or_else(|| unavailable(String::from("not found")))?;

        Ok(secret)
    }
}
