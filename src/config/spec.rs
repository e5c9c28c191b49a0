//! Provider configuration specification types.
//!
//! These types map directly to the `xprovider.yaml` file structure.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

use crate::remote::{DEFAULT_CALL_TIMEOUT_SECS, SecretRef};
use crate::store::STORE_DIR;

/// Root provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Base URL of the remote API.
    #[serde(default)]
    #[validate(url(message = "endpoint must be a valid URL"))]
    pub endpoint: Option<String>,

    /// Secret holding the API endpoint and token.
    #[serde(default)]
    pub credentials: Option<SecretRef>,

    /// YAML file backing the secret store.
    #[serde(default)]
    pub secrets_file: Option<PathBuf>,

    /// Resource store configuration.
    #[serde(default)]
    #[validate(nested)]
    pub store: StoreConfig,

    /// Upper bound for a single remote call, in seconds.
    #[serde(default = "default_call_timeout")]
    #[validate(range(min = 1, max = 3600, message = "call timeout must be between 1 and 3600 seconds"))]
    pub call_timeout_secs: u64,
}

/// Resource store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct StoreConfig {
    /// Directory holding one file per declarative resource.
    #[serde(default = "default_store_path")]
    #[validate(custom(function = "validate_non_empty_path"))]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            credentials: None,
            secrets_file: None,
            store: StoreConfig::default(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Returns the per-call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.call_timeout_secs)
    }
}

// Default value functions

const fn default_call_timeout() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

fn default_store_path() -> PathBuf {
    PathBuf::from(STORE_DIR)
}

fn validate_non_empty_path(path: &PathBuf) -> Result<(), validator::ValidationError> {
    if path.as_os_str().is_empty() {
        return Err(validator::ValidationError::new("empty_path"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.store.path, PathBuf::from(".xprovider"));
        assert_eq!(config.call_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = ProviderConfig {
            endpoint: Some("not a url".to_string()),
            ..ProviderConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("endpoint"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ProviderConfig {
            call_timeout_secs: 0,
            ..ProviderConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_store_path_rejected() {
        let config = ProviderConfig {
            store: StoreConfig {
                path: PathBuf::new(),
            },
            ..ProviderConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
