//! Configuration module for the provider.
//!
//! This module handles all configuration-related functionality:
//! - Parsing `xprovider.yaml` with environment overrides
//! - Validation of configuration values
//! - Parsing resource manifests for `apply`

mod manifest;
mod parser;
mod spec;
mod validation;

pub use manifest::{Manifest, ManifestMetadata, ManifestSpec, load_manifests, parse_manifests};
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_FILES, ENV_CALL_TIMEOUT, ENV_ENDPOINT,
    ENV_SECRETS_FILE, ENV_STORE_PATH, apply_env_overrides, find_config_file, user_config_dir,
};
pub use spec::{ProviderConfig, StoreConfig};
pub use validation::{ConfigValidator, ValidationIssue, ValidationResult};
