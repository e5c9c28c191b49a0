//! Configuration parser for loading provider configuration files.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, ProviderError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::spec::ProviderConfig;

/// Environment variable overriding the API endpoint.
pub const ENV_ENDPOINT: &str = "XPROVIDER_ENDPOINT";

/// Environment variable overriding the store directory.
pub const ENV_STORE_PATH: &str = "XPROVIDER_STORE_PATH";

/// Environment variable overriding the secrets file.
pub const ENV_SECRETS_FILE: &str = "XPROVIDER_SECRETS_FILE";

/// Environment variable overriding the per-call timeout.
pub const ENV_CALL_TIMEOUT: &str = "XPROVIDER_CALL_TIMEOUT_SECS";

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "xprovider.yaml";

/// Alternative configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[DEFAULT_CONFIG_FILE, "xprovider.yml"];

/// Configuration parser for loading provider configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ProviderError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// An empty document yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing YAML configuration");

        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            ProviderError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })
    }

    /// Loads configuration and applies `XPROVIDER_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an override
    /// holds an invalid value.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let mut config = self.load_file(path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                ProviderError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Applies environment overrides, reading variables through `lookup`.
///
/// # Errors
///
/// Returns an error if the timeout override is not a number.
pub fn apply_env_overrides(
    config: &mut ProviderConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(endpoint) = lookup(ENV_ENDPOINT) {
        debug!("Overriding endpoint from environment");
        config.endpoint = Some(endpoint);
    }

    if let Some(path) = lookup(ENV_STORE_PATH) {
        debug!("Overriding store.path from environment");
        config.store.path = PathBuf::from(path);
    }

    if let Some(path) = lookup(ENV_SECRETS_FILE) {
        debug!("Overriding secrets_file from environment");
        config.secrets_file = Some(PathBuf::from(path));
    }

    if let Some(timeout) = lookup(ENV_CALL_TIMEOUT) {
        debug!("Overriding call_timeout_secs from environment");
        config.call_timeout_secs = timeout.trim().parse().map_err(|_| {
            ConfigError::validation(
                format!("{ENV_CALL_TIMEOUT} must be a number of seconds, got '{timeout}'"),
                "call_timeout_secs",
            )
        })?;
    }

    Ok(())
}

/// Returns the configuration directory under the user's config dir.
#[must_use]
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("xprovider"))
}

/// Finds the configuration file in `start_dir`, then in the user config dir.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();

    let candidates = std::iter::once(start.to_path_buf()).chain(user_config_dir());
    for dir in candidates {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = dir.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }
    }

    warn!("No configuration file found from {}", start.display());
    Err(ProviderError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILE),
    }))
}
