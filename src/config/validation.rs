//! Configuration validation.
//!
//! Field-level rules come from the `validator` derives on the config types.
//! This module adds the checks that span several fields and the checks on
//! manifest sets.

use crate::error::{ConfigError, ProviderError, Result};
use std::collections::HashSet;
use tracing::debug;
use validator::Validate;

use super::manifest::Manifest;
use super::spec::ProviderConfig;

/// Validation result containing all issues found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationIssue>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => {
                debug!("Configuration validation passed");
                Ok(self)
            }
            Some(first) => Err(ProviderError::Config(ConfigError::ValidationError {
                message: first.message.clone(),
                field: Some(first.field.clone()),
            })),
        }
    }
}

/// Validator for provider configuration and manifests.
#[derive(Debug, Default)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, config: &ProviderConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        if let Err(errors) = config.validate() {
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map_or_else(|| format!("invalid value ({})", error.code), ToString::to_string);
                    result.error(field.to_string(), message);
                }
            }
            if errors.errors().contains_key("store") {
                result.error("store.path", "store path cannot be empty");
            }
        }

        Self::validate_connection(config, &mut result);
        result.into_result()
    }

    /// Validates a set of manifests.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate_manifests(&self, manifests: &[Manifest]) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();
        if manifests.is_empty() {
            result.warnings.push(String::from("No resources declared"));
        }

        let mut seen = HashSet::new();
        for (i, manifest) in manifests.iter().enumerate() {
            let field = format!("[{i}].metadata.name");
            let name = &manifest.metadata.name;

            if !is_valid_name(name) {
                result.error(
                    field.clone(),
                    format!(
                        "{} name '{name}' is invalid. Must be lowercase alphanumeric with hyphens.",
                        manifest.kind
                    ),
                );
            }
            if !seen.insert((manifest.kind, name)) {
                result.error(field, format!("Duplicate {} '{name}'", manifest.kind));
            }
            if !manifest.spec.for_provider.is_object() {
                result.error(
                    format!("[{i}].spec.forProvider"),
                    format!("{} '{name}': forProvider must be a mapping", manifest.kind),
                );
            }
        }

        result.into_result()
    }

    /// An endpoint must come from the config or the credentials secret.
    fn validate_connection(config: &ProviderConfig, result: &mut ValidationResult) {
        match &config.credentials {
            Some(credentials) => {
                if credentials.namespace.is_empty() {
                    result.error("credentials.namespace", "credentials namespace cannot be empty");
                }
                if credentials.name.is_empty() {
                    result.error("credentials.name", "credentials name cannot be empty");
                }
                if config.secrets_file.is_none() {
                    result.error(
                        "secrets_file",
                        "a secrets file is required when credentials are configured",
                    );
                }
            }
            None => {
                if config.endpoint.is_none() {
                    result.error(
                        "endpoint",
                        "an endpoint is required when no credentials are configured",
                    );
                }
                result
                    .warnings
                    .push(String::from("No credentials configured; requests are unauthenticated"));
            }
        }

        if let Some(endpoint) = &config.endpoint
            && endpoint.starts_with("http://")
        {
            result
                .warnings
                .push(format!("Endpoint {endpoint} does not use TLS"));
        }
    }
}

/// Checks if a name is valid (lowercase alphanumeric with hyphens).
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}
