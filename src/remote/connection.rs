//! Per-pass client construction.
//!
//! A [`Connector`] is invoked once at the start of every pass. It resolves the
//! connection parameters and returns a fresh client, so credential rotation
//! takes effect on the next pass without any shared client.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::resource::ResourceKind;

use super::client::RemoteClient;
use super::http::HttpRemoteClient;
use super::secret::{SecretRef, SecretStore};

/// Secret key holding the API endpoint.
pub const SECRET_KEY_ENDPOINT: &str = "endpoint";

/// Secret key holding the bearer token.
pub const SECRET_KEY_TOKEN: &str = "token";

/// Builds a remote client for one pass.
#[async_trait]
pub trait Connector<K: ResourceKind>: Send + Sync {
    /// Returns a client ready for use.
    async fn connect(&self) -> Result<Arc<dyn RemoteClient<K>>>;
}

/// Connector that builds an [`HttpRemoteClient`] from a credentials secret.
#[derive(Clone)]
pub struct HttpConnector {
    secrets: Arc<dyn SecretStore>,
    credentials: Option<SecretRef>,
    endpoint: Option<String>,
}

/// Connector returning a prebuilt client.
pub struct StaticConnector<K: ResourceKind> {
    client: Arc<dyn RemoteClient<K>>,
}

impl HttpConnector {
    /// Creates a connector.
    ///
    /// `endpoint` is used when the secret does not name one.
    #[must_use]
    pub fn new(
        secrets: Arc<dyn SecretStore>,
        credentials: Option<SecretRef>,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            secrets,
            credentials,
            endpoint,
        }
    }

    /// Resolves the endpoint and token for this pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret cannot be read or no endpoint is known.
    pub async fn resolve(&self) -> Result<(String, Option<String>)> {
        let Some(credentials) = &self.credentials else {
            let endpoint = self
                .endpoint
                .clone()
                .ok_or_else(|| ConfigError::validation("no API endpoint configured", "endpoint"))?;
            return Ok((endpoint, None));
        };

        let mut secret = self
            .secrets
            .get(&credentials.namespace, &credentials.name)
            .await?;

        let endpoint = secret
            .remove(SECRET_KEY_ENDPOINT)
            .or_else(|| self.endpoint.clone())
            .ok_or_else(|| ConfigError::MissingSecretKey {
                namespace: credentials.namespace.clone(),
                name: credentials.name.clone(),
                key: SECRET_KEY_ENDPOINT.to_string(),
            })?;

        let token = secret
            .remove(SECRET_KEY_TOKEN)
            .ok_or_else(|| ConfigError::MissingSecretKey {
                namespace: credentials.namespace.clone(),
                name: credentials.name.clone(),
                key: SECRET_KEY_TOKEN.to_string(),
            })?;

        Ok((endpoint, Some(token)))
    }
}

#[async_trait]
impl<K: ResourceKind> Connector<K> for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteClient<K>>> {
        let (endpoint, token) = self.resolve().await?;
        debug!("Connecting {} client to {endpoint}", K::KIND);
        Ok(Arc::new(HttpRemoteClient::<K>::new(&endpoint, token)?))
    }
}

impl<K: ResourceKind> StaticConnector<K> {
    /// Wraps `client`.
    #[must_use]
    pub fn new(client: Arc<dyn RemoteClient<K>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K: ResourceKind> Connector<K> for StaticConnector<K> {
    async fn connect(&self) -> Result<Arc<dyn RemoteClient<K>>> {
        Ok(Arc::clone(&self.client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::secret::MockSecretStore;
    use std::collections::BTreeMap;

    fn creds() -> SecretRef {
        SecretRef {
            namespace: "crossplane-system".to_string(),
            name: "cloud-creds".to_string(),
        }
    }

    fn secret(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_resolve_from_secret() {
        let mut secrets = MockSecretStore::new();
        secrets
            .expect_get()
            .withf(|namespace, name| namespace == "crossplane-system" && name == "cloud-creds")
            .times(1)
            .returning(|_, _| {
                Ok(secret(&[
                    ("endpoint", "https://api.example.com"),
                    ("token", "s3cr3t"),
                ]))
            });

        let connector = HttpConnector::new(Arc::new(secrets), Some(creds()), None);
        let (endpoint, token) = connector.resolve().await.expect("resolve credentials");

        assert_eq!(endpoint, "https://api.example.com");
        assert_eq!(token.as_deref(), Some("s3cr3t"));
    }

    #[tokio::test]
    async fn test_endpoint_falls_back_to_config() {
        let mut secrets = MockSecretStore::new();
        secrets
            .expect_get()
            .returning(|_, _| Ok(secret(&[("token", "s3cr3t")])));

        let connector = HttpConnector::new(
            Arc::new(secrets),
            Some(creds()),
            Some("https://fallback.example.com".to_string()),
        );
        let (endpoint, _) = connector.resolve().await.expect("resolve credentials");

        assert_eq!(endpoint, "https://fallback.example.com");
    }

    #[tokio::test]
    async fn test_missing_token_is_error() {
        let mut secrets = MockSecretStore::new();
        secrets
            .expect_get()
            .returning(|_, _| Ok(secret(&[("endpoint", "https://api.example.com")])));

        let connector = HttpConnector::new(Arc::new(secrets), Some(creds()), None);
        let err = connector.resolve().await.expect_err("token is missing");

        assert!(err.to_string().contains("'token'"));
    }

    #[tokio::test]
    async fn test_no_credentials_uses_endpoint() {
        let mut secrets = MockSecretStore::new();
        secrets.expect_get().never();

        let connector = HttpConnector::new(
            Arc::new(secrets),
            None,
            Some("http://localhost:8080".to_string()),
        );
        let (endpoint, token) = connector.resolve().await.expect("resolve endpoint");

        assert_eq!(endpoint, "http://localhost:8080");
        assert_eq!(token, None);
    }

    #[tokio::test]
    async fn test_no_endpoint_anywhere() {
        let secrets = MockSecretStore::new();
        let connector = HttpConnector::new(Arc::new(secrets), None, None);
        assert!(connector.resolve().await.is_err());
    }
}
