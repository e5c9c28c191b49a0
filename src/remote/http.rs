//! REST client for the remote cloud API.
//!
//! Objects live at `{endpoint}/{collection}/{id}`. The `ETag` response header
//! carries the concurrency token and updates send it back in `If-Match`. The
//! client never retries: every failure is classified and returned.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url, header};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, trace};

use crate::error::{ProviderError, RemoteError, Result};
use crate::resource::{ResourceKind, UpdateRequest};

use super::client::{CallContext, RemoteClient, RemoteResult, ResponseMetadata};

/// Connection timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP client for one resource kind.
#[derive(Debug)]
pub struct HttpRemoteClient<K> {
    /// HTTP client.
    client: Client,
    /// API base URL without trailing slash.
    endpoint: String,
    /// Bearer token.
    token: Option<String>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for HttpRemoteClient<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            token: self.token.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> HttpRemoteClient<K> {
    /// Creates a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self::with_client(client, endpoint, token))
    }

    /// Creates a client around an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, endpoint: &str, token: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
            _kind: PhantomData,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.endpoint, K::API_PATH)
    }

    /// URL of one object, with `id` percent-encoded as a single path segment.
    fn object_url(&self, id: &str) -> RemoteResult<Url> {
        let mut url = Url::parse(&self.collection_url())
            .map_err(|e| RemoteError::fatal(format!("Invalid endpoint {}: {e}", self.endpoint)))?;
        url.path_segments_mut()
            .map_err(|()| RemoteError::fatal(format!("Invalid endpoint {}", self.endpoint)))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and fails on any non-success status.
    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorize(request)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        trace!("{} responded {status}", K::KIND);

        if status.is_success() {
            return Ok(response);
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(MAX_ERROR_BODY)
            .collect();
        Err(RemoteError::from_status(
            status.as_u16(),
            format!("{} API returned {status}: {body}", K::KIND),
        ))
    }
}

#[async_trait]
impl<K: ResourceKind> RemoteClient<K> for HttpRemoteClient<K> {
    async fn get(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> RemoteResult<(K::Remote, ResponseMetadata)> {
        debug!("GET {} {id}", K::KIND);
        ctx.run(async {
            let response = self.send(self.client.get(self.object_url(id)?)).await?;
            let metadata = ResponseMetadata {
                concurrency_token: etag(&response),
            };
            let remote = decode::<K::Remote>(response).await?;
            Ok((remote, metadata))
        })
        .await
    }

    async fn create(
        &self,
        ctx: &CallContext,
        request: &K::CreateRequest,
    ) -> RemoteResult<K::Remote> {
        debug!("POST {}", K::KIND);
        ctx.run(async {
            let response = self
                .send(self.client.post(self.collection_url()).json(request))
                .await?;
            decode::<K::Remote>(response).await
        })
        .await
    }

    async fn update(
        &self,
        ctx: &CallContext,
        request: &UpdateRequest<K::UpdateBody>,
    ) -> RemoteResult<K::Remote> {
        debug!("PUT {} {}", K::KIND, request.id);
        ctx.run(async {
            let mut builder = self
                .client
                .put(self.object_url(&request.id)?)
                .json(&request.body);
            if let Some(token) = &request.concurrency_token {
                builder = builder.header(header::IF_MATCH, token);
            }
            let response = self.send(builder).await?;
            decode::<K::Remote>(response).await
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> RemoteResult<()> {
        debug!("DELETE {} {id}", K::KIND);
        ctx.run(async {
            self.send(self.client.delete(self.object_url(id)?)).await?;
            Ok(())
        })
        .await
    }
}

fn etag(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| RemoteError::transient(format!("Failed to read response: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| RemoteError::fatal(format!("Failed to parse response: {e}")))
}

/// Classifies a failure that produced no response.
fn transport_error(e: &reqwest::Error) -> RemoteError {
    if e.is_builder() {
        RemoteError::fatal(format!("Invalid request: {e}"))
    } else {
        RemoteError::transient(format!("Request failed: {e}"))
    }
}
