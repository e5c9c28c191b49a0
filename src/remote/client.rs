//! Remote API client contract.
//!
//! A [`RemoteClient`] performs typed calls for one resource kind. Every call
//! takes a [`CallContext`] carrying the caller's cancellation token and the
//! per-call deadline; both surface as transient errors.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::RemoteError;
use crate::resource::{ResourceKind, UpdateRequest};

/// Default per-call timeout in seconds.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Metadata returned alongside a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// Opaque version string of the returned object.
    pub concurrency_token: Option<String>,
}

/// Cancellation and deadline shared by the calls of one pass.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Cancelled by the caller to abort in-flight calls.
    pub cancel: CancellationToken,
    /// Deadline applied to each call.
    pub timeout: Duration,
}

/// Typed calls against one remote collection.
#[async_trait]
pub trait RemoteClient<K: ResourceKind>: Send + Sync {
    /// Fetches the object named `id`.
    async fn get(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> RemoteResult<(K::Remote, ResponseMetadata)>;

    /// Creates a new object.
    async fn create(&self, ctx: &CallContext, request: &K::CreateRequest)
    -> RemoteResult<K::Remote>;

    /// Replaces the mutable fields of an existing object.
    async fn update(
        &self,
        ctx: &CallContext,
        request: &UpdateRequest<K::UpdateBody>,
    ) -> RemoteResult<K::Remote>;

    /// Deletes the object named `id`.
    async fn delete(&self, ctx: &CallContext, id: &str) -> RemoteResult<()>;
}

impl CallContext {
    /// Creates a context with the given deadline.
    #[must_use]
    pub fn new(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    /// Runs `call` until it completes, the token is cancelled or the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or a transient error on cancellation or timeout.
    pub async fn run<T, F>(&self, call: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>> + Send,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(RemoteError::cancelled()),
            result = tokio::time::timeout(self.timeout, call) => {
                result.unwrap_or_else(|_| Err(RemoteError::timed_out(self.timeout)))
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}
