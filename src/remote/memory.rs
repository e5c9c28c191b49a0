//! In-memory remote API.
//!
//! Behaves like the REST API for one collection: it assigns versions, rejects
//! stale concurrency tokens and duplicate creations, and records every call.
//! Failures can be injected per operation. Used by tests and local dry runs.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::error::RemoteError;
use crate::resource::{ResourceKind, UpdateRequest};

use super::client::{CallContext, RemoteClient, RemoteResult, ResponseMetadata};

/// Builds the stored object for a creation request and a fresh identifier.
pub type CreateFn<K> = Box<
    dyn Fn(&<K as ResourceKind>::CreateRequest, &str) -> <K as ResourceKind>::Remote + Send + Sync,
>;

/// Applies an update body to the stored object.
pub type UpdateFn<K> = Box<
    dyn Fn(&<K as ResourceKind>::Remote, &<K as ResourceKind>::UpdateBody) -> <K as ResourceKind>::Remote
        + Send
        + Sync,
>;

/// Remote operation, for call recording and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Fetch.
    Get,
    /// Creation.
    Create,
    /// Replacement.
    Update,
    /// Deletion.
    Delete,
}

/// A recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    /// Operation performed.
    pub operation: Operation,
    /// Target identifier, if the operation has one.
    pub id: Option<String>,
    /// Concurrency token sent with an update.
    pub concurrency_token: Option<String>,
}

struct Stored<R> {
    remote: R,
    etag: String,
}

struct State<R> {
    objects: BTreeMap<String, Stored<R>>,
    calls: Vec<RemoteCall>,
    failures: HashMap<Operation, RemoteError>,
    next_id: u64,
    next_version: u64,
}

/// In-memory remote collection for kind `K`.
pub struct InMemoryRemote<K: ResourceKind> {
    state: Mutex<State<K::Remote>>,
    on_create: CreateFn<K>,
    on_update: UpdateFn<K>,
}

impl<R> State<R> {
    fn next_etag(&mut self) -> String {
        self.next_version += 1;
        format!("etag-{}", self.next_version)
    }

    fn record(&mut self, operation: Operation, id: Option<&str>, token: Option<&str>) {
        self.calls.push(RemoteCall {
            operation,
            id: id.map(ToString::to_string),
            concurrency_token: token.map(ToString::to_string),
        });
    }
}

impl<K: ResourceKind> InMemoryRemote<K> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(on_create: CreateFn<K>, on_update: UpdateFn<K>) -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                calls: Vec::new(),
                failures: HashMap::new(),
                next_id: 0,
                next_version: 0,
            }),
            on_create,
            on_update,
        }
    }

    /// Stores `remote` with the given version, as if created out of band.
    pub async fn insert(&self, remote: K::Remote, etag: &str) {
        let id = K::external_name_of(&remote);
        let mut state = self.state.lock().await;
        state.next_version += 1;
        state.objects.insert(
            id,
            Stored {
                remote,
                etag: etag.to_string(),
            },
        );
    }

    /// Mutates a stored object out of band, bumping its version.
    ///
    /// Returns false if the object does not exist.
    pub async fn mutate(&self, id: &str, change: impl FnOnce(&mut K::Remote)) -> bool {
        let mut state = self.state.lock().await;
        let etag = state.next_etag();
        let Some(stored) = state.objects.get_mut(id) else {
            return false;
        };
        change(&mut stored.remote);
        stored.etag = etag;
        true
    }

    /// Removes a stored object out of band.
    pub async fn remove(&self, id: &str) -> Option<K::Remote> {
        self.state
            .lock()
            .await
            .objects
            .remove(id)
            .map(|stored| stored.remote)
    }

    /// Returns a stored object.
    pub async fn object(&self, id: &str) -> Option<K::Remote> {
        self.state
            .lock()
            .await
            .objects
            .get(id)
            .map(|stored| stored.remote.clone())
    }

    /// Returns the current version of a stored object.
    pub async fn etag(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .objects
            .get(id)
            .map(|stored| stored.etag.clone())
    }

    /// Makes the next call of `operation` fail with `error`.
    pub async fn fail_next(&self, operation: Operation, error: RemoteError) {
        self.state.lock().await.failures.insert(operation, error);
    }

    /// Returns every call received so far.
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    /// Returns how many calls of `operation` were received.
    pub async fn count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }
}

#[async_trait]
impl<K: ResourceKind> RemoteClient<K> for InMemoryRemote<K> {
    async fn get(
        &self,
        ctx: &CallContext,
        id: &str,
    ) -> RemoteResult<(K::Remote, ResponseMetadata)> {
        ctx.run(async {
            let mut state = self.state.lock().await;
            state.record(Operation::Get, Some(id), None);
            if let Some(error) = state.failures.remove(&Operation::Get) {
                return Err(error);
            }

            let stored = state
                .objects
                .get(id)
                .ok_or_else(|| RemoteError::not_found(format!("{} {id} not found", K::KIND)))?;
            Ok((
                stored.remote.clone(),
                ResponseMetadata {
                    concurrency_token: Some(stored.etag.clone()),
                },
            ))
        })
        .await
    }

    async fn create(
        &self,
        ctx: &CallContext,
        request: &K::CreateRequest,
    ) -> RemoteResult<K::Remote> {
        ctx.run(async {
            let mut state = self.state.lock().await;
            state.record(Operation::Create, None, None);
            if let Some(error) = state.failures.remove(&Operation::Create) {
                return Err(error);
            }

            state.next_id += 1;
            let remote = (self.on_create)(request, &format!("id-{}", state.next_id));
            let id = K::external_name_of(&remote);
            if state.objects.contains_key(&id) {
                return Err(RemoteError::from_status(
                    409,
                    format!("{} {id} already exists", K::KIND),
                ));
            }

            let etag = state.next_etag();
            state.objects.insert(
                id,
                Stored {
                    remote: remote.clone(),
                    etag,
                },
            );
            Ok(remote)
        })
        .await
    }

    async fn update(
        &self,
        ctx: &CallContext,
        request: &UpdateRequest<K::UpdateBody>,
    ) -> RemoteResult<K::Remote> {
        ctx.run(async {
            let mut state = self.state.lock().await;
            state.record(
                Operation::Update,
                Some(&request.id),
                request.concurrency_token.as_deref(),
            );
            if let Some(error) = state.failures.remove(&Operation::Update) {
                return Err(error);
            }

            let etag = state.next_etag();
            let Some(stored) = state.objects.get_mut(&request.id) else {
                return Err(RemoteError::not_found(format!(
                    "{} {} not found",
                    K::KIND,
                    request.id
                )));
            };
            if let Some(token) = &request.concurrency_token {
                if *token != stored.etag {
                    return Err(RemoteError::from_status(
                        412,
                        format!("{} {} was modified", K::KIND, request.id),
                    ));
                }
            }

            stored.remote = (self.on_update)(&stored.remote, &request.body);
            stored.etag = etag;
            Ok(stored.remote.clone())
        })
        .await
    }

    async fn delete(&self, ctx: &CallContext, id: &str) -> RemoteResult<()> {
        ctx.run(async {
            let mut state = self.state.lock().await;
            state.record(Operation::Delete, Some(id), None);
            if let Some(error) = state.failures.remove(&Operation::Delete) {
                return Err(error);
            }

            state
                .objects
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| RemoteError::not_found(format!("{} {id} not found", K::KIND)))
        })
        .await
    }
}
