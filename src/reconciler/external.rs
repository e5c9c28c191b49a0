//! Observe, create, update and delete against the remote API.
//!
//! [`ExternalClient`] is the per-pass state machine for one declarative
//! resource. It holds the client built for this pass and never retries: every
//! failure is wrapped with the phase it happened in and returned.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ReconcileError, RemoteError, Phase, Result};
use crate::remote::{CallContext, RemoteClient};
use crate::resource::{ConditionStatus, ManagedOf, ResourceKind};
use crate::store::ResourceStore;

use super::drift::{drifted_fields, is_up_to_date};

/// What an observation found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// The remote object exists.
    pub resource_exists: bool,
    /// The remote object matches desired state.
    pub resource_up_to_date: bool,
    /// Late initialization changed desired state.
    pub resource_late_initialized: bool,
    /// Top-level fields that differ, when not up to date.
    pub drifted_fields: Vec<String>,
}

/// State machine for one resource kind, valid for one pass.
pub struct ExternalClient<K: ResourceKind> {
    client: Arc<dyn RemoteClient<K>>,
    store: Arc<dyn ResourceStore<K>>,
    ctx: CallContext,
}

impl Observation {
    /// Observation of a remote object that does not exist.
    #[must_use]
    pub fn absent() -> Self {
        Self::default()
    }
}

fn remote_failure<K: ResourceKind>(phase: Phase, name: &str, source: RemoteError) -> ProviderError {
    ProviderError::Reconcile(ReconcileError::Remote {
        phase,
        kind: K::KIND,
        name: name.to_string(),
        source,
    })
}

impl<K: ResourceKind> ExternalClient<K> {
    /// Creates a state machine around a connected client.
    #[must_use]
    pub fn new(
        client: Arc<dyn RemoteClient<K>>,
        store: Arc<dyn ResourceStore<K>>,
        ctx: CallContext,
    ) -> Self {
        Self { client, store, ctx }
    }

    /// Fetches the remote object and compares it with desired state.
    ///
    /// Without an external name the remote API is not called. Late-initialized
    /// fields are persisted before this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails for any reason other than absence,
    /// if the late-initialized resource cannot be persisted, or if the remote
    /// object cannot be mapped.
    pub async fn observe(&self, mr: &mut ManagedOf<K>) -> Result<Observation> {
        let Some(id) = mr.external_name().map(ToString::to_string) else {
            debug!("{} '{}' has no external name", K::KIND, mr.name());
            return Ok(Observation::absent());
        };

        let (remote, metadata) = match self.client.get(&self.ctx, &id).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                debug!("{} '{}' not found remotely as {id}", K::KIND, mr.name());
                return Ok(Observation::absent());
            }
            Err(e) => return Err(remote_failure::<K>(Phase::Observe, mr.name(), e)),
        };

        mr.set_concurrency_token(metadata.concurrency_token.as_deref());

        let late_initialized = K::late_initialize(&mut mr.spec.for_provider, &remote);
        if late_initialized {
            debug!("Late-initialized {} '{}'", K::KIND, mr.name());
            self.store.update(mr).await.map_err(|e| match e {
                ProviderError::Store(source) => {
                    ProviderError::Reconcile(ReconcileError::PersistLateInit {
                        kind: K::KIND,
                        name: mr.name().to_string(),
                        source,
                    })
                }
                other => other,
            })?;
        }

        mr.status.at_provider = Some(K::to_observed(&remote)?);

        let up_to_date = is_up_to_date::<K>(&mr.spec.for_provider, &remote)?;
        let drifted = if up_to_date {
            Vec::new()
        } else {
            drifted_fields::<K>(&mr.spec.for_provider, &remote)?
        };

        mr.set_condition(if K::is_available(&remote) {
            ConditionStatus::Available
        } else {
            ConditionStatus::Unavailable
        });

        Ok(Observation {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            resource_late_initialized: late_initialized,
            drifted_fields: drifted,
        })
    }

    /// Creates the remote object and records its external name.
    ///
    /// An "already exists" conflict on a name-addressed kind adopts the
    /// existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the creation fails.
    pub async fn create(&self, mr: &mut ManagedOf<K>) -> Result<()> {
        mr.set_condition(ConditionStatus::Creating);

        let request = K::to_create_request(&mr.spec.for_provider);
        let deterministic = K::deterministic_name(&mr.spec.for_provider);

        match self.client.create(&self.ctx, &request).await {
            Ok(remote) => {
                let id = deterministic.unwrap_or_else(|| K::external_name_of(&remote));
                info!("Created {} '{}' as {id}", K::KIND, mr.name());
                mr.set_external_name(id);
                Ok(())
            }
            Err(e) if e.is_conflict() && deterministic.is_some() => {
                let id = deterministic.unwrap_or_default();
                info!("{} '{}' already exists as {id}, adopting it", K::KIND, mr.name());
                mr.set_external_name(id);
                Ok(())
            }
            Err(e) => {
                // The request may have been applied before the call was cut short.
                if e.is_retryable()
                    && !e.is_conflict()
                    && let Some(id) = deterministic
                {
                    warn!(
                        "Create of {} '{}' interrupted, assuming {id} exists",
                        K::KIND,
                        mr.name()
                    );
                    mr.set_external_name(id);
                }
                Err(remote_failure::<K>(Phase::Create, mr.name(), e))
            }
        }
    }

    /// Writes desired state to the remote object.
    ///
    /// The request carries the concurrency token from the last observation.
    ///
    /// # Errors
    ///
    /// Returns an error if no external name is recorded or the update fails.
    pub async fn update(&self, mr: &ManagedOf<K>) -> Result<()> {
        let Some(id) = mr.external_name() else {
            return Err(ReconcileError::MissingExternalName {
                kind: K::KIND,
                name: mr.name().to_string(),
            }
            .into());
        };

        let request = K::to_update_request(id, mr.concurrency_token(), &mr.spec.for_provider);

        self.client
            .update(&self.ctx, &request)
            .await
            .map_err(|e| remote_failure::<K>(Phase::Update, mr.name(), e))?;

        info!("Updated {} '{}' ({})", K::KIND, mr.name(), request.id);
        Ok(())
    }

    /// Deletes the remote object. A missing object counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion fails for any reason other than absence.
    pub async fn delete(&self, mr: &mut ManagedOf<K>) -> Result<()> {
        mr.set_condition(ConditionStatus::Deleting);

        let Some(id) = mr.external_name().map(ToString::to_string) else {
            debug!("{} '{}' has no external name, nothing to delete", K::KIND, mr.name());
            return Ok(());
        };

        match self.client.delete(&self.ctx, &id).await {
            Ok(()) => {
                info!("Deleted {} '{}' ({id})", K::KIND, mr.name());
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!("{} '{}' already gone ({id})", K::KIND, mr.name());
                Ok(())
            }
            Err(e) => Err(remote_failure::<K>(Phase::Delete, mr.name(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::kinds::{
        CreatePolicyRequest, Policy, PolicyBody, PolicyParameters, RemotePolicy, RemoteRole,
        Role, RoleBody, RoleParameters,
    };
    use crate::remote::{InMemoryRemote, Operation};
    use crate::resource::{ANNOTATION_CONCURRENCY_TOKEN, ManagedResource};
    use crate::store::MemoryResourceStore;

    fn roles() -> Arc<InMemoryRemote<Role>> {
        Arc::new(InMemoryRemote::new(
            Box::new(|body: &RoleBody, id: &str| RemoteRole {
                id: id.to_string(),
                display_name: body.display_name.clone(),
                description: body.description.clone(),
                actions: body.actions.clone().unwrap_or_default(),
                project_id: body.project_id.clone(),
                create_time: "2024-05-01T10:00:00Z".to_string(),
                update_time: None,
            }),
            Box::new(|current: &RemoteRole, body: &RoleBody| RemoteRole {
                display_name: body.display_name.clone(),
                description: body.description.clone(),
                actions: body.actions.clone().unwrap_or_default(),
                project_id: body.project_id.clone(),
                update_time: Some("2024-05-02T10:00:00Z".to_string()),
                ..current.clone()
            }),
        ))
    }

    fn policies() -> Arc<InMemoryRemote<Policy>> {
        Arc::new(InMemoryRemote::new(
            Box::new(|request: &CreatePolicyRequest, _: &str| RemotePolicy {
                name: request.name.clone(),
                description: request.body.description.clone(),
                statements: Vec::new(),
                role_ids: request.body.role_ids.clone().unwrap_or_default(),
                version: 1,
                updated: "2024-05-01 10:00:00".to_string(),
            }),
            Box::new(|current: &RemotePolicy, body: &PolicyBody| RemotePolicy {
                description: body.description.clone(),
                ..current.clone()
            }),
        ))
    }

    fn remote_editor() -> RemoteRole {
        RemoteRole {
            id: "r1".to_string(),
            display_name: "Editor".to_string(),
            description: Some("editor role".to_string()),
            actions: vec!["a.create".to_string(), "a.update".to_string()],
            project_id: None,
            create_time: "2024-05-01T10:00:00Z".to_string(),
            update_time: None,
        }
    }

    fn editor() -> ManagedOf<Role> {
        ManagedResource::new(
            "editor",
            RoleParameters {
                display_name: "Editor".to_string(),
                description: None,
                actions: Some(vec!["a.create".to_string(), "a.update".to_string()]),
                project_id: None,
                project_id_ref: None,
                project_id_selector: None,
            },
        )
    }

    fn read_only() -> ManagedOf<Policy> {
        ManagedResource::new(
            "read-only",
            PolicyParameters {
                name: "read-only".to_string(),
                description: Some("read access".to_string()),
                statements: None,
                role_ids: None,
                role_id_refs: None,
                role_id_selector: None,
            },
        )
    }

    fn machine<K: ResourceKind>(
        remote: Arc<InMemoryRemote<K>>,
        store: Arc<MemoryResourceStore>,
    ) -> ExternalClient<K> {
        ExternalClient::new(remote, store, CallContext::default())
    }

    #[tokio::test]
    async fn test_observe_without_external_name_skips_remote() {
        let remote = roles();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        let observation = machine.observe(&mut mr).await.expect("observe");

        assert_eq!(observation, Observation::absent());
        assert!(remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_observe_not_found_is_absent() {
        let remote = roles();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let observation = machine.observe(&mut mr).await.expect("observe");

        assert!(!observation.resource_exists);
        assert_eq!(mr.status.condition, None);
    }

    #[tokio::test]
    async fn test_observe_late_initializes_and_persists() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let observation = machine.observe(&mut mr).await.expect("observe");

        assert!(observation.resource_exists);
        assert!(observation.resource_up_to_date);
        assert!(observation.resource_late_initialized);
        assert_eq!(
            mr.spec.for_provider.description.as_deref(),
            Some("editor role")
        );
        assert_eq!(mr.concurrency_token(), Some("etag-1"));
        assert_eq!(mr.status.condition, Some(ConditionStatus::Available));

        let stored = ResourceStore::<Role>::get(store.as_ref(), "editor")
            .await
            .expect("persisted");
        assert_eq!(
            stored.spec.for_provider.description.as_deref(),
            Some("editor role")
        );
        assert_eq!(
            stored.metadata.annotations.get(ANNOTATION_CONCURRENCY_TOKEN).map(String::as_str),
            Some("etag-1")
        );
    }

    #[tokio::test]
    async fn test_observe_is_idempotent() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let first = machine.observe(&mut mr).await.expect("observe");
        let after_first = mr.clone();
        let second = machine.observe(&mut mr).await.expect("observe");

        assert!(first.resource_late_initialized);
        assert!(!second.resource_late_initialized);
        assert_eq!(first.resource_up_to_date, second.resource_up_to_date);
        assert_eq!(mr, after_first);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_observe_transient_failure_changes_nothing() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        remote
            .fail_next(Operation::Get, RemoteError::from_status(503, "unavailable"))
            .await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let before = mr.clone();
        let err = machine.observe(&mut mr).await.expect_err("observe fails");

        assert!(err.is_retryable());
        assert_eq!(err.remote_kind(), Some(ErrorKind::Transient));
        assert_eq!(mr, before);
    }

    #[tokio::test]
    async fn test_observe_forbidden_is_retryable() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        remote
            .fail_next(Operation::Get, RemoteError::from_status(403, "forbidden"))
            .await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let err = machine.observe(&mut mr).await.expect_err("observe fails");

        assert!(err.is_retryable());
        assert_eq!(err.remote_kind(), Some(ErrorKind::Fatal));
        assert_eq!(mr.external_name(), Some("r1"));
    }

    #[tokio::test]
    async fn test_create_records_remote_id() {
        let remote = roles();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        machine.create(&mut mr).await.expect("create");

        assert_eq!(mr.external_name(), Some("id-1"));
        assert_eq!(mr.status.condition, Some(ConditionStatus::Creating));
        assert!(remote.object("id-1").await.is_some());
    }

    #[tokio::test]
    async fn test_create_name_addressed_uses_deterministic_name() {
        let remote = policies();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = read_only();
        machine.create(&mut mr).await.expect("create");
        assert_eq!(mr.external_name(), Some("read-only"));
    }

    #[tokio::test]
    async fn test_create_conflict_adopts_existing() {
        let remote = policies();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut first = read_only();
        machine.create(&mut first).await.expect("create");

        let mut second = read_only();
        machine.create(&mut second).await.expect("conflict is not fatal");
        assert_eq!(second.external_name(), Some("read-only"));
    }

    #[tokio::test]
    async fn test_create_fatal_failure_surfaces() {
        let remote = roles();
        remote
            .fail_next(Operation::Create, RemoteError::from_status(400, "bad request"))
            .await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        let err = machine.create(&mut mr).await.expect_err("create fails");

        assert!(!err.is_retryable());
        assert_eq!(mr.external_name(), None);
    }

    #[tokio::test]
    async fn test_interrupted_create_assumes_success_for_named_kinds() {
        let remote = policies();
        remote
            .fail_next(Operation::Create, RemoteError::cancelled())
            .await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = read_only();
        let err = machine.create(&mut mr).await.expect_err("create interrupted");

        assert!(err.is_retryable());
        assert_eq!(mr.external_name(), Some("read-only"));
    }

    #[tokio::test]
    async fn test_update_carries_id_and_token() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        machine.observe(&mut mr).await.expect("observe");

        mr.spec.for_provider.actions = Some(vec!["a.create".to_string()]);
        machine.update(&mr).await.expect("update");

        let calls = remote.calls().await;
        let update = calls
            .iter()
            .find(|call| call.operation == Operation::Update)
            .expect("update call");
        assert_eq!(update.id.as_deref(), Some("r1"));
        assert_eq!(update.concurrency_token.as_deref(), Some("etag-1"));
    }

    #[tokio::test]
    async fn test_stale_token_update_is_retryable() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        machine.observe(&mut mr).await.expect("observe");
        remote
            .mutate("r1", |role| role.display_name = "Changed".to_string())
            .await;

        let err = machine.update(&mr).await.expect_err("token is stale");
        assert!(err.is_retryable());
        assert_eq!(err.remote_kind(), Some(ErrorKind::Conflict));
    }

    #[tokio::test]
    async fn test_update_without_external_name() {
        let remote = roles();
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mr = editor();
        let err = machine.update(&mr).await.expect_err("nothing to update");
        assert!(matches!(
            err,
            ProviderError::Reconcile(ReconcileError::MissingExternalName { .. })
        ));
        assert!(remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        machine.delete(&mut mr).await.expect("delete");
        machine.delete(&mut mr).await.expect("second delete succeeds");

        assert_eq!(mr.status.condition, Some(ConditionStatus::Deleting));
        assert!(remote.object("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_is_retryable() {
        let remote = roles();
        remote.insert(remote_editor(), "etag-1").await;
        remote
            .fail_next(Operation::Delete, RemoteError::transient("connection reset"))
            .await;
        let store = Arc::new(MemoryResourceStore::new());
        let machine = machine(Arc::clone(&remote), Arc::clone(&store));

        let mut mr = editor();
        mr.set_external_name("r1");
        let err = machine.delete(&mut mr).await.expect_err("delete fails");

        assert!(err.is_retryable());
        assert!(remote.object("r1").await.is_some());
    }
}
