//! Single reconciliation pass.
//!
//! [`Reconciler`] loads a declarative resource, connects a client for the
//! pass, deletes the remote object when deletion was requested and otherwise
//! runs observe followed by create, update or nothing, then records the
//! outcome on the resource. Scheduling and requeueing belong to
//! the caller; a failed pass returns an error the caller classifies with
//! [`ProviderError::is_retryable`].

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{Phase, ProviderError, ReconcileError, Result};
use crate::remote::{CallContext, Connector, DEFAULT_CALL_TIMEOUT_SECS};
use crate::resource::{DeletionPolicy, Event, ManagedOf, ResourceKind};
use crate::store::ResourceStore;

use super::external::ExternalClient;

/// What a pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    /// The remote object was created.
    Created {
        /// Identifier recorded for the new object.
        external_name: String,
    },
    /// The remote object was brought back to desired state.
    Updated {
        /// Fields that had drifted.
        fields: Vec<String>,
    },
    /// The remote object already matched desired state.
    UpToDate,
    /// The remote object was deleted and the resource removed.
    Deleted,
    /// The resource was removed and the remote object left in place.
    Orphaned,
}

/// Runs reconciliation passes for one resource kind.
pub struct Reconciler<K: ResourceKind> {
    store: Arc<dyn ResourceStore<K>>,
    connector: Arc<dyn Connector<K>>,
    call_timeout: Duration,
}

impl<K: ResourceKind> Reconciler<K> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore<K>>, connector: Arc<dyn Connector<K>>) -> Self {
        Self {
            store,
            connector,
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }

    /// Sets the deadline applied to each remote call.
    #[must_use]
    pub const fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Runs one pass for the resource `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be loaded, the client cannot be
    /// built, or any phase fails. The failure is recorded on the resource
    /// before returning.
    pub async fn reconcile(&self, name: &str, cancel: CancellationToken) -> Result<ReconcileOutcome> {
        let mut mr = self.store.get(name).await?;
        info!(
            "Reconciling {} '{name}' from {} store",
            K::KIND,
            self.store.backend_type()
        );

        let ctx = CallContext::new(cancel, self.call_timeout);
        let result = match self.connector.connect().await {
            Ok(client) => {
                let external = ExternalClient::new(client, Arc::clone(&self.store), ctx);
                Self::run(&external, &mut mr).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome @ (ReconcileOutcome::Deleted | ReconcileOutcome::Orphaned)) => {
                self.store.remove(name).await?;
                info!("{} '{name}': {outcome}", K::KIND);
                Ok(outcome)
            }
            Ok(outcome) => {
                Self::record_success(&mut mr, &outcome);
                self.store.update(&mr).await?;
                info!("{} '{name}': {outcome}", K::KIND);
                Ok(outcome)
            }
            Err(e) => {
                Self::record_failure(&mut mr, &e);
                if let Err(store_err) = self.store.update(&mr).await {
                    warn!("Cannot record failure on {} '{name}': {store_err}", K::KIND);
                }
                if e.is_retryable() {
                    warn!("{} '{name}' failed, will retry: {e}", K::KIND);
                } else {
                    error!("{} '{name}' failed: {e}", K::KIND);
                }
                Err(e)
            }
        }
    }

    async fn run(external: &ExternalClient<K>, mr: &mut ManagedOf<K>) -> Result<ReconcileOutcome> {
        if mr.metadata.deletion_requested {
            if mr.spec.deletion_policy == DeletionPolicy::Orphan {
                return Ok(ReconcileOutcome::Orphaned);
            }
            external.delete(mr).await?;
            return Ok(ReconcileOutcome::Deleted);
        }

        let observation = external.observe(mr).await?;

        if !observation.resource_exists {
            external.create(mr).await?;
            return Ok(ReconcileOutcome::Created {
                external_name: mr.external_name().unwrap_or_default().to_string(),
            });
        }

        if !observation.resource_up_to_date {
            external.update(mr).await?;
            return Ok(ReconcileOutcome::Updated {
                fields: observation.drifted_fields,
            });
        }

        Ok(ReconcileOutcome::UpToDate)
    }

    fn record_success(mr: &mut ManagedOf<K>, outcome: &ReconcileOutcome) {
        mr.status.synced = true;
        mr.status.message = None;
        mr.status.last_reconciled = Some(Utc::now());

        match outcome {
            ReconcileOutcome::Created { external_name } => mr.record_event(Event::normal(
                "CreatedExternalResource",
                format!("Created {} {external_name}", K::KIND),
            )),
            ReconcileOutcome::Updated { fields } => mr.record_event(Event::normal(
                "UpdatedExternalResource",
                format!("Updated drifted fields: {}", fields.join(", ")),
            )),
            _ => {}
        }
    }

    fn record_failure(mr: &mut ManagedOf<K>, err: &ProviderError) {
        mr.status.synced = false;
        mr.status.message = Some(err.to_string());
        mr.status.last_reconciled = Some(Utc::now());
        mr.record_event(Event::warning(failure_reason(err), err.to_string()));
    }
}

/// Event reason for a failed pass.
fn failure_reason(err: &ProviderError) -> &'static str {
    match err {
        ProviderError::Reconcile(ReconcileError::Remote { phase, .. }) => match phase {
            Phase::Observe => "CannotObserveExternalResource",
            Phase::Create => "CannotCreateExternalResource",
            Phase::Update => "CannotUpdateExternalResource",
            Phase::Delete => "CannotDeleteExternalResource",
        },
        ProviderError::Reconcile(ReconcileError::PersistLateInit { .. }) => {
            "CannotPersistLateInitialization"
        }
        ProviderError::Config(_) => "CannotConnectExternalResource",
        ProviderError::Mapping { .. } => "CannotMapExternalResource",
        _ => "ReconcileError",
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created { external_name } => write!(f, "created as {external_name}"),
            Self::Updated { fields } if fields.is_empty() => write!(f, "updated"),
            Self::Updated { fields } => write!(f, "updated ({})", fields.join(", ")),
            Self::UpToDate => write!(f, "up to date"),
            Self::Deleted => write!(f, "deleted"),
            Self::Orphaned => write!(f, "orphaned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, RemoteError};
    use crate::kinds::{RemoteRole, Role, RoleBody, RoleParameters};
    use crate::remote::{InMemoryRemote, Operation, StaticConnector};
    use crate::resource::{ConditionStatus, EventType, ManagedResource};
    use crate::store::MemoryResourceStore;

    struct Fixture {
        remote: Arc<InMemoryRemote<Role>>,
        store: Arc<MemoryResourceStore>,
        reconciler: Reconciler<Role>,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(InMemoryRemote::<Role>::new(
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
                ..current.clone()
            }),
        ));
        let store = Arc::new(MemoryResourceStore::new());
        let connector = Arc::new(StaticConnector::new(
            Arc::clone(&remote) as Arc<dyn crate::remote::RemoteClient<Role>>
        ));
        let reconciler = Reconciler::new(Arc::clone(&store) as Arc<dyn ResourceStore<Role>>, connector);
        Fixture {
            remote,
            store,
            reconciler,
        }
    }

    fn editor() -> ManagedOf<Role> {
        ManagedResource::new(
            "editor",
            RoleParameters {
                display_name: "Editor".to_string(),
                description: Some("editor role".to_string()),
                actions: Some(vec!["a.create".to_string()]),
                project_id: None,
                project_id_ref: None,
                project_id_selector: None,
            },
        )
    }

    async fn stored(fixture: &Fixture) -> ManagedOf<Role> {
        ResourceStore::<Role>::get(fixture.store.as_ref(), "editor")
            .await
            .expect("resource stored")
    }

    #[tokio::test]
    async fn test_first_pass_creates_then_converges() {
        let fixture = fixture();
        ResourceStore::<Role>::update(fixture.store.as_ref(), &editor())
            .await
            .expect("seed");

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("first pass");
        assert_eq!(
            outcome,
            ReconcileOutcome::Created {
                external_name: "id-1".to_string()
            }
        );

        let mr = stored(&fixture).await;
        assert_eq!(mr.external_name(), Some("id-1"));
        assert!(mr.status.synced);
        assert_eq!(mr.status.events.len(), 1);

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("second pass");
        assert_eq!(outcome, ReconcileOutcome::UpToDate);
        assert_eq!(
            stored(&fixture).await.status.condition,
            Some(ConditionStatus::Available)
        );
    }

    #[tokio::test]
    async fn test_drift_is_corrected() {
        let fixture = fixture();
        ResourceStore::<Role>::update(fixture.store.as_ref(), &editor())
            .await
            .expect("seed");
        fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("create");

        fixture
            .remote
            .mutate("id-1", |role| role.actions = vec!["a.delete".to_string()])
            .await;

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("update");
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                fields: vec!["actions".to_string()]
            }
        );
        let remote = fixture.remote.object("id-1").await.expect("remote role");
        assert_eq!(remote.actions, ["a.create"]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let fixture = fixture();
        ResourceStore::<Role>::update(fixture.store.as_ref(), &editor())
            .await
            .expect("seed");
        fixture
            .remote
            .fail_next(Operation::Create, RemoteError::from_status(500, "boom"))
            .await;

        let err = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect_err("create fails");
        assert_eq!(err.remote_kind(), Some(ErrorKind::Transient));

        let mr = stored(&fixture).await;
        assert!(!mr.status.synced);
        assert!(mr.status.message.as_deref().is_some_and(|m| m.contains("boom")));
        let event = mr.status.events.last().expect("event recorded");
        assert_eq!(event.event_type, EventType::Warning);
        assert_eq!(event.reason, "CannotCreateExternalResource");
        assert_eq!(mr.status.condition, Some(ConditionStatus::Creating));
    }

    #[tokio::test]
    async fn test_deletion_removes_resource() {
        let fixture = fixture();
        ResourceStore::<Role>::update(fixture.store.as_ref(), &editor())
            .await
            .expect("seed");
        fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("create");

        let mut mr = stored(&fixture).await;
        mr.metadata.deletion_requested = true;
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("mark for deletion");

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("delete");
        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert!(fixture.remote.object("id-1").await.is_none());
        assert!(
            ResourceStore::<Role>::get(fixture.store.as_ref(), "editor")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_resource() {
        let fixture = fixture();
        let mut mr = editor();
        mr.set_external_name("r1");
        mr.metadata.deletion_requested = true;
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("seed");
        fixture
            .remote
            .insert(
                RemoteRole {
                    id: "r1".to_string(),
                    display_name: "Editor".to_string(),
                    description: Some("editor role".to_string()),
                    actions: vec!["a.create".to_string()],
                    project_id: None,
                    create_time: "2024-05-01T10:00:00Z".to_string(),
                    update_time: None,
                },
                "etag-1",
            )
            .await;
        fixture
            .remote
            .fail_next(Operation::Delete, RemoteError::transient("connection reset"))
            .await;

        let err = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect_err("delete fails");

        assert!(err.is_retryable());
        let mr = stored(&fixture).await;
        assert_eq!(mr.status.condition, Some(ConditionStatus::Deleting));
    }

    #[tokio::test]
    async fn test_unmappable_remote_is_still_deleted() {
        let fixture = fixture();
        let mut mr = editor();
        mr.set_external_name("r1");
        mr.metadata.deletion_requested = true;
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("seed");
        fixture
            .remote
            .insert(
                RemoteRole {
                    id: "r1".to_string(),
                    display_name: "Editor".to_string(),
                    description: None,
                    actions: Vec::new(),
                    project_id: None,
                    create_time: "garbage".to_string(),
                    update_time: None,
                },
                "etag-1",
            )
            .await;

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("delete");

        assert_eq!(outcome, ReconcileOutcome::Deleted);
        assert_eq!(fixture.remote.count(Operation::Delete).await, 1);
        assert_eq!(fixture.remote.count(Operation::Get).await, 0);
        assert!(fixture.remote.object("r1").await.is_none());
        assert!(
            ResourceStore::<Role>::get(fixture.store.as_ref(), "editor")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_rejected_delete_is_retryable() {
        let fixture = fixture();
        let mut mr = editor();
        mr.set_external_name("r1");
        mr.metadata.deletion_requested = true;
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("seed");
        fixture
            .remote
            .fail_next(Operation::Delete, RemoteError::from_status(403, "forbidden"))
            .await;

        let err = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect_err("delete rejected");

        assert_eq!(err.remote_kind(), Some(ErrorKind::Fatal));
        assert!(err.is_retryable());
        assert!(err.retry_delay_secs().is_some());
        let mr = stored(&fixture).await;
        assert_eq!(mr.status.events.last().map(|e| e.reason.as_str()), Some("CannotDeleteExternalResource"));
    }

    #[tokio::test]
    async fn test_orphan_policy_skips_remote() {
        let fixture = fixture();
        let mut mr = editor();
        mr.set_external_name("r1");
        mr.metadata.deletion_requested = true;
        mr.spec.deletion_policy = DeletionPolicy::Orphan;
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("seed");

        let outcome = fixture
            .reconciler
            .reconcile("editor", CancellationToken::new())
            .await
            .expect("orphan");

        assert_eq!(outcome, ReconcileOutcome::Orphaned);
        assert!(fixture.remote.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_pass_is_retryable() {
        let fixture = fixture();
        let mut mr = editor();
        mr.set_external_name("r1");
        ResourceStore::<Role>::update(fixture.store.as_ref(), &mr)
            .await
            .expect("seed");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = fixture
            .reconciler
            .reconcile("editor", cancel)
            .await
            .expect_err("pass cancelled");

        assert!(err.is_retryable());
        assert_eq!(err.remote_kind(), Some(ErrorKind::Transient));
    }

    #[tokio::test]
    async fn test_missing_resource() {
        let fixture = fixture();
        assert!(
            fixture
                .reconciler
                .reconcile("nobody", CancellationToken::new())
                .await
                .is_err()
        );
    }
}
