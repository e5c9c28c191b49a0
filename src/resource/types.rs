//! Declarative resource types.
//!
//! A [`ManagedResource`] bundles the user's desired state, the last observed
//! snapshot of the remote object and the side-channel metadata (external name,
//! concurrency token) the reconciler needs between passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Annotation holding the identifier of the remote object.
pub const ANNOTATION_EXTERNAL_NAME: &str = "crossplane.io/external-name";

/// Annotation holding the last observed concurrency token.
pub const ANNOTATION_CONCURRENCY_TOKEN: &str = "xprovider.io/concurrency-token";

/// Maximum number of events kept on a resource.
pub const MAX_EVENTS: usize = 20;

/// A declarative resource reconciled against the remote API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedResource<D, O> {
    /// Object metadata.
    pub metadata: ObjectMeta,
    /// Desired state.
    pub spec: ResourceSpec<D>,
    /// Observed state and reconciliation status.
    #[serde(default = "ResourceStatus::default")]
    pub status: ResourceStatus<O>,
}

/// Object metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Name of the declarative resource, unique per kind.
    pub name: String,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Set once the user asked for the resource to be removed.
    #[serde(default)]
    pub deletion_requested: bool,
}

/// Desired state wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec<D> {
    /// Parameters sent to the remote API.
    pub for_provider: D,
    /// What happens to the remote object when the resource is deleted.
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Deletion behaviour for the remote object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    /// Delete the remote object.
    #[default]
    Delete,
    /// Leave the remote object in place.
    Orphan,
}

/// Observed state and reconciliation status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus<O> {
    /// Last observed remote state.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,
    /// Reconciliation phase.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionStatus>,
    /// Whether the last pass completed without error.
    #[serde(default)]
    pub synced: bool,
    /// Message from the last failed pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the last pass finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<DateTime<Utc>>,
    /// Recent events, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Event>,
}

/// Reconciliation phase reported on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// The remote object is being created.
    Creating,
    /// The remote object exists.
    Available,
    /// The remote object is being deleted.
    Deleting,
    /// The remote object is not usable.
    Unavailable,
}

/// A recorded reconciliation event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Event severity.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable message.
    pub message: String,
    /// Host that recorded the event.
    pub reporting_instance: String,
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Informational.
    Normal,
    /// Something went wrong.
    Warning,
}

impl<O> Default for ResourceStatus<O> {
    fn default() -> Self {
        Self {
            at_provider: None,
            condition: None,
            synced: false,
            message: None,
            last_reconciled: None,
            events: Vec::new(),
        }
    }
}

impl<D, O> ManagedResource<D, O> {
    /// Creates a new resource with the given desired state.
    #[must_use]
    pub fn new(name: impl Into<String>, for_provider: D) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                annotations: BTreeMap::new(),
                deletion_requested: false,
            },
            spec: ResourceSpec {
                for_provider,
                deletion_policy: DeletionPolicy::default(),
            },
            status: ResourceStatus::default(),
        }
    }

    /// Returns the resource name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Returns the external name, if the remote object was created.
    #[must_use]
    pub fn external_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_EXTERNAL_NAME)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Records the external name.
    pub fn set_external_name(&mut self, name: impl Into<String>) {
        self.metadata
            .annotations
            .insert(ANNOTATION_EXTERNAL_NAME.to_string(), name.into());
    }

    /// Returns the last observed concurrency token.
    #[must_use]
    pub fn concurrency_token(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_CONCURRENCY_TOKEN)
            .map(String::as_str)
    }

    /// Records or clears the concurrency token.
    pub fn set_concurrency_token(&mut self, token: Option<&str>) {
        match token {
            Some(token) => {
                self.metadata
                    .annotations
                    .insert(ANNOTATION_CONCURRENCY_TOKEN.to_string(), token.to_string());
            }
            None => {
                self.metadata.annotations.remove(ANNOTATION_CONCURRENCY_TOKEN);
            }
        }
    }

    /// Sets the reconciliation phase.
    pub fn set_condition(&mut self, condition: ConditionStatus) {
        self.status.condition = Some(condition);
    }

    /// Appends an event, dropping the oldest beyond [`MAX_EVENTS`].
    pub fn record_event(&mut self, event: Event) {
        if self.status.events.len() >= MAX_EVENTS {
            let excess = self.status.events.len() + 1 - MAX_EVENTS;
            self.status.events.drain(..excess);
        }
        self.status.events.push(event);
    }
}

impl Event {
    /// Creates a normal event.
    #[must_use]
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventType::Normal, reason.into(), message.into())
    }

    /// Creates a warning event.
    #[must_use]
    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventType::Warning, reason.into(), message.into())
    }

    fn new(event_type: EventType, reason: String, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            reason,
            message,
            reporting_instance: reporting_instance(),
        }
    }
}

/// Name of the host recording events.
fn reporting_instance() -> String {
    hostname::get().map_or_else(
        |_| String::from("unknown"),
        |h| h.to_string_lossy().to_string(),
    )
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let condition = match self {
            Self::Creating => "Creating",
            Self::Available => "Available",
            Self::Deleting => "Deleting",
            Self::Unavailable => "Unavailable",
        };
        write!(f, "{condition}")
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let event_type = match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        };
        write!(f, "{event_type}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResource = ManagedResource<String, String>;

    #[test]
    fn test_external_name_round_trip() {
        let mut mr = TestResource::new("editor", String::from("spec"));
        assert_eq!(mr.external_name(), None);

        mr.set_external_name("r1");
        assert_eq!(mr.external_name(), Some("r1"));
    }

    #[test]
    fn test_empty_external_name_is_absent() {
        let mut mr = TestResource::new("editor", String::from("spec"));
        mr.set_external_name("");
        assert_eq!(mr.external_name(), None);
    }

    #[test]
    fn test_concurrency_token_cleared() {
        let mut mr = TestResource::new("editor", String::from("spec"));
        mr.set_concurrency_token(Some("etag-1"));
        assert_eq!(mr.concurrency_token(), Some("etag-1"));

        mr.set_concurrency_token(None);
        assert_eq!(mr.concurrency_token(), None);
    }

    #[test]
    fn test_events_are_capped() {
        let mut mr = TestResource::new("editor", String::from("spec"));
        for i in 0..(MAX_EVENTS + 5) {
            mr.record_event(Event::normal("Test", format!("event {i}")));
        }

        assert_eq!(mr.status.events.len(), MAX_EVENTS);
        assert_eq!(mr.status.events[0].message, "event 5");
        assert_eq!(
            mr.status.events[MAX_EVENTS - 1].message,
            format!("event {}", MAX_EVENTS + 4)
        );
    }

    #[test]
    fn test_status_defaults_when_missing() {
        let json = r#"{"metadata":{"name":"editor"},"spec":{"forProvider":"x"}}"#;
        let mr: TestResource = serde_json::from_str(json).expect("parse resource");
        assert_eq!(mr.status, ResourceStatus::default());
        assert_eq!(mr.spec.deletion_policy, DeletionPolicy::Delete);
    }
}
