//! IAM role.
//!
//! Roles are addressed by an identifier the remote API assigns on creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resource::{late_init, late_init_list, normalize_list, parse_timestamp, ResourceKind};

use super::{Reference, Selector};

/// IAM role kind.
#[derive(Debug, Clone, Copy)]
pub struct Role;

/// Desired state of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleParameters {
    /// Human-readable role name.
    pub display_name: String,
    /// Role description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permissions granted by the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    /// Project the role belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Reference used to resolve `project_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id_ref: Option<Reference>,
    /// Selector used to resolve `project_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id_selector: Option<Selector>,
}

/// Observed state of a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleObservation {
    /// Remote identifier.
    pub id: String,
    /// Human-readable role name.
    pub display_name: String,
    /// Role description.
    #[serde(default)]
    pub description: Option<String>,
    /// Permissions granted by the role.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Project the role belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Creation time.
    pub create_time: DateTime<Utc>,
    /// Last modification time.
    #[serde(default)]
    pub update_time: Option<DateTime<Utc>>,
}

/// Role as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRole {
    /// Remote identifier.
    pub id: String,
    /// Human-readable role name.
    pub display_name: String,
    /// Role description.
    #[serde(default)]
    pub description: Option<String>,
    /// Permissions granted by the role.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Project the role belongs to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Creation time, RFC 3339.
    pub create_time: String,
    /// Last modification time, RFC 3339.
    #[serde(default)]
    pub update_time: Option<String>,
}

/// Wire body for creating or replacing a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBody {
    /// Human-readable role name.
    pub display_name: String,
    /// Role description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permissions granted by the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    /// Project the role belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Role {
    fn body(desired: &RoleParameters) -> RoleBody {
        RoleBody {
            display_name: desired.display_name.clone(),
            description: desired.description.clone(),
            actions: desired.actions.clone(),
            project_id: desired.project_id.clone(),
        }
    }
}

impl ResourceKind for Role {
    const KIND: &'static str = "Role";
    const API_PATH: &'static str = "roles";

    type Desired = RoleParameters;
    type Observed = RoleObservation;
    type Remote = RemoteRole;
    type CreateRequest = RoleBody;
    type UpdateBody = RoleBody;

    fn to_create_request(desired: &RoleParameters) -> RoleBody {
        Self::body(desired)
    }

    fn to_update_body(desired: &RoleParameters) -> RoleBody {
        Self::body(desired)
    }

    fn to_observed(remote: &RemoteRole) -> Result<RoleObservation> {
        let update_time = remote
            .update_time
            .as_deref()
            .map(|ts| parse_timestamp(Self::KIND, ts))
            .transpose()?;

        Ok(RoleObservation {
            id: remote.id.clone(),
            display_name: remote.display_name.clone(),
            description: remote.description.clone(),
            actions: remote.actions.clone(),
            project_id: remote.project_id.clone(),
            create_time: parse_timestamp(Self::KIND, &remote.create_time)?,
            update_time,
        })
    }

    fn to_desired_shape(remote: &RemoteRole) -> Result<RoleParameters> {
        Ok(RoleParameters {
            display_name: remote.display_name.clone(),
            description: remote.description.clone(),
            actions: Some(remote.actions.clone()),
            project_id: remote.project_id.clone(),
            project_id_ref: None,
            project_id_selector: None,
        })
    }

    fn late_initialize(desired: &mut RoleParameters, remote: &RemoteRole) -> bool {
        let mut changed = late_init(&mut desired.description, remote.description.as_ref());
        changed |= late_init_list(&mut desired.actions, &remote.actions);
        changed |= late_init(&mut desired.project_id, remote.project_id.as_ref());
        changed
    }

    fn comparable(desired: &RoleParameters) -> RoleParameters {
        RoleParameters {
            actions: normalize_list(desired.actions.clone()),
            project_id_ref: None,
            project_id_selector: None,
            ..desired.clone()
        }
    }

    fn external_name_of(remote: &RemoteRole) -> String {
        remote.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn editor() -> RoleParameters {
        RoleParameters {
            display_name: "Editor".to_string(),
            description: None,
            actions: Some(vec!["a.create".to_string(), "a.update".to_string()]),
            project_id: None,
            project_id_ref: None,
            project_id_selector: None,
        }
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

    #[test]
    fn test_create_request_omits_unset_fields() {
        let request = Role::to_create_request(&editor());
        let json = serde_json::to_value(&request).expect("serialize");

        assert_eq!(json["displayName"], "Editor");
        assert!(json.get("description").is_none());
        assert!(json.get("projectId").is_none());
    }

    #[test]
    fn test_update_request_carries_identity() {
        let request = Role::to_update_request("r1", Some("etag-1"), &editor());
        assert_eq!(request.id, "r1");
        assert_eq!(request.concurrency_token.as_deref(), Some("etag-1"));
        assert_eq!(request.body.display_name, "Editor");
    }

    #[test]
    fn test_late_init_fills_description() {
        let mut desired = editor();
        assert!(Role::late_initialize(&mut desired, &remote_editor()));
        assert_eq!(desired.description.as_deref(), Some("editor role"));

        // Idempotent
        assert!(!Role::late_initialize(&mut desired, &remote_editor()));
    }

    #[test]
    fn test_late_init_keeps_user_actions() {
        let mut desired = editor();
        desired.actions = Some(vec!["a.create".to_string()]);
        Role::late_initialize(&mut desired, &remote_editor());
        assert_eq!(desired.actions, Some(vec!["a.create".to_string()]));
    }

    #[test]
    fn test_comparable_ignores_references() {
        let mut desired = editor();
        desired.project_id_ref = Some(Reference {
            name: "main".to_string(),
        });
        desired.project_id_selector = Some(Selector::default());

        assert_eq!(Role::comparable(&desired), Role::comparable(&editor()));
    }

    #[test]
    fn test_comparable_treats_empty_actions_as_unset() {
        let mut with_empty = editor();
        with_empty.actions = Some(vec![]);
        let mut without = editor();
        without.actions = None;

        assert_eq!(Role::comparable(&with_empty), Role::comparable(&without));
    }

    #[test]
    fn test_to_observed_parses_timestamps() {
        let mut remote = remote_editor();
        remote.update_time = Some("2024-05-02T10:00:00Z".to_string());

        let observed = Role::to_observed(&remote).expect("map role");
        assert_eq!(observed.id, "r1");
        assert_eq!(observed.create_time.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert!(observed.update_time.is_some());
    }

    #[test]
    fn test_to_observed_rejects_bad_timestamp() {
        let mut remote = remote_editor();
        remote.create_time = "not a time".to_string();
        assert!(Role::to_observed(&remote).is_err());
    }
}
