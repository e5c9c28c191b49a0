//! IAM policy.
//!
//! Policies are name-addressed: the external name is the policy name from the
//! desired state, known before the remote object exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::resource::{
    late_init, late_init_list, late_init_positional, normalize_list, parse_timestamp,
    ResourceKind,
};

use super::{Reference, Selector};

/// IAM policy kind.
#[derive(Debug, Clone, Copy)]
pub struct Policy;

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grant the listed actions.
    Allow,
    /// Refuse the listed actions.
    Deny,
}

/// Desired state of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyParameters {
    /// Policy name, also its external name.
    pub name: String,
    /// Policy description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Policy statements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<Statement>>,
    /// Roles the policy is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ids: Option<Vec<String>>,
    /// References used to resolve `role_ids`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id_refs: Option<Vec<Reference>>,
    /// Selector used to resolve `role_ids`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id_selector: Option<Selector>,
}

/// A single policy statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statement {
    /// Statement effect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<Effect>,
    /// Actions covered by the statement.
    pub actions: Vec<String>,
    /// Resources covered by the statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<String>>,
    /// Condition key/value pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<BTreeMap<String, String>>,
}

/// Observed state of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyObservation {
    /// Policy name.
    pub name: String,
    /// Policy description.
    #[serde(default)]
    pub description: Option<String>,
    /// Policy statements.
    #[serde(default)]
    pub statements: Vec<Statement>,
    /// Roles the policy is attached to.
    #[serde(default)]
    pub role_ids: Vec<String>,
    /// Remote revision counter.
    pub version: u64,
    /// Last modification time.
    pub updated: DateTime<Utc>,
}

/// Policy as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePolicy {
    /// Policy name.
    pub name: String,
    /// Policy description.
    #[serde(default)]
    pub description: Option<String>,
    /// Policy statements.
    #[serde(default)]
    pub statements: Vec<RemoteStatement>,
    /// Roles the policy is attached to.
    #[serde(default)]
    pub role_ids: Vec<String>,
    /// Remote revision counter.
    #[serde(default)]
    pub version: u64,
    /// Last modification time, `YYYY-MM-DD HH:MM:SS` UTC.
    pub updated: String,
}

/// Statement as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStatement {
    /// Statement effect.
    pub effect: Effect,
    /// Actions covered by the statement.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Resources covered by the statement.
    #[serde(default)]
    pub resources: Vec<String>,
    /// Condition key/value pairs.
    #[serde(default)]
    pub conditions: BTreeMap<String, String>,
}

/// Wire body for creating a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePolicyRequest {
    /// Policy name.
    pub name: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub body: PolicyBody,
}

/// Wire body for replacing a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyBody {
    /// Policy description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Policy statements.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statements: Option<Vec<Statement>>,
    /// Roles the policy is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_ids: Option<Vec<String>>,
}

impl From<&RemoteStatement> for Statement {
    fn from(remote: &RemoteStatement) -> Self {
        Self {
            effect: Some(remote.effect),
            actions: remote.actions.clone(),
            resources: Some(remote.resources.clone()),
            conditions: Some(remote.conditions.clone()),
        }
    }
}

impl Statement {
    fn late_initialize(&mut self, remote: &RemoteStatement) -> bool {
        let mut changed = late_init(&mut self.effect, Some(&remote.effect));
        changed |= late_init_list(&mut self.resources, &remote.resources);
        if self.conditions.is_none() && !remote.conditions.is_empty() {
            self.conditions = Some(remote.conditions.clone());
            changed = true;
        }
        changed
    }

    fn comparable(&self) -> Self {
        Self {
            effect: self.effect,
            actions: self.actions.clone(),
            resources: normalize_list(self.resources.clone()),
            conditions: self.conditions.clone().filter(|c| !c.is_empty()),
        }
    }
}

impl Policy {
    fn body(desired: &PolicyParameters) -> PolicyBody {
        PolicyBody {
            description: desired.description.clone(),
            statements: desired.statements.clone(),
            role_ids: desired.role_ids.clone(),
        }
    }
}

impl ResourceKind for Policy {
    const KIND: &'static str = "Policy";
    const API_PATH: &'static str = "policies";

    type Desired = PolicyParameters;
    type Observed = PolicyObservation;
    type Remote = RemotePolicy;
    type CreateRequest = CreatePolicyRequest;
    type UpdateBody = PolicyBody;

    fn to_create_request(desired: &PolicyParameters) -> CreatePolicyRequest {
        CreatePolicyRequest {
            name: desired.name.clone(),
            body: Self::body(desired),
        }
    }

    fn to_update_body(desired: &PolicyParameters) -> PolicyBody {
        Self::body(desired)
    }

    fn to_observed(remote: &RemotePolicy) -> Result<PolicyObservation> {
        Ok(PolicyObservation {
            name: remote.name.clone(),
            description: remote.description.clone(),
            statements: remote.statements.iter().map(Statement::from).collect(),
            role_ids: remote.role_ids.clone(),
            version: remote.version,
            updated: parse_timestamp(Self::KIND, &remote.updated)?,
        })
    }

    fn to_desired_shape(remote: &RemotePolicy) -> Result<PolicyParameters> {
        Ok(PolicyParameters {
            name: remote.name.clone(),
            description: remote.description.clone(),
            statements: Some(remote.statements.iter().map(Statement::from).collect()),
            role_ids: Some(remote.role_ids.clone()),
            role_id_refs: None,
            role_id_selector: None,
        })
    }

    fn late_initialize(desired: &mut PolicyParameters, remote: &RemotePolicy) -> bool {
        let mut changed = late_init(&mut desired.description, remote.description.as_ref());
        changed |= late_init_list(&mut desired.role_ids, &remote.role_ids);
        changed |= late_init_positional(
            &mut desired.statements,
            &remote.statements,
            |remote| Statement::from(remote),
            Statement::late_initialize,
        );
        changed
    }

    fn comparable(desired: &PolicyParameters) -> PolicyParameters {
        let statements = desired
            .statements
            .as_ref()
            .map(|statements| statements.iter().map(Statement::comparable).collect());

        PolicyParameters {
            name: desired.name.clone(),
            description: desired.description.clone(),
            statements: normalize_list(statements),
            role_ids: normalize_list(desired.role_ids.clone()),
            role_id_refs: None,
            role_id_selector: None,
        }
    }

    fn external_name_of(remote: &RemotePolicy) -> String {
        remote.name.clone()
    }

    fn deterministic_name(desired: &PolicyParameters) -> Option<String> {
        Some(desired.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_only() -> PolicyParameters {
        PolicyParameters {
            name: "read-only".to_string(),
            description: None,
            statements: Some(vec![Statement {
                effect: None,
                actions: vec!["db.read".to_string()],
                resources: None,
                conditions: None,
            }]),
            role_ids: None,
            role_id_refs: Some(vec![Reference {
                name: "viewer".to_string(),
            }]),
            role_id_selector: None,
        }
    }

    fn remote_read_only() -> RemotePolicy {
        RemotePolicy {
            name: "read-only".to_string(),
            description: Some("read access".to_string()),
            statements: vec![RemoteStatement {
                effect: Effect::Allow,
                actions: vec!["db.read".to_string()],
                resources: vec!["*".to_string()],
                conditions: BTreeMap::new(),
            }],
            role_ids: vec!["r1".to_string()],
            version: 3,
            updated: "2024-05-01 10:00:00".to_string(),
        }
    }

    #[test]
    fn test_deterministic_name() {
        assert_eq!(
            Policy::deterministic_name(&read_only()).as_deref(),
            Some("read-only")
        );
    }

    #[test]
    fn test_create_request_flattens_body() {
        let json = serde_json::to_value(Policy::to_create_request(&read_only())).expect("serialize");
        assert_eq!(json["name"], "read-only");
        assert_eq!(json["statements"][0]["actions"][0], "db.read");
        assert!(json.get("roleIds").is_none());
    }

    #[test]
    fn test_late_init_recurses_into_statements() {
        let mut desired = read_only();
        assert!(Policy::late_initialize(&mut desired, &remote_read_only()));

        let statement = &desired.statements.as_ref().expect("statements")[0];
        assert_eq!(statement.effect, Some(Effect::Allow));
        assert_eq!(statement.resources, Some(vec!["*".to_string()]));
        // Empty remote conditions stay unset
        assert_eq!(statement.conditions, None);
        assert_eq!(desired.role_ids, Some(vec!["r1".to_string()]));
        assert_eq!(desired.description.as_deref(), Some("read access"));
    }

    #[test]
    fn test_late_init_skips_statements_on_length_mismatch() {
        let mut desired = read_only();
        let mut remote = remote_read_only();
        remote.statements.push(RemoteStatement {
            effect: Effect::Deny,
            actions: vec!["db.drop".to_string()],
            resources: vec![],
            conditions: BTreeMap::new(),
        });

        Policy::late_initialize(&mut desired, &remote);
        assert_eq!(desired.statements, read_only().statements);
    }

    #[test]
    fn test_comparable_ignores_references_and_empties() {
        let mut desired = read_only();
        desired.role_ids = Some(vec![]);

        let comparable = Policy::comparable(&desired);
        assert_eq!(comparable.role_id_refs, None);
        assert_eq!(comparable.role_ids, None);
    }

    #[test]
    fn test_to_observed() {
        let observed = Policy::to_observed(&remote_read_only()).expect("map policy");
        assert_eq!(observed.version, 3);
        assert_eq!(observed.updated.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(observed.statements[0].effect, Some(Effect::Allow));
    }
}
