//! Managed resource kinds.
//!
//! Each kind implements [`ResourceKind`](crate::resource::ResourceKind) for one
//! remote collection. The reference and selector types below record how a
//! value was resolved; drift detection never compares them.

mod database;
mod policy;
mod role;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::ResourceKind;

pub use database::{
    CreateDatabaseRequest, Database, DatabaseBody, DatabaseObservation, DatabaseParameters,
    RemoteDatabase,
};
pub use policy::{
    CreatePolicyRequest, Effect, Policy, PolicyBody, PolicyObservation, PolicyParameters,
    RemotePolicy, RemoteStatement, Statement,
};
pub use role::{RemoteRole, Role, RoleBody, RoleObservation, RoleParameters};

/// Names of the supported kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum KindName {
    /// [`Role`]
    Role,
    /// [`Policy`]
    Policy,
    /// [`Database`]
    Database,
}

impl KindName {
    /// All supported kinds.
    pub const ALL: [Self; 3] = [Self::Role, Self::Policy, Self::Database];

    /// Returns the kind name as written in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Role => Role::KIND,
            Self::Policy => Policy::KIND,
            Self::Database => Database::KIND,
        }
    }
}

impl std::fmt::Display for KindName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to another declarative resource by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Name of the referenced resource.
    pub name: String,
}

/// Selects a declarative resource by labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    /// Labels the referenced resource must carry.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}
