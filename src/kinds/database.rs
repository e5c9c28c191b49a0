//! Managed database instance.
//!
//! Databases are name-addressed. The remote API reports storage in MiB and
//! creation time in Unix seconds; desired state uses GiB.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ProviderError, Result};
use crate::resource::{from_unix_seconds, late_init, ResourceKind};

use super::Reference;

/// MiB per GiB.
const MIB_PER_GIB: u64 = 1024;

/// Remote state of a database that accepts connections.
const STATE_AVAILABLE: &str = "available";

/// Managed database kind.
#[derive(Debug, Clone, Copy)]
pub struct Database;

/// Desired state of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseParameters {
    /// Instance name, also its external name.
    pub name: String,
    /// Database engine (e.g. `postgres`).
    pub engine: String,
    /// Region the instance runs in.
    pub region: String,
    /// Engine version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Allocated storage in GiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_gb: Option<u32>,
    /// Days automated backups are kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_retention_days: Option<u32>,
    /// Whether the instance refuses deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<bool>,
    /// User labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Private network the instance is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
    /// Reference used to resolve `network_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id_ref: Option<Reference>,
}

/// Observed state of a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseObservation {
    /// Instance name.
    pub name: String,
    /// Database engine.
    pub engine: String,
    /// Region the instance runs in.
    pub region: String,
    /// Engine version.
    pub engine_version: String,
    /// Allocated storage in GiB.
    pub storage_gb: u32,
    /// Days automated backups are kept.
    pub backup_retention_days: u32,
    /// Whether the instance refuses deletion.
    pub deletion_protection: bool,
    /// User labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Private network the instance is attached to.
    #[serde(default)]
    pub network_id: Option<String>,
    /// Connection endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Remote lifecycle state.
    pub state: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Database as returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDatabase {
    /// Instance name.
    pub name: String,
    /// Database engine.
    pub engine: String,
    /// Region the instance runs in.
    pub region: String,
    /// Engine version.
    pub engine_version: String,
    /// Allocated storage in MiB.
    pub storage_mb: u64,
    /// Days automated backups are kept.
    #[serde(default)]
    pub backup_retention_days: u32,
    /// Whether the instance refuses deletion.
    #[serde(default)]
    pub deletion_protection: bool,
    /// User labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Private network the instance is attached to.
    #[serde(default)]
    pub network_id: Option<String>,
    /// Connection endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Remote lifecycle state.
    pub state: String,
    /// Creation time, Unix seconds.
    pub created_unix: i64,
}

/// Wire body for creating a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDatabaseRequest {
    /// Instance name.
    pub name: String,
    /// Database engine.
    pub engine: String,
    /// Region the instance runs in.
    pub region: String,
    /// Mutable fields.
    #[serde(flatten)]
    pub body: DatabaseBody,
}

/// Wire body for replacing a database's mutable fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBody {
    /// Engine version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    /// Allocated storage in MiB.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_mb: Option<u64>,
    /// Days automated backups are kept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_retention_days: Option<u32>,
    /// Whether the instance refuses deletion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_protection: Option<bool>,
    /// User labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Private network the instance is attached to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<String>,
}

impl Database {
    fn body(desired: &DatabaseParameters) -> DatabaseBody {
        DatabaseBody {
            engine_version: desired.engine_version.clone(),
            storage_mb: desired
                .storage_gb
                .map(|gb| u64::from(gb).saturating_mul(MIB_PER_GIB)),
            backup_retention_days: desired.backup_retention_days,
            deletion_protection: desired.deletion_protection,
            labels: desired.labels.clone(),
            network_id: desired.network_id.clone(),
        }
    }

    fn storage_gb(remote: &RemoteDatabase) -> Result<u32> {
        u32::try_from(remote.storage_mb / MIB_PER_GIB).map_err(|_| {
            ProviderError::mapping(
                Self::KIND,
                format!("storage of {} MiB does not fit in GiB field", remote.storage_mb),
            )
        })
    }
}

impl ResourceKind for Database {
    const KIND: &'static str = "Database";
    const API_PATH: &'static str = "databases";

    type Desired = DatabaseParameters;
    type Observed = DatabaseObservation;
    type Remote = RemoteDatabase;
    type CreateRequest = CreateDatabaseRequest;
    type UpdateBody = DatabaseBody;

    fn to_create_request(desired: &DatabaseParameters) -> CreateDatabaseRequest {
        CreateDatabaseRequest {
            name: desired.name.clone(),
            engine: desired.engine.clone(),
            region: desired.region.clone(),
            body: Self::body(desired),
        }
    }

    fn to_update_body(desired: &DatabaseParameters) -> DatabaseBody {
        Self::body(desired)
    }

    fn to_observed(remote: &RemoteDatabase) -> Result<DatabaseObservation> {
        Ok(DatabaseObservation {
            name: remote.name.clone(),
            engine: remote.engine.clone(),
            region: remote.region.clone(),
            engine_version: remote.engine_version.clone(),
            storage_gb: Self::storage_gb(remote)?,
            backup_retention_days: remote.backup_retention_days,
            deletion_protection: remote.deletion_protection,
            labels: remote.labels.clone(),
            network_id: remote.network_id.clone(),
            endpoint: remote.endpoint.clone(),
            state: remote.state.clone(),
            created_at: from_unix_seconds(Self::KIND, remote.created_unix)?,
        })
    }

    fn to_desired_shape(remote: &RemoteDatabase) -> Result<DatabaseParameters> {
        Ok(DatabaseParameters {
            name: remote.name.clone(),
            engine: remote.engine.clone(),
            region: remote.region.clone(),
            engine_version: Some(remote.engine_version.clone()),
            storage_gb: Some(Self::storage_gb(remote)?),
            backup_retention_days: Some(remote.backup_retention_days),
            deletion_protection: Some(remote.deletion_protection),
            labels: Some(remote.labels.clone()),
            network_id: remote.network_id.clone(),
            network_id_ref: None,
        })
    }

    fn late_initialize(desired: &mut DatabaseParameters, remote: &RemoteDatabase) -> bool {
        let mut changed = late_init(&mut desired.engine_version, Some(&remote.engine_version));
        if let Ok(storage_gb) = Self::storage_gb(remote) {
            changed |= late_init(&mut desired.storage_gb, Some(&storage_gb));
        }
        changed |= late_init(
            &mut desired.backup_retention_days,
            Some(&remote.backup_retention_days),
        );
        changed |= late_init(
            &mut desired.deletion_protection,
            Some(&remote.deletion_protection),
        );
        if desired.labels.is_none() && !remote.labels.is_empty() {
            desired.labels = Some(remote.labels.clone());
            changed = true;
        }
        changed |= late_init(&mut desired.network_id, remote.network_id.as_ref());
        changed
    }

    fn comparable(desired: &DatabaseParameters) -> DatabaseParameters {
        DatabaseParameters {
            labels: desired.labels.clone().filter(|labels| !labels.is_empty()),
            network_id_ref: None,
            ..desired.clone()
        }
    }

    fn external_name_of(remote: &RemoteDatabase) -> String {
        remote.name.clone()
    }

    fn deterministic_name(desired: &DatabaseParameters) -> Option<String> {
        Some(desired.name.clone())
    }

    fn is_available(remote: &RemoteDatabase) -> bool {
        remote.state == STATE_AVAILABLE
    }
}
