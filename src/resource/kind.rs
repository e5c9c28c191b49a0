//! The per-kind mapping contract.
//!
//! Every managed resource kind implements [`ResourceKind`]. The trait holds the
//! field mapper (desired to request, remote to observed and back), the late
//! initializer and the comparison shape used by drift detection. The
//! reconciler is generic over it, so each kind gets its own instantiation and
//! there is no runtime kind check.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::error::Result;

use super::types::ManagedResource;

/// Managed resource type for a kind.
pub type ManagedOf<K> =
    ManagedResource<<K as ResourceKind>::Desired, <K as ResourceKind>::Observed>;

/// An update request: the desired body plus the identity and version it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRequest<B> {
    /// External name of the remote object.
    pub id: String,
    /// Concurrency token from the last observation.
    pub concurrency_token: Option<String>,
    /// Fields to write.
    pub body: B,
}

/// Mapping contract for one kind of managed resource.
pub trait ResourceKind: Send + Sync + 'static {
    /// Kind name used in logs, errors and manifests.
    const KIND: &'static str;

    /// Collection path on the remote API.
    const API_PATH: &'static str;

    /// User-declared parameters.
    type Desired: Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Snapshot of the remote object, including read-only attributes.
    type Observed: Debug + Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    /// Wire representation returned by the remote API.
    type Remote: Debug + Clone + Serialize + DeserializeOwned + Send + Sync;

    /// Wire body for creation.
    type CreateRequest: Debug + Serialize + Send + Sync;

    /// Wire body for replacement.
    type UpdateBody: Debug + Serialize + Send + Sync;

    /// Builds the creation body from desired state.
    fn to_create_request(desired: &Self::Desired) -> Self::CreateRequest;

    /// Builds the replacement body from desired state.
    fn to_update_body(desired: &Self::Desired) -> Self::UpdateBody;

    /// Converts the remote representation into the observed snapshot.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if a remote scalar cannot be decoded.
    fn to_observed(remote: &Self::Remote) -> Result<Self::Observed>;

    /// Re-derives desired state from the remote representation.
    ///
    /// # Errors
    ///
    /// Returns a mapping error if a remote scalar cannot be decoded.
    fn to_desired_shape(remote: &Self::Remote) -> Result<Self::Desired>;

    /// Fills unset optional fields of `desired` from `remote`.
    ///
    /// Returns whether anything changed.
    fn late_initialize(desired: &mut Self::Desired, remote: &Self::Remote) -> bool;

    /// Returns `desired` with everything drift detection must ignore removed.
    fn comparable(desired: &Self::Desired) -> Self::Desired;

    /// Identifier the remote system assigned to this object.
    fn external_name_of(remote: &Self::Remote) -> String;

    /// Identifier derived from desired state, for name-addressed kinds.
    fn deterministic_name(_desired: &Self::Desired) -> Option<String> {
        None
    }

    /// Whether the remote object is ready for use.
    fn is_available(_remote: &Self::Remote) -> bool {
        true
    }

    /// Builds an update request targeting a known remote object and version.
    fn to_update_request(
        id: &str,
        concurrency_token: Option<&str>,
        desired: &Self::Desired,
    ) -> UpdateRequest<Self::UpdateBody> {
        UpdateRequest {
            id: id.to_string(),
            concurrency_token: concurrency_token.map(ToString::to_string),
            body: Self::to_update_body(desired),
        }
    }
}
