//! Drift detection.
//!
//! The remote object is re-derived into desired shape and both sides are
//! reduced to their comparable form before comparing. What a kind leaves out
//! of [`ResourceKind::comparable`] (references, selectors) never counts as
//! drift, and an empty collection equals an absent one.

use serde_json::Value;

use crate::error::{ProviderError, Result};
use crate::resource::ResourceKind;

/// Returns whether `desired` matches the remote object.
///
/// # Errors
///
/// Returns a mapping error if the remote object cannot be re-derived.
pub fn is_up_to_date<K: ResourceKind>(desired: &K::Desired, remote: &K::Remote) -> Result<bool> {
    let actual = K::to_desired_shape(remote)?;
    Ok(K::comparable(desired) == K::comparable(&actual))
}

/// Returns the top-level fields of `desired` that differ from the remote object.
///
/// # Errors
///
/// Returns a mapping error if the remote object cannot be re-derived or
/// either side cannot be serialized.
pub fn drifted_fields<K: ResourceKind>(
    desired: &K::Desired,
    remote: &K::Remote,
) -> Result<Vec<String>> {
    let actual = K::to_desired_shape(remote)?;
    let desired = to_object::<K>(&K::comparable(desired))?;
    let actual = to_object::<K>(&K::comparable(&actual))?;

    let mut fields: Vec<String> = desired
        .keys()
        .chain(actual.keys())
        .filter(|key| desired.get(*key) != actual.get(*key))
        .cloned()
        .collect();
    fields.sort();
    fields.dedup();
    Ok(fields)
}

fn to_object<K: ResourceKind>(desired: &K::Desired) -> Result<serde_json::Map<String, Value>> {
    match serde_json::to_value(desired) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ProviderError::mapping(
            K::KIND,
            format!("desired state is not an object: {other}"),
        )),
        Err(e) => Err(ProviderError::mapping(K::KIND, e.to_string())),
    }
}
