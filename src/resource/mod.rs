//! Managed resource model.
//!
//! This module defines the declarative resource shape, the per-kind mapping
//! contract and the helpers kinds use to late-initialize and convert fields.

mod kind;
mod lateinit;
mod timestamp;
mod types;

pub use kind::{ManagedOf, ResourceKind, UpdateRequest};
pub use lateinit::{late_init, late_init_list, late_init_positional, normalize_list};
pub use timestamp::{from_unix_seconds, parse_timestamp};
pub use types::{
    ANNOTATION_CONCURRENCY_TOKEN, ANNOTATION_EXTERNAL_NAME, ConditionStatus, DeletionPolicy,
    Event, EventType, MAX_EVENTS, ManagedResource, ObjectMeta, ResourceSpec, ResourceStatus,
};
