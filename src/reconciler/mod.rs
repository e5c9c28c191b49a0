//! Reconciliation core.
//!
//! This module compares desired state with the remote object and converges
//! one toward the other:
//!
//! - [`drift`]: up-to-date check and drifted field report
//! - [`ExternalClient`]: observe, create, update and delete for one resource
//! - [`Reconciler`]: one full pass, including status and event recording

pub mod drift;
mod controller;
mod external;

pub use controller::{ReconcileOutcome, Reconciler};
pub use drift::{drifted_fields, is_up_to_date};
pub use external::{ExternalClient, Observation};
