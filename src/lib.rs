// ============================================================================
// Linting - unsafe code is forbidden in Cargo.toml
// ============================================================================

#![deny(missing_docs)]                // All public items must be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # xprovider
//!
//! Reconciles declarative managed resources against a remote cloud API.
//!
//! ## Overview
//!
//! Each managed resource carries the user's desired parameters. A reconciliation
//! pass observes the remote object, late-initializes fields the user left unset
//! from what the remote reports, and then creates, updates or deletes the remote
//! object until it matches:
//!
//! 1. **Observe**: fetch the remote object by its external name and decide
//!    whether it exists and is up to date
//! 2. **Create**: create it and record the identifier the API returns
//! 3. **Update**: send the desired state with the concurrency token from the
//!    last observation
//! 4. **Delete**: remove it, treating "already gone" as success
//!
//! Failures are classified as not found, conflict, transient or fatal so the
//! caller can decide whether to requeue. Nothing is retried inside a pass.
//!
//! ## Modules
//!
//! - [`resource`]: Managed resource model and the per-kind mapping contract
//! - [`kinds`]: Supported kinds (`Role`, `Policy`, `Database`)
//! - [`reconciler`]: Drift detection and the reconciliation state machine
//! - [`remote`]: Remote API clients, connectors and credential secrets
//! - [`store`]: Resource stores (local files, memory)
//! - [`config`]: Provider configuration and manifests
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! kind: Role
//! metadata:
//!   name: editor
//! spec:
//!   forProvider:
//!     displayName: Editor
//!     actions: [a.create, a.update]
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod kinds;
pub mod reconciler;
pub mod remote;
pub mod resource;
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, Manifest, ProviderConfig};
pub use error::{ErrorKind, ProviderError, RemoteError, Result};
pub use reconciler::{ExternalClient, Observation, ReconcileOutcome, Reconciler};
pub use remote::{Connector, HttpConnector, HttpRemoteClient, RemoteClient};
pub use resource::{ManagedResource, ResourceKind};
pub use store::{LocalResourceStore, MemoryResourceStore, ResourceStore};
