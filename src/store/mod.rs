//! Declarative resource storage.
//!
//! The reconciler reads and writes declarative resources through the
//! [`ResourceStore`] trait. Two backends are provided: one JSON file per
//! resource on local disk, and an in-memory map for embedding and tests.

mod local;
mod memory;
mod resource_store;

pub use local::{LocalResourceStore, STORE_DIR};
pub use memory::MemoryResourceStore;
pub use resource_store::ResourceStore;
