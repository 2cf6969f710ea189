//! # Sync Services
//!
//! Listeners that keep shared editor state consistent across peers.
//!
//! - **Graph sync**: Graph list, update and delete replication
//! - **Schema sync**: Type library push from server to clients

pub mod graph_sync;
pub mod schema_sync;

pub use graph_sync::GraphSyncListener;
pub use schema_sync::{MemoryTypeLibrary, SchemaSyncListener, TypeLibrary};
