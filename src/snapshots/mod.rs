//! Snapshots module split into submodules:
//! - handle.rs: SnapshotHandle (owns one engine view, releases it on Drop; shared via Arc).
//! - registry.rs: SnapshotRegistry (timestamp -> handle map, committed marker, lazy cleanup).
//! - manager.rs: SnapshotManager (facade over registry + commit sequencer).
//!
//! External API surface:
//! - SnapshotManager, ManagerStatus
//! - SnapshotRegistry
//! - SnapshotHandle, SharedSnapshot

mod handle;
mod manager;
mod registry;

pub use handle::{SharedSnapshot, SnapshotHandle};
pub use manager::{ManagerStatus, SnapshotManager};
pub use registry::SnapshotRegistry;
