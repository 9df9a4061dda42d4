//! engine: граница со storage-движком (point-in-time views).
//!
//! Разделение по подмодулям:
//! - mod.rs: трейт SnapshotEngine и непрозрачный ViewId
//! - mem.rs: MemEngine: in-memory многоверсионный KV, реализующий SnapshotEngine
//!
//! The snapshot layer consumes a view only through this trait: capture, release
//! (exactly once per captured view) and read-through.

use anyhow::Result;
use std::fmt;

pub mod mem;

pub use mem::MemEngine;

/// Opaque native view handle issued by an engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Point-in-time view primitive of a storage engine.
///
/// Every view returned by `capture_view` must be passed to `release_view`
/// exactly once. Implementations may treat a second release as a bug and panic.
pub trait SnapshotEngine: Send + Sync {
    /// Pin the current state of the engine and return a handle to it.
    fn capture_view(&self) -> ViewId;

    /// Unpin a view previously returned by `capture_view`.
    fn release_view(&self, view: ViewId);

    /// Read `key` as of `view`.
    fn read_at(&self, view: ViewId, key: &[u8]) -> Result<Option<Vec<u8>>>;
}
