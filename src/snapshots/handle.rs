use anyhow::Result;
use std::fmt;
use std::sync::Arc;

use crate::engine::{SnapshotEngine, ViewId};
use crate::timestamp::Timestamp;

/// Snapshot handle: one engine view "as of timestamp".
///
/// Owns exactly one native view and releases it in Drop. The handle is not
/// Clone; sharing goes through `Arc<SnapshotHandle>` (see [`SharedSnapshot`]),
/// so the view is released once, by whichever holder drops last.
pub struct SnapshotHandle {
    name: Timestamp,
    view: ViewId,
    engine: Arc<dyn SnapshotEngine>,
}

/// Handle as stored in the registry and handed to readers.
pub type SharedSnapshot = Arc<SnapshotHandle>;

impl SnapshotHandle {
    /// Capture a fresh view from the engine.
    pub fn capture(engine: &Arc<dyn SnapshotEngine>, name: Timestamp) -> Self {
        let view = engine.capture_view();
        Self {
            name,
            view,
            engine: Arc::clone(engine),
        }
    }

    /// Take ownership of a view captured by the caller (e.g. at checkpoint time).
    pub fn adopt(engine: &Arc<dyn SnapshotEngine>, view: ViewId, name: Timestamp) -> Self {
        Self {
            name,
            view,
            engine: Arc::clone(engine),
        }
    }

    /// Timestamp the snapshot was taken at.
    pub fn name(&self) -> Timestamp {
        self.name
    }

    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Read a key through this view.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.engine.read_at(self.view, key)
    }
}

impl Drop for SnapshotHandle {
    fn drop(&mut self) {
        self.engine.release_view(self.view);
    }
}

impl fmt::Debug for SnapshotHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotHandle")
            .field("name", &self.name)
            .field("view", &self.view)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemEngine;

    #[test]
    fn shared_handle_releases_once_after_last_owner() -> Result<()> {
        let mem = Arc::new(MemEngine::new());
        let engine: Arc<dyn SnapshotEngine> = mem.clone();
        mem.put(b"k", b"v");

        let h: SharedSnapshot = Arc::new(SnapshotHandle::capture(&engine, Timestamp::from_u64(5)));
        let reader = Arc::clone(&h);
        assert_eq!(mem.live_views(), 1);

        drop(h);
        assert_eq!(mem.live_views(), 1, "reader still holds the view");
        assert_eq!(reader.get(b"k")?, Some(b"v".to_vec()));

        drop(reader);
        assert_eq!(mem.live_views(), 0);
        assert_eq!(mem.released_total(), 1);
        Ok(())
    }

    #[test]
    fn adopted_view_is_released_by_handle() {
        let mem = Arc::new(MemEngine::new());
        let engine: Arc<dyn SnapshotEngine> = mem.clone();
        let view = engine.capture_view();
        {
            let h = SnapshotHandle::adopt(&engine, view, Timestamp::from_u64(1));
            assert_eq!(h.view(), view);
            assert_eq!(h.name(), Timestamp::from_u64(1));
        }
        assert_eq!(mem.live_views(), 0);
    }
}
