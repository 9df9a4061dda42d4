//! Snapshot registry: timestamp -> shared view handle, plus the committed marker.
//!
//! Состояние под одним Mutex:
//! - snapshots: BTreeMap<Timestamp, SharedSnapshot>, ключи строго возрастают;
//! - committed: опциональный majority-видимый timestamp (не убывает);
//! - dirty: committed сдвинулся с момента последней очистки.
//!
//! Инварианты:
//! - если committed задан, запись с этим ключом есть в snapshots;
//! - cleanup никогда не удаляет committed и всё, что после него.
//!
//! Handles removed by cleanup/drop_all are dropped after the lock is released;
//! the engine view goes away only when the last reader drops its Arc too.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::engine::SnapshotEngine;
use crate::error::{SnapError, SnapResult};
use crate::metrics::{
    record_cleanup_run, record_committed_advance, record_majority_not_available,
    record_snapshot_captured, record_snapshot_insert_rejected, record_snapshot_inserted,
    record_snapshots_dropped,
};
use crate::timestamp::Timestamp;

use super::handle::{SharedSnapshot, SnapshotHandle};

#[derive(Default)]
struct RegistryState {
    snapshots: BTreeMap<Timestamp, SharedSnapshot>,
    committed: Option<Timestamp>,
    dirty: bool,
}

pub struct SnapshotRegistry {
    engine: Arc<dyn SnapshotEngine>,
    allow_overwrite: bool,
    state: Mutex<RegistryState>,
}

impl SnapshotRegistry {
    pub fn new(engine: Arc<dyn SnapshotEngine>, allow_overwrite: bool) -> Self {
        Self {
            engine,
            allow_overwrite,
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SnapshotEngine> {
        &self.engine
    }

    /// Advance the committed marker to `ts`.
    ///
    /// Equal timestamp: no-op. Smaller timestamp: panics (the caller broke
    /// timestamp monotonicity). Returns true when a new view was captured.
    pub fn set_committed(&self, ts: Timestamp) -> bool {
        let mut g = self.state.lock().unwrap();

        let advanced = match g.committed {
            None => true,
            Some(cur) => {
                assert!(
                    cur <= ts,
                    "committed snapshot regression: current {} but got {}",
                    cur,
                    ts
                );
                cur < ts
            }
        };
        if !advanced {
            return false;
        }

        g.dirty = true;
        g.committed = Some(ts);
        record_committed_advance();

        if g.snapshots.contains_key(&ts) {
            debug!("registry: committed -> {} (existing view)", ts);
            return false;
        }
        let handle = SnapshotHandle::capture(&self.engine, ts);
        debug!("registry: committed -> {} (captured {})", ts, handle.view());
        g.snapshots.insert(ts, Arc::new(handle));
        record_snapshot_captured();
        true
    }

    pub fn have_committed(&self) -> bool {
        self.state.lock().unwrap().committed.is_some()
    }

    /// Shared handle of the committed snapshot.
    pub fn committed(&self) -> SnapResult<SharedSnapshot> {
        let g = self.state.lock().unwrap();
        let ts = match g.committed {
            Some(ts) => ts,
            None => {
                record_majority_not_available();
                return Err(SnapError::ReadConcernMajorityNotAvailableYet);
            }
        };
        match g.snapshots.get(&ts) {
            Some(h) => Ok(Arc::clone(h)),
            None => panic!("committed snapshot {} has no registry entry", ts),
        }
    }

    /// Timestamp of the committed snapshot.
    pub fn committed_name(&self) -> SnapResult<Timestamp> {
        match self.state.lock().unwrap().committed {
            Some(ts) => Ok(ts),
            None => {
                record_majority_not_available();
                Err(SnapError::ReadConcernMajorityNotAvailableYet)
            }
        }
    }

    /// Register an externally captured view at `ts`.
    ///
    /// An existing entry is rejected with `SnapshotExists` unless the registry
    /// was built with `allow_overwrite`; the rejected handle is dropped here.
    pub fn insert(&self, ts: Timestamp, handle: SnapshotHandle) -> SnapResult<()> {
        let mut g = self.state.lock().unwrap();
        if g.snapshots.contains_key(&ts) && !self.allow_overwrite {
            drop(g);
            warn!(
                "registry: insert at {} rejected, snapshot already registered ({} dropped)",
                ts,
                handle.view()
            );
            record_snapshot_insert_rejected();
            return Err(SnapError::SnapshotExists { ts });
        }
        let prev = g.snapshots.insert(ts, Arc::new(handle));
        drop(g);

        record_snapshot_inserted();
        if let Some(prev) = prev {
            debug!("registry: replaced snapshot at {} (old {})", ts, prev.view());
            record_snapshots_dropped(1);
        } else {
            debug!("registry: inserted snapshot at {}", ts);
        }
        Ok(())
    }

    /// Remove every entry older than the committed one. No-op unless the
    /// committed marker advanced since the previous cleanup.
    pub fn cleanup(&self) -> usize {
        let removed = {
            let mut g = self.state.lock().unwrap();
            if !g.dirty {
                return 0;
            }
            let committed = match g.committed {
                Some(ts) => ts,
                None => return 0,
            };
            let keep = g.snapshots.split_off(&committed);
            g.dirty = false;
            std::mem::replace(&mut g.snapshots, keep)
        };

        let n = removed.len();
        record_cleanup_run();
        record_snapshots_dropped(n);
        if n > 0 {
            info!("registry: cleanup dropped {} snapshot(s) older than committed", n);
        }
        n
    }

    /// Forget everything, including the committed marker.
    pub fn drop_all(&self) -> usize {
        let removed = {
            let mut g = self.state.lock().unwrap();
            g.committed = None;
            g.dirty = false;
            std::mem::take(&mut g.snapshots)
        };
        let n = removed.len();
        record_snapshots_dropped(n);
        if n > 0 {
            info!("registry: dropped all {} snapshot(s)", n);
        }
        n
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered timestamps, ascending.
    pub fn names(&self) -> Vec<Timestamp> {
        self.state.lock().unwrap().snapshots.keys().copied().collect()
    }

    /// Whether cleanup has pending work.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().unwrap().dirty
    }
}
