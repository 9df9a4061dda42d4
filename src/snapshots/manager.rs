//! Snapshot manager: facade over the snapshot registry and the commit sequencer.
//!
//! Two independently locked parts, never locked together:
//! - SnapshotRegistry: committed view for majority reads (consistency-layer side);
//! - CommitSequencer: timestamp-ordered commit admission (transaction side).
//!
//! Lifetime follows the engine: build it at engine open, drop it at engine close
//! (Drop releases every registered snapshot).

use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

use crate::commit::{CommitParticipant, CommitSequencer, Participant, TxnId};
use crate::config::SnapConfig;
use crate::engine::{SnapshotEngine, ViewId};
use crate::error::SnapResult;
use crate::timestamp::Timestamp;

use super::handle::{SharedSnapshot, SnapshotHandle};
use super::registry::SnapshotRegistry;

/// Point-in-time summary of the manager state (for status output).
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub committed: Option<Timestamp>,
    pub snapshots: Vec<Timestamp>,
    pub dirty: bool,
    pub pending_commits: usize,
    pub commit_head: Option<(Timestamp, TxnId)>,
}

pub struct SnapshotManager {
    cfg: SnapConfig,
    registry: SnapshotRegistry,
    sequencer: CommitSequencer,
}

impl SnapshotManager {
    pub fn new(engine: Arc<dyn SnapshotEngine>, cfg: SnapConfig) -> Self {
        let registry = SnapshotRegistry::new(engine, cfg.allow_overwrite);
        Self::from_parts(registry, CommitSequencer::new(), cfg)
    }

    /// Compose a manager from already built parts.
    pub fn from_parts(registry: SnapshotRegistry, sequencer: CommitSequencer, cfg: SnapConfig) -> Self {
        debug!("snapshot manager: {}", cfg);
        Self {
            cfg,
            registry,
            sequencer,
        }
    }

    pub fn config(&self) -> &SnapConfig {
        &self.cfg
    }

    pub fn engine(&self) -> &Arc<dyn SnapshotEngine> {
        self.registry.engine()
    }

    // ---------- consistency-layer side ----------

    /// Let the transaction prepare before a snapshot is taken on its behalf.
    pub fn prepare_for_snapshot(&self, txn: &dyn CommitParticipant) -> SnapResult<()> {
        txn.prepare_for_snapshot()
    }

    /// Advance the majority-committed snapshot. Equal timestamp is a no-op;
    /// a smaller one panics.
    pub fn set_committed_snapshot(&self, ts: Timestamp) {
        let captured = self.registry.set_committed(ts);
        if captured {
            debug!("committed snapshot -> {} (new view)", ts);
        }
        if self.cfg.auto_cleanup {
            self.registry.cleanup();
        }
    }

    /// Drop snapshots older than the committed one. Returns removed count.
    pub fn cleanup_unneeded_snapshots(&self) -> usize {
        self.registry.cleanup()
    }

    pub fn drop_all_snapshots(&self) -> usize {
        self.registry.drop_all()
    }

    pub fn have_committed_snapshot(&self) -> bool {
        self.registry.have_committed()
    }

    /// Shared handle of the committed snapshot, or the retryable
    /// `ReadConcernMajorityNotAvailableYet`.
    pub fn get_committed_snapshot(&self) -> SnapResult<SharedSnapshot> {
        self.registry.committed()
    }

    pub fn committed_snapshot_name(&self) -> SnapResult<Timestamp> {
        self.registry.committed_name()
    }

    /// Register a view the caller captured itself (e.g. together with a checkpoint).
    pub fn insert_snapshot(&self, ts: Timestamp, view: ViewId) -> SnapResult<()> {
        let handle = SnapshotHandle::adopt(self.registry.engine(), view, ts);
        self.registry.insert(ts, handle)
    }

    /// Capture a view right now and register it at `ts`.
    pub fn capture_snapshot(&self, ts: Timestamp) -> SnapResult<()> {
        let handle = SnapshotHandle::capture(self.registry.engine(), ts);
        self.registry.insert(ts, handle)
    }

    // ---------- transaction side ----------

    /// Queue `txn` for commit at `ts` (replacing its previous timestamp, if any).
    pub fn op_started(&self, txn: Participant, ts: Timestamp) {
        self.sequencer.register(txn, ts);
    }

    /// Withdraw `txn` from the commit queue; wakes the next head if needed.
    pub fn op_aborted(&self, txn: &dyn CommitParticipant) {
        self.sequencer.abort(txn);
    }

    /// Publish the head commit and wake the next one.
    pub fn op_committed(&self) -> (Timestamp, TxnId) {
        self.sequencer.commit_head()
    }

    /// Publish the commit of `txn`, which must be the head; panics before
    /// touching the queue otherwise.
    pub fn op_committed_by(&self, txn: &dyn CommitParticipant) -> Timestamp {
        self.sequencer.commit_head_of(txn)
    }

    /// Whether `txn` is allowed to commit now.
    pub fn can_commit(&self, txn: &dyn CommitParticipant) -> bool {
        self.sequencer.can_proceed(txn)
    }

    pub fn pending_commits(&self) -> usize {
        self.sequencer.pending()
    }

    // ---------- diagnostics ----------

    pub fn status(&self) -> ManagerStatus {
        ManagerStatus {
            committed: self.registry.committed_name().ok(),
            snapshots: self.registry.names(),
            dirty: self.registry.is_dirty(),
            pending_commits: self.sequencer.pending(),
            commit_head: self.sequencer.head(),
        }
    }
}

impl Drop for SnapshotManager {
    fn drop(&mut self) {
        let n = self.registry.drop_all();
        if n > 0 {
            info!("snapshot manager closed, released {} snapshot(s)", n);
        }
    }
}
