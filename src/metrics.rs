//! Lightweight global metrics for QuiverSnap.
//!
//! Потокобезопасные атомарные счётчики для подсистем:
//! - Snapshot registry (views captured/inserted/dropped, cleanup)
//! - Commit sequencer (registrations, admissions, aborts, wake-ups)
//! - Majority reads (not-available-yet errors)

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

// ----- Registry -----
static SNAPSHOTS_CAPTURED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_INSERTED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_INSERT_REJECTED: AtomicU64 = AtomicU64::new(0);
static SNAPSHOTS_DROPPED: AtomicU64 = AtomicU64::new(0);
static CLEANUP_RUNS: AtomicU64 = AtomicU64::new(0);
static COMMITTED_ADVANCES: AtomicU64 = AtomicU64::new(0);

// ----- Sequencer -----
static COMMITS_REGISTERED: AtomicU64 = AtomicU64::new(0);
static COMMITS_RETIMESTAMPED: AtomicU64 = AtomicU64::new(0);
static COMMITS_ADMITTED: AtomicU64 = AtomicU64::new(0);
static COMMITS_ABORTED: AtomicU64 = AtomicU64::new(0);
static HEAD_WAKEUPS: AtomicU64 = AtomicU64::new(0);

// ----- Reads -----
static MAJORITY_NOT_AVAILABLE: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    // Registry
    pub snapshots_captured: u64,
    pub snapshots_inserted: u64,
    pub snapshot_insert_rejected: u64,
    pub snapshots_dropped: u64,
    pub cleanup_runs: u64,
    pub committed_advances: u64,

    // Sequencer
    pub commits_registered: u64,
    pub commits_retimestamped: u64,
    pub commits_admitted: u64,
    pub commits_aborted: u64,
    pub head_wakeups: u64,

    // Reads
    pub majority_not_available: u64,
}

impl MetricsSnapshot {
    /// Registry references currently held (captured + inserted - dropped).
    pub fn registry_refs(&self) -> u64 {
        (self.snapshots_captured + self.snapshots_inserted).saturating_sub(self.snapshots_dropped)
    }
}

// ----- Recorders (Registry) -----
pub fn record_snapshot_captured() {
    SNAPSHOTS_CAPTURED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_snapshot_inserted() {
    SNAPSHOTS_INSERTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_snapshot_insert_rejected() {
    SNAPSHOT_INSERT_REJECTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_snapshots_dropped(n: usize) {
    SNAPSHOTS_DROPPED.fetch_add(n as u64, Ordering::Relaxed);
}
pub fn record_cleanup_run() {
    CLEANUP_RUNS.fetch_add(1, Ordering::Relaxed);
}
pub fn record_committed_advance() {
    COMMITTED_ADVANCES.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Sequencer) -----
pub fn record_commit_registered(retimestamped: bool) {
    COMMITS_REGISTERED.fetch_add(1, Ordering::Relaxed);
    if retimestamped {
        COMMITS_RETIMESTAMPED.fetch_add(1, Ordering::Relaxed);
    }
}
pub fn record_commit_admitted() {
    COMMITS_ADMITTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_commit_aborted() {
    COMMITS_ABORTED.fetch_add(1, Ordering::Relaxed);
}
pub fn record_head_wakeup() {
    HEAD_WAKEUPS.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (Reads) -----
pub fn record_majority_not_available() {
    MAJORITY_NOT_AVAILABLE.fetch_add(1, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        snapshots_captured: SNAPSHOTS_CAPTURED.load(Ordering::Relaxed),
        snapshots_inserted: SNAPSHOTS_INSERTED.load(Ordering::Relaxed),
        snapshot_insert_rejected: SNAPSHOT_INSERT_REJECTED.load(Ordering::Relaxed),
        snapshots_dropped: SNAPSHOTS_DROPPED.load(Ordering::Relaxed),
        cleanup_runs: CLEANUP_RUNS.load(Ordering::Relaxed),
        committed_advances: COMMITTED_ADVANCES.load(Ordering::Relaxed),

        commits_registered: COMMITS_REGISTERED.load(Ordering::Relaxed),
        commits_retimestamped: COMMITS_RETIMESTAMPED.load(Ordering::Relaxed),
        commits_admitted: COMMITS_ADMITTED.load(Ordering::Relaxed),
        commits_aborted: COMMITS_ABORTED.load(Ordering::Relaxed),
        head_wakeups: HEAD_WAKEUPS.load(Ordering::Relaxed),

        majority_not_available: MAJORITY_NOT_AVAILABLE.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    SNAPSHOTS_CAPTURED.store(0, Ordering::Relaxed);
    SNAPSHOTS_INSERTED.store(0, Ordering::Relaxed);
    SNAPSHOT_INSERT_REJECTED.store(0, Ordering::Relaxed);
    SNAPSHOTS_DROPPED.store(0, Ordering::Relaxed);
    CLEANUP_RUNS.store(0, Ordering::Relaxed);
    COMMITTED_ADVANCES.store(0, Ordering::Relaxed);

    COMMITS_REGISTERED.store(0, Ordering::Relaxed);
    COMMITS_RETIMESTAMPED.store(0, Ordering::Relaxed);
    COMMITS_ADMITTED.store(0, Ordering::Relaxed);
    COMMITS_ABORTED.store(0, Ordering::Relaxed);
    HEAD_WAKEUPS.store(0, Ordering::Relaxed);

    MAJORITY_NOT_AVAILABLE.store(0, Ordering::Relaxed);
}
