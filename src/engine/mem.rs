//! MemEngine: in-memory multi-version key/value engine.
//!
//! Каждая запись получает следующий sequence; view фиксирует sequence на момент
//! захвата и читает последнюю версию ключа с seq <= pinned.
//!
//! Accounting:
//! - captured_total / released_total: monotonic counters;
//! - live_views: views captured and not yet released.
//! Releasing an unknown (or already released) view panics.

use anyhow::{anyhow, Result};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{SnapshotEngine, ViewId};

#[derive(Default)]
struct MemInner {
    seq: u64,
    next_view: u64,
    // key -> (seq -> value); None = tombstone
    data: BTreeMap<Vec<u8>, BTreeMap<u64, Option<Vec<u8>>>>,
    // live view -> pinned seq
    views: HashMap<ViewId, u64>,
}

impl MemInner {
    fn lookup(&self, key: &[u8], upto: u64) -> Option<Vec<u8>> {
        self.data
            .get(key)
            .and_then(|versions| versions.range(..=upto).next_back())
            .and_then(|(_, v)| v.clone())
    }

    fn write(&mut self, key: &[u8], value: Option<Vec<u8>>) -> u64 {
        self.seq += 1;
        let seq = self.seq;
        self.data.entry(key.to_vec()).or_default().insert(seq, value);
        seq
    }
}

/// In-memory engine. Share it as `Arc<MemEngine>`.
#[derive(Default)]
pub struct MemEngine {
    inner: Mutex<MemInner>,
    captured: AtomicU64,
    released: AtomicU64,
}

impl MemEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value; returns the sequence assigned to the write.
    pub fn put(&self, key: &[u8], value: &[u8]) -> u64 {
        let mut g = self.inner.lock().unwrap();
        g.write(key, Some(value.to_vec()))
    }

    /// Write a tombstone; returns the sequence assigned to the write.
    pub fn delete(&self, key: &[u8]) -> u64 {
        let mut g = self.inner.lock().unwrap();
        g.write(key, None)
    }

    /// Latest committed value.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let g = self.inner.lock().unwrap();
        g.lookup(key, g.seq)
    }

    /// Current (last assigned) sequence.
    pub fn last_seq(&self) -> u64 {
        self.inner.lock().unwrap().seq
    }

    /// Sequence pinned by a live view.
    pub fn view_seq(&self, view: ViewId) -> Option<u64> {
        self.inner.lock().unwrap().views.get(&view).copied()
    }

    pub fn live_views(&self) -> usize {
        self.inner.lock().unwrap().views.len()
    }

    pub fn captured_total(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn released_total(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    /// Drop versions that are neither the newest of their key nor visible to any live view.
    /// Returns the number of removed versions.
    pub fn prune(&self) -> usize {
        let mut g = self.inner.lock().unwrap();
        let mut pins: Vec<u64> = g.views.values().copied().collect();
        pins.sort_unstable();
        pins.dedup();

        let mut removed = 0usize;
        for versions in g.data.values_mut() {
            let seqs: Vec<u64> = versions.keys().copied().collect();
            let newest = match seqs.last() {
                Some(s) => *s,
                None => continue,
            };
            for (i, &s) in seqs.iter().enumerate() {
                if s == newest {
                    continue;
                }
                // Version s is visible to pins in [s, next_version).
                let next = seqs[i + 1];
                let pinned = pins.iter().any(|&p| p >= s && p < next);
                if !pinned {
                    versions.remove(&s);
                    removed += 1;
                }
            }
        }
        g.data.retain(|_, v| !v.is_empty());
        if removed > 0 {
            debug!("mem_engine: pruned {} version(s)", removed);
        }
        removed
    }
}

impl SnapshotEngine for MemEngine {
    fn capture_view(&self) -> ViewId {
        let mut g = self.inner.lock().unwrap();
        g.next_view += 1;
        let id = ViewId(g.next_view);
        let seq = g.seq;
        g.views.insert(id, seq);
        drop(g);
        self.captured.fetch_add(1, Ordering::Relaxed);
        debug!("mem_engine: captured {} at seq={}", id, seq);
        id
    }

    fn release_view(&self, view: ViewId) {
        let mut g = self.inner.lock().unwrap();
        if g.views.remove(&view).is_none() {
            drop(g);
            panic!("mem_engine: release of unknown or already released {}", view);
        }
        drop(g);
        self.released.fetch_add(1, Ordering::Relaxed);
        debug!("mem_engine: released {}", view);
    }

    fn read_at(&self, view: ViewId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let g = self.inner.lock().unwrap();
        let seq = *g
            .views
            .get(&view)
            .ok_or_else(|| anyhow!("read through {} which is not live", view))?;
        Ok(g.lookup(key, seq))
    }
}
