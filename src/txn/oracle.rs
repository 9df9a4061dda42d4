use std::sync::{Arc, Mutex};

use crate::error::SnapResult;
use crate::snapshots::SnapshotManager;
use crate::timestamp::Timestamp;

use super::unit::WriteUnit;

/// Issues commit timestamps.
///
/// Allocation and queue registration happen under one lock, so a unit that
/// got a smaller timestamp is always queued before a larger one can be
/// admitted.
#[derive(Debug)]
pub struct TimestampOracle {
    next: Mutex<Timestamp>,
}

impl Default for TimestampOracle {
    fn default() -> Self {
        Self::new(Timestamp::from_u64(1))
    }
}

impl TimestampOracle {
    pub fn new(start: Timestamp) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }

    /// Timestamp the next reservation will get.
    pub fn peek(&self) -> Timestamp {
        *self.next.lock().unwrap()
    }

    /// Allocate a bare timestamp without queueing anything.
    pub fn alloc(&self) -> Timestamp {
        let mut g = self.next.lock().unwrap();
        let ts = *g;
        *g = ts.next();
        ts
    }

    /// Allocate the next timestamp and queue `unit` under it.
    pub fn reserve(&self, mgr: &SnapshotManager, unit: &Arc<WriteUnit>) -> SnapResult<Timestamp> {
        let mut g = self.next.lock().unwrap();
        let ts = *g;
        unit.reserve(mgr, ts)?;
        *g = ts.next();
        Ok(ts)
    }
}
