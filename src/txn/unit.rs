//! WriteUnit: recovery-unit style write transaction.
//!
//! Жизненный цикл с точки зрения секвенсора:
//!   Active -> Pending(ts) -> { Committed(ts) | Aborted }
//!   Pending(ts1) -> Pending(ts2) при повторном reserve (re-timestamping).
//!
//! The unit owns the blocking part of commit ordering: it sleeps on its own
//! Condvar until the sequencer calls allow_commit() or it observes that it is
//! already the head.

use anyhow::{anyhow, Result};
use log::debug;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::commit::{CommitParticipant, TxnId};
use crate::error::{SnapError, SnapResult};
use crate::snapshots::SnapshotManager;
use crate::timestamp::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Pending(Timestamp),
    Committed(Timestamp),
    Aborted,
}

struct UnitInner {
    state: UnitState,
    // set by allow_commit(), consumed by the waiter
    may_proceed: bool,
    wakeups: u64,
}

pub struct WriteUnit {
    id: TxnId,
    inner: Mutex<UnitInner>,
    cv: Condvar,
}

impl WriteUnit {
    pub fn new(id: u64) -> Arc<Self> {
        Arc::new(Self {
            id: TxnId(id),
            inner: Mutex::new(UnitInner {
                state: UnitState::Active,
                may_proceed: false,
                wakeups: 0,
            }),
            cv: Condvar::new(),
        })
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn state(&self) -> UnitState {
        self.inner.lock().unwrap().state
    }

    /// Number of allow_commit() notifications received.
    pub fn wakeups(&self) -> u64 {
        self.inner.lock().unwrap().wakeups
    }

    /// Declare (or change) the commit timestamp and queue up for commit.
    pub fn reserve(self: &Arc<Self>, mgr: &SnapshotManager, ts: Timestamp) -> SnapResult<()> {
        {
            let mut g = self.inner.lock().unwrap();
            match g.state {
                UnitState::Active | UnitState::Pending(_) => g.state = UnitState::Pending(ts),
                _ => return Err(SnapError::UnitNotActive { id: self.id.0 }),
            }
        }
        mgr.op_started(Arc::clone(self) as Arc<dyn CommitParticipant>, ts);
        Ok(())
    }

    /// Block until this unit is the head of the commit queue.
    ///
    /// Returns false if `timeout` elapsed first; the ticket stays queued.
    pub fn wait_for_turn(&self, mgr: &SnapshotManager, timeout: Option<Duration>) -> bool {
        assert!(
            matches!(self.state(), UnitState::Pending(_)),
            "{} waits for commit turn without a reserved timestamp",
            self.id
        );
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if mgr.can_commit(self) {
                return true;
            }

            let mut g = self.inner.lock().unwrap();
            while !g.may_proceed {
                match deadline {
                    None => g = self.cv.wait(g).unwrap(),
                    Some(d) => {
                        let now = Instant::now();
                        if now >= d {
                            drop(g);
                            return mgr.can_commit(self);
                        }
                        g = self.cv.wait_timeout(g, d - now).unwrap().0;
                    }
                }
            }
            g.may_proceed = false;
        }
    }

    /// Wait for the turn, run the durable write, then publish the commit.
    ///
    /// If the wait times out or the write fails, the unit aborts, which hands
    /// the turn to the next transaction.
    pub fn commit<F, R>(self: &Arc<Self>, mgr: &SnapshotManager, write: F) -> Result<R>
    where
        F: FnOnce(Timestamp) -> Result<R>,
    {
        let ts = match self.state() {
            UnitState::Pending(ts) => ts,
            other => return Err(anyhow!("{} cannot commit in state {:?}", self.id, other)),
        };

        if !self.wait_for_turn(mgr, mgr.config().wait_timeout()) {
            // a caller giving up must not leave its ticket blocking the queue
            self.abort(mgr);
            return Err(anyhow!("{} timed out waiting for commit turn at {}", self.id, ts));
        }

        let out = match write(ts) {
            Ok(v) => v,
            Err(e) => {
                self.abort(mgr);
                return Err(e.context(format!("{} write failed at {}", self.id, ts)));
            }
        };

        let head_ts = mgr.op_committed_by(&**self);
        debug_assert_eq!(head_ts, ts);
        self.inner.lock().unwrap().state = UnitState::Committed(ts);
        debug!("{} committed at {}", self.id, ts);
        Ok(out)
    }

    /// Abort; withdraws the pending ticket once. Repeated calls are no-ops.
    pub fn abort(&self, mgr: &SnapshotManager) {
        let state = self.state();
        match state {
            UnitState::Committed(_) | UnitState::Aborted => return,
            UnitState::Active | UnitState::Pending(_) => {}
        }
        // still Pending here, so the sequencer sees a timestamped unit
        mgr.op_aborted(self);
        self.inner.lock().unwrap().state = UnitState::Aborted;
        debug!("{} aborted (was {:?})", self.id, state);
    }
}

impl CommitParticipant for WriteUnit {
    fn txn_id(&self) -> TxnId {
        self.id
    }

    fn is_timestamped(&self) -> bool {
        matches!(self.state(), UnitState::Pending(_))
    }

    fn commit_timestamp(&self) -> Option<Timestamp> {
        match self.state() {
            UnitState::Pending(ts) | UnitState::Committed(ts) => Some(ts),
            _ => None,
        }
    }

    fn allow_commit(&self) {
        let mut g = self.inner.lock().unwrap();
        g.may_proceed = true;
        g.wakeups += 1;
        self.cv.notify_all();
    }

    fn prepare_for_snapshot(&self) -> SnapResult<()> {
        match self.state() {
            UnitState::Active => Ok(()),
            _ => Err(SnapError::UnitNotActive { id: self.id.0 }),
        }
    }
}
