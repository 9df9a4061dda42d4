//! CommitSequencer: очередь ожидающих коммита транзакций по timestamp.
//!
//! Состояние под одним Mutex:
//! - order: BTreeMap<Timestamp, Participant>: один тикет на timestamp;
//! - by_txn: TxnId -> Timestamp: один тикет на транзакцию.
//!
//! Only the head (lowest timestamp) may commit. Removing the head, by commit or
//! abort, notifies the new head once. Notifications run after the lock is
//! released, so a participant's own lock is never taken under the sequencer lock.

use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::metrics::{
    record_commit_aborted, record_commit_admitted, record_commit_registered, record_head_wakeup,
};
use crate::timestamp::Timestamp;

use super::{CommitParticipant, Participant, TxnId};

#[derive(Default)]
struct OrderState {
    order: BTreeMap<Timestamp, Participant>,
    by_txn: HashMap<TxnId, Timestamp>,
}

impl OrderState {
    fn head(&self) -> Option<&Participant> {
        self.order.first_key_value().map(|(_, p)| p)
    }

    fn head_id(&self) -> Option<TxnId> {
        self.head().map(|p| p.txn_id())
    }
}

#[derive(Default)]
pub struct CommitSequencer {
    state: Mutex<OrderState>,
}

fn notify_head(next: Option<Participant>) {
    if let Some(p) = next {
        debug!("sequencer: waking {} (new head)", p.txn_id());
        record_head_wakeup();
        p.allow_commit();
    }
}

impl CommitSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `txn` in the queue at `ts`, replacing a ticket it already holds.
    ///
    /// The registering transaction is not woken; it learns its position via
    /// `can_proceed`. If dropping its previous ticket promoted another
    /// transaction to head, that transaction is woken.
    ///
    /// Panics if `ts` is already held by a different transaction.
    pub fn register(&self, txn: Participant, ts: Timestamp) {
        let id = txn.txn_id();
        let mut g = self.state.lock().unwrap();

        let head_before = g.head_id();
        let prior = g.by_txn.remove(&id);
        if let Some(prev_ts) = prior {
            g.order.remove(&prev_ts);
        }
        if let Some(owner) = g.order.get(&ts) {
            panic!(
                "commit timestamp {} registered by {} is already held by {}",
                ts,
                id,
                owner.txn_id()
            );
        }
        g.order.insert(ts, txn);
        g.by_txn.insert(id, ts);

        let promoted = match (head_before, g.head()) {
            (Some(before), Some(now)) if before == id && now.txn_id() != id => {
                Some(Arc::clone(now))
            }
            _ => None,
        };
        drop(g);

        match prior {
            Some(prev_ts) => debug!("sequencer: {} re-registered {} -> {}", id, prev_ts, ts),
            None => debug!("sequencer: {} registered at {}", id, ts),
        }
        record_commit_registered(prior.is_some());
        notify_head(promoted);
    }

    /// Whether `txn` is at the head of the queue.
    ///
    /// Panics on an empty queue: a transaction must register before asking.
    pub fn can_proceed(&self, txn: &dyn CommitParticipant) -> bool {
        let g = self.state.lock().unwrap();
        match g.head_id() {
            Some(head) => head == txn.txn_id(),
            None => panic!("can_proceed({}) on an empty commit queue", txn.txn_id()),
        }
    }

    /// Remove the head ticket and wake the next head.
    ///
    /// The caller must be the head (it observed `can_proceed == true`).
    /// Panics on an empty queue.
    pub fn commit_head(&self) -> (Timestamp, TxnId) {
        let mut g = self.state.lock().unwrap();
        let (ts, p) = match g.order.pop_first() {
            Some(entry) => entry,
            None => panic!("commit_head on an empty commit queue"),
        };
        let id = p.txn_id();
        g.by_txn.remove(&id);
        let next = g.head().cloned();
        drop(g);

        debug!("sequencer: {} committed at {}", id, ts);
        record_commit_admitted();
        notify_head(next);
        (ts, id)
    }

    /// Like `commit_head`, but only for `txn`.
    ///
    /// Panics if `txn` is not the head; the queue is left untouched and the
    /// lock is released first, so the sequencer stays usable.
    pub fn commit_head_of(&self, txn: &dyn CommitParticipant) -> Timestamp {
        let id = txn.txn_id();
        let mut g = self.state.lock().unwrap();
        let head = g.head_id();
        if head != Some(id) {
            drop(g);
            match head {
                Some(h) => panic!("{} tried to commit while {} is the head", id, h),
                None => panic!("commit by {} on an empty commit queue", id),
            }
        }
        let ts = match g.by_txn.remove(&id) {
            Some(ts) => ts,
            None => unreachable!("head {} has no index entry", id),
        };
        g.order.remove(&ts);
        let next = g.head().cloned();
        drop(g);

        debug!("sequencer: {} committed at {}", id, ts);
        record_commit_admitted();
        notify_head(next);
        ts
    }

    /// Withdraw `txn` from the queue. No-op when it holds no ticket.
    pub fn abort(&self, txn: &dyn CommitParticipant) {
        if !txn.is_timestamped() {
            return;
        }
        let id = txn.txn_id();
        let mut g = self.state.lock().unwrap();
        let ts = match g.by_txn.remove(&id) {
            Some(ts) => ts,
            None => return,
        };
        let was_head = g.order.first_key_value().map(|(k, _)| *k) == Some(ts);
        g.order.remove(&ts);
        let next = if was_head { g.head().cloned() } else { None };
        drop(g);

        debug!("sequencer: {} aborted at {} (head={})", id, ts, was_head);
        record_commit_aborted();
        notify_head(next);
    }

    /// Lowest pending ticket.
    pub fn head(&self) -> Option<(Timestamp, TxnId)> {
        let g = self.state.lock().unwrap();
        g.order.first_key_value().map(|(ts, p)| (*ts, p.txn_id()))
    }

    /// Timestamp currently held by `id`.
    pub fn ticket_of(&self, id: TxnId) -> Option<Timestamp> {
        self.state.lock().unwrap().by_txn.get(&id).copied()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().order.len()
    }

    pub fn pending_timestamps(&self) -> Vec<Timestamp> {
        self.state.lock().unwrap().order.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    struct FakeTxn {
        id: TxnId,
        timestamped: AtomicBool,
        wakeups: AtomicU64,
    }

    impl FakeTxn {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: TxnId(id),
                timestamped: AtomicBool::new(true),
                wakeups: AtomicU64::new(0),
            })
        }
        fn wakeups(&self) -> u64 {
            self.wakeups.load(Ordering::SeqCst)
        }
    }

    impl CommitParticipant for FakeTxn {
        fn txn_id(&self) -> TxnId {
            self.id
        }
        fn is_timestamped(&self) -> bool {
            self.timestamped.load(Ordering::SeqCst)
        }
        fn commit_timestamp(&self) -> Option<Timestamp> {
            None
        }
        fn allow_commit(&self) {
            self.wakeups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ts(v: u64) -> Timestamp {
        Timestamp::from_u64(v)
    }

    #[test]
    fn commit_by_non_head_leaves_queue_intact() {
        let seq = CommitSequencer::new();
        let (t1, t2) = (FakeTxn::new(1), FakeTxn::new(2));
        seq.register(t1.clone(), ts(10));
        seq.register(t2.clone(), ts(20));

        // t2 checked its turn earlier, then t1 slipped in front of it.
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| seq.commit_head_of(&*t2)));
        assert!(res.is_err());
        assert_eq!(seq.pending_timestamps(), vec![ts(10), ts(20)]);
        assert_eq!(seq.ticket_of(TxnId(2)), Some(ts(20)));

        assert_eq!(seq.commit_head_of(&*t1), ts(10));
        assert_eq!(t2.wakeups(), 1);
        assert_eq!(seq.commit_head_of(&*t2), ts(20));
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn head_order_follows_timestamps_not_arrival() {
        let seq = CommitSequencer::new();
        let (t1, t2, t3) = (FakeTxn::new(1), FakeTxn::new(2), FakeTxn::new(3));
        seq.register(t1.clone(), ts(10));
        seq.register(t2.clone(), ts(5));
        seq.register(t3.clone(), ts(20));

        assert!(seq.can_proceed(&*t2));
        assert!(!seq.can_proceed(&*t1));
        assert!(!seq.can_proceed(&*t3));

        assert_eq!(seq.commit_head(), (ts(5), TxnId(2)));
        assert!(seq.can_proceed(&*t1));
        assert!(!seq.can_proceed(&*t3));
        assert_eq!(t1.wakeups(), 1);

        assert_eq!(seq.commit_head(), (ts(10), TxnId(1)));
        assert!(seq.can_proceed(&*t3));
        assert_eq!(t3.wakeups(), 1);

        seq.commit_head();
        assert_eq!(seq.pending(), 0);
        assert_eq!(t2.wakeups(), 0, "register never wakes the registrant");
    }

    #[test]
    fn abort_of_later_registered_head_scenario() {
        let seq = CommitSequencer::new();
        let (t1, t2) = (FakeTxn::new(1), FakeTxn::new(2));
        seq.register(t1.clone(), ts(100));
        seq.register(t2.clone(), ts(50));
        seq.abort(&*t1);

        assert!(seq.can_proceed(&*t2));
        assert_eq!(seq.pending_timestamps(), vec![ts(50)]);
        assert_eq!(t2.wakeups(), 0, "t1 was not the head");
    }

    #[test]
    fn head_abort_wakes_next_exactly_once() {
        let seq = CommitSequencer::new();
        let (a, b, c) = (FakeTxn::new(1), FakeTxn::new(2), FakeTxn::new(3));
        seq.register(a.clone(), ts(1));
        seq.register(b.clone(), ts(2));
        seq.register(c.clone(), ts(3));

        seq.abort(&*a);
        assert_eq!(b.wakeups(), 1);
        assert_eq!(c.wakeups(), 0);
        assert_eq!(seq.head(), Some((ts(2), TxnId(2))));

        // second abort of the same txn is a no-op
        seq.abort(&*a);
        assert_eq!(b.wakeups(), 1);
        assert_eq!(seq.pending(), 2);
    }

    #[test]
    fn abort_without_timestamp_is_noop() {
        let seq = CommitSequencer::new();
        let a = FakeTxn::new(1);
        a.timestamped.store(false, Ordering::SeqCst);
        seq.abort(&*a);
        assert_eq!(seq.pending(), 0);
    }

    #[test]
    fn reregistration_moves_single_ticket() {
        let seq = CommitSequencer::new();
        let (a, b) = (FakeTxn::new(1), FakeTxn::new(2));
        seq.register(a.clone(), ts(3));
        seq.register(b.clone(), ts(7));

        // a moves behind b: b is promoted and woken
        seq.register(a.clone(), ts(9));
        assert_eq!(seq.pending_timestamps(), vec![ts(7), ts(9)]);
        assert_eq!(seq.ticket_of(TxnId(1)), Some(ts(9)));
        assert!(seq.can_proceed(&*b));
        assert_eq!(b.wakeups(), 1);
        assert_eq!(a.wakeups(), 0);
    }

    #[test]
    #[should_panic(expected = "already held")]
    fn timestamp_collision_panics() {
        let seq = CommitSequencer::new();
        seq.register(FakeTxn::new(1), ts(5));
        seq.register(FakeTxn::new(2), ts(5));
    }

    #[test]
    #[should_panic(expected = "empty commit queue")]
    fn can_proceed_on_empty_queue_panics() {
        let seq = CommitSequencer::new();
        let a = FakeTxn::new(1);
        seq.can_proceed(&*a);
    }

    #[test]
    #[should_panic(expected = "empty commit queue")]
    fn commit_head_on_empty_queue_panics() {
        CommitSequencer::new().commit_head();
    }
}
