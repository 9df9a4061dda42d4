//! commit: timestamp-ordered commit admission.
//!
//! - mod.rs: TxnId, трейт CommitParticipant (то, что секвенсору нужно от транзакции)
//! - sequencer.rs: CommitSequencer: очередь тикетов по timestamp, head admission, wake-up
//!
//! The sequencer only decides *when* a participant may proceed; how the
//! participant sleeps until then is up to the participant (see txn::WriteUnit).

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::SnapResult;
use crate::timestamp::Timestamp;

pub mod sequencer;

pub use sequencer::CommitSequencer;

/// Identity of an in-flight transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TxnId(pub u64);

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

/// What the commit sequencer and snapshot manager need from a transaction.
pub trait CommitParticipant: Send + Sync {
    fn txn_id(&self) -> TxnId;

    /// True while the transaction holds a commit timestamp.
    fn is_timestamped(&self) -> bool;

    fn commit_timestamp(&self) -> Option<Timestamp>;

    /// Called by the sequencer when this transaction became the head of the queue.
    fn allow_commit(&self);

    /// Hook run before a snapshot is created on behalf of this transaction.
    fn prepare_for_snapshot(&self) -> SnapResult<()> {
        Ok(())
    }
}

/// Participant as held by a pending-commit ticket.
pub type Participant = Arc<dyn CommitParticipant>;
