//! Errors surfaced by the snapshot manager.
//!
//! Only expected, recoverable conditions live here. Contract violations
//! (timestamp regression, empty commit queue, double view release) panic.

use thiserror::Error;

use crate::timestamp::Timestamp;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapError {
    /// No snapshot has been marked committed yet (startup / initial sync).
    #[error("ReadConcernMajorityNotAvailableYet: committed view is not available yet")]
    ReadConcernMajorityNotAvailableYet,

    /// `insert_snapshot` hit an existing key while overwrite is disabled.
    #[error("snapshot already registered at {ts}")]
    SnapshotExists { ts: Timestamp },

    /// The unit is not in a state that can accept the requested operation.
    #[error("write unit {id} is not active")]
    UnitNotActive { id: u64 },
}

impl SnapError {
    /// True when the caller should retry (or wait) instead of failing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SnapError::ReadConcernMajorityNotAvailableYet)
    }
}

pub type SnapResult<T> = std::result::Result<T, SnapError>;
