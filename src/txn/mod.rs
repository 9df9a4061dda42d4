//! txn: reference transaction side of commit ordering.
//!
//! - unit.rs: WriteUnit: CommitParticipant с Condvar-ожиданием своей очереди
//! - oracle.rs: TimestampOracle: выдача timestamp + регистрация под одним lock

pub mod oracle;
pub mod unit;

pub use oracle::TimestampOracle;
pub use unit::{UnitState, WriteUnit};
