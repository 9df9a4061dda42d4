#![allow(non_snake_case)]

// Базовые модули
pub mod config;
pub mod error;
pub mod metrics;
pub mod timestamp;

// Граница со storage-движком (views) + in-memory движок
pub mod engine; // src/engine/{mod,mem}.rs

// Реестр снапшотов и фасад SnapshotManager
pub mod snapshots; // src/snapshots/{mod,handle,registry,manager}.rs

// Порядок коммитов по timestamp
pub mod commit; // src/commit/{mod,sequencer}.rs

// Транзакционная сторона: WriteUnit + TimestampOracle
pub mod txn; // src/txn/{mod,unit,oracle}.rs

// Разбор дампа статистики движка
pub mod stats; // src/stats/{mod,parser}.rs

// CLI (используется бинарником quiversnap)
pub mod cli;

// Удобные реэкспорты
pub use commit::{CommitParticipant, CommitSequencer, Participant, TxnId};
pub use config::SnapConfig;
pub use engine::{MemEngine, SnapshotEngine, ViewId};
pub use error::{SnapError, SnapResult};
pub use snapshots::{ManagerStatus, SharedSnapshot, SnapshotHandle, SnapshotManager, SnapshotRegistry};
pub use stats::{ParserState, StatsParser};
pub use timestamp::Timestamp;
pub use txn::{TimestampOracle, UnitState, WriteUnit};
