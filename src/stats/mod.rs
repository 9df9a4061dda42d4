//! stats: разбор текстового дампа статистики storage-движка в JSON.
//!
//! - parser.rs: StatsParser: явная машина состояний (ParserState) + regex на строку

pub mod parser;

pub use parser::{ParserState, StatsParser};
