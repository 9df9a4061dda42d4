//! Logical commit timestamp.
//!
//! Timestamp: непрозрачное 64-битное значение логических часов движка.
//! Требуются только сравнение и упорядочивание; пара (secs, inc) упаковывается
//! как `secs << 32 | inc`, поэтому порядок пар совпадает с порядком u64.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(0);
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    #[inline]
    pub const fn from_u64(v: u64) -> Self {
        Timestamp(v)
    }

    /// Build from a (seconds, increment) pair.
    #[inline]
    pub const fn from_parts(secs: u32, inc: u32) -> Self {
        Timestamp(((secs as u64) << 32) | inc as u64)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn secs(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn inc(self) -> u32 {
        self.0 as u32
    }

    /// Next timestamp (saturating at MAX).
    #[inline]
    pub fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }
}

impl From<u64> for Timestamp {
    fn from(v: u64) -> Self {
        Timestamp(v)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.secs(), self.inc())
    }
}
