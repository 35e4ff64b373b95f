//! Document frequency statistics distribution.
//!
//! Every commit yields one [`StatisticsRecord`]: the signed change of the
//! number of documents and of the document frequency of each touched term.
//! Records travel between index instances as versioned binary blobs
//! ([`blob`]) and are merged into replicas of the global statistics
//! ([`map::StatisticsMap`]) strictly in timestamp order. A storage keeps a
//! bounded [`history::StatisticsHistory`] of its own records to serve deltas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::index::types::Term;

pub mod blob;
pub mod history;
pub mod iterator;
pub mod map;

pub use blob::{StatisticsMessage, StatsProcKind};
pub use history::StatisticsHistory;
pub use iterator::StatisticsIterator;
pub use map::StatisticsMap;

/// Logical timestamp of a commit.
///
/// Ordered by wall clock seconds first, then by the per-storage commit
/// counter. The storage never hands out a timestamp lower than a previous one.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TimeStamp {
    pub unixtime: u64,
    pub counter: u64,
}

impl TimeStamp {
    pub fn new(unixtime: u64, counter: u64) -> Self {
        TimeStamp { unixtime, counter }
    }

    /// Successor of `self` at wall clock `now`.
    pub fn next(&self, now: u64) -> Self {
        TimeStamp {
            unixtime: now.max(self.unixtime),
            counter: self.counter + 1,
        }
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unixtime, self.counter)
    }
}

/// Signed document frequency change of one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DfChange {
    pub term: Term,
    pub increment: i64,
}

/// The statistics delta of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsRecord {
    pub timestamp: TimeStamp,
    pub nofdocs_delta: i64,
    /// Sorted by term.
    pub changes: Vec<DfChange>,
}

impl StatisticsRecord {
    pub fn is_empty(&self) -> bool {
        self.nofdocs_delta == 0 && self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_order() {
        let a = TimeStamp::new(100, 5);
        let b = a.next(90);
        assert_eq!(b, TimeStamp::new(100, 6));
        assert!(b > a);
        assert!(TimeStamp::new(101, 1) > b);
        assert_eq!(b.to_string(), "100:6");
    }
}
