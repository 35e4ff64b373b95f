//! Replica of global statistics built from statistics blobs.

use std::collections::HashSet;

use ahash::AHashMap;
use log::{debug, warn};

use crate::error::{QuarryError, Result};
use crate::index::types::Term;
use crate::statistics::blob::{BlobOrigin, StatisticsMessage};
use crate::statistics::TimeStamp;

/// Global document frequencies merged from one or more peers' blobs.
///
/// Blobs must arrive in non-decreasing timestamp order. A blob seen before
/// (same timestamp, part and origin) is ignored; a blob older than the last
/// applied timestamp is rejected without touching the state. Only the keys
/// of the last applied timestamp are remembered: older keys can never match
/// an acceptable blob again.
#[derive(Debug, Default)]
pub struct StatisticsMap {
    nofdocs: i64,
    df: AHashMap<Term, i64>,
    last_applied: Option<TimeStamp>,
    seen: HashSet<(TimeStamp, u32, BlobOrigin)>,
}

impl StatisticsMap {
    pub fn new() -> Self {
        StatisticsMap::default()
    }

    /// Decode and apply a blob. Returns `false` for an ignored duplicate.
    pub fn apply_blob(&mut self, blob: &[u8]) -> Result<bool> {
        let message = StatisticsMessage::decode(blob)?;
        self.apply(&message)
    }

    /// Apply a decoded message. Returns `false` for an ignored duplicate.
    pub fn apply(&mut self, message: &StatisticsMessage) -> Result<bool> {
        let key = message.key();
        if self.seen.contains(&key) {
            warn!(
                "ignoring duplicate statistics blob {} part {}",
                message.timestamp, message.part
            );
            return Ok(false);
        }
        if let Some(last) = self.last_applied {
            if message.timestamp < last {
                return Err(QuarryError::consistency(format!(
                    "statistics blob {} is older than last applied {}",
                    message.timestamp, last
                )));
            }
        }

        self.nofdocs += message.nofdocs_delta;
        for change in &message.changes {
            let entry = self.df.entry(change.term.clone()).or_insert(0);
            *entry += change.increment;
            if *entry == 0 {
                self.df.remove(&change.term);
            }
        }
        if self.last_applied != Some(message.timestamp) {
            self.seen.clear();
        }
        self.seen.insert(key);
        self.last_applied = Some(message.timestamp);
        debug!(
            "applied statistics blob {} part {} ({} changes)",
            message.timestamp,
            message.part,
            message.changes.len()
        );
        Ok(true)
    }

    /// Total number of documents.
    pub fn nof_documents(&self) -> i64 {
        self.nofdocs
    }

    /// Document frequency of a term.
    pub fn document_frequency(&self, term: &Term) -> i64 {
        self.df.get(term).copied().unwrap_or(0)
    }

    /// Timestamp of the newest applied blob.
    pub fn last_applied(&self) -> Option<TimeStamp> {
        self.last_applied
    }

    /// All terms with a non-zero frequency, sorted.
    pub fn terms(&self) -> Vec<(Term, i64)> {
        let mut terms: Vec<(Term, i64)> = self.df.iter().map(|(t, &v)| (t.clone(), v)).collect();
        terms.sort();
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::blob::StatsProcKind;
    use crate::statistics::{DfChange, StatisticsRecord};

    fn blob(counter: u64, increment: i64) -> Vec<u8> {
        let record = StatisticsRecord {
            timestamp: TimeStamp::new(10, counter),
            nofdocs_delta: 1,
            changes: vec![DfChange {
                term: Term::new("word", "2"),
                increment,
            }],
        };
        StatisticsMessage::split(&record, BlobOrigin::Update, StatsProcKind::Std, 100)[0]
            .encode()
            .unwrap()
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut map = StatisticsMap::new();
        let first = blob(1, 1);
        assert!(map.apply_blob(&first).unwrap());
        assert!(!map.apply_blob(&first).unwrap());

        assert_eq!(map.nof_documents(), 1);
        assert_eq!(map.document_frequency(&Term::new("word", "2")), 1);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut map = StatisticsMap::new();
        map.apply_blob(&blob(2, 1)).unwrap();
        let err = map.apply_blob(&blob(1, 5)).unwrap_err();
        assert!(matches!(err, QuarryError::Consistency(_)));
        assert_eq!(map.document_frequency(&Term::new("word", "2")), 1);
        assert_eq!(map.last_applied(), Some(TimeStamp::new(10, 2)));
    }

    #[test]
    fn test_seen_keys_limited_to_last_timestamp() {
        let mut map = StatisticsMap::new();
        for counter in 1..=50 {
            map.apply_blob(&blob(counter, 1)).unwrap();
        }
        assert_eq!(map.seen.len(), 1);
        assert!(!map.apply_blob(&blob(50, 1)).unwrap());
        assert!(map.apply_blob(&blob(3, 1)).is_err());
        assert_eq!(map.document_frequency(&Term::new("word", "2")), 50);
    }

    #[test]
    fn test_increments_sum() {
        let mut map = StatisticsMap::new();
        map.apply_blob(&blob(1, 3)).unwrap();
        map.apply_blob(&blob(2, -3)).unwrap();
        assert_eq!(map.document_frequency(&Term::new("word", "2")), 0);
        assert!(map.terms().is_empty());
    }
}
