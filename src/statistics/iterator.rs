//! Lazy sequences of statistics blobs.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::statistics::blob::{BlobOrigin, StatisticsMessage, StatsProcKind};
use crate::statistics::{StatisticsRecord, TimeStamp};

/// Default upper bound of entries per blob.
pub const DEFAULT_MAX_BLOB_ENTRIES: usize = 4096;

/// Yields encoded blobs, splitting and encoding each record on demand.
#[derive(Debug)]
pub struct StatisticsIterator {
    records: VecDeque<Arc<StatisticsRecord>>,
    pending: VecDeque<StatisticsMessage>,
    origin: BlobOrigin,
    encoding: StatsProcKind,
    max_entries: usize,
}

impl StatisticsIterator {
    pub(crate) fn new(
        records: Vec<Arc<StatisticsRecord>>,
        origin: BlobOrigin,
        encoding: StatsProcKind,
    ) -> Self {
        StatisticsIterator {
            records: records.into(),
            pending: VecDeque::new(),
            origin,
            encoding,
            max_entries: DEFAULT_MAX_BLOB_ENTRIES,
        }
    }

    /// Limit the number of term entries per blob.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    /// Timestamp of the last record this iterator will produce.
    pub fn last_timestamp(&self) -> Option<TimeStamp> {
        self.records.back().map(|r| r.timestamp)
    }

    /// Next message in decoded form.
    pub fn next_message(&mut self) -> Option<StatisticsMessage> {
        if self.pending.is_empty() {
            let record = self.records.pop_front()?;
            self.pending = StatisticsMessage::split(
                &record,
                self.origin,
                self.encoding,
                self.max_entries,
            )
            .into();
        }
        self.pending.pop_front()
    }
}

impl Iterator for StatisticsIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().map(|message| message.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::Term;
    use crate::statistics::DfChange;

    #[test]
    fn test_iterates_records_in_parts() {
        let records = (1..=2)
            .map(|counter| {
                Arc::new(StatisticsRecord {
                    timestamp: TimeStamp::new(1, counter),
                    nofdocs_delta: 1,
                    changes: (0..3)
                        .map(|i| DfChange {
                            term: Term::new("word", i.to_string()),
                            increment: 1,
                        })
                        .collect(),
                })
            })
            .collect();
        let iter = StatisticsIterator::new(records, BlobOrigin::Update, StatsProcKind::Std)
            .with_max_entries(2);
        assert_eq!(iter.last_timestamp(), Some(TimeStamp::new(1, 2)));

        let blobs: Vec<Vec<u8>> = iter.collect::<Result<_>>().unwrap();
        assert_eq!(blobs.len(), 4);
        let last = StatisticsMessage::decode(&blobs[3]).unwrap();
        assert_eq!(last.timestamp, TimeStamp::new(1, 2));
        assert_eq!(last.part, 1);
    }
}
