//! Bounded history of per-commit statistics records.

use std::collections::VecDeque;
use std::sync::Arc;

use log::debug;

use crate::error::{QuarryError, Result};
use crate::statistics::{StatisticsRecord, TimeStamp};

/// The newest commit records, oldest first.
///
/// At most `limit` records are kept. Dropping a record moves the horizon to
/// its timestamp: deltas since a point older than the horizon can no longer
/// be served.
#[derive(Debug, Clone)]
pub struct StatisticsHistory {
    records: VecDeque<Arc<StatisticsRecord>>,
    horizon: Option<TimeStamp>,
    limit: usize,
}

impl StatisticsHistory {
    pub fn new(limit: usize) -> Self {
        StatisticsHistory {
            records: VecDeque::new(),
            horizon: None,
            limit: limit.max(1),
        }
    }

    /// Rebuild a history from persisted records and horizon.
    pub fn restore(limit: usize, horizon: Option<TimeStamp>, records: Vec<StatisticsRecord>) -> Self {
        let mut history = StatisticsHistory::new(limit);
        history.horizon = horizon;
        for record in records {
            history.push(Arc::new(record));
        }
        history
    }

    /// Append the record of a new commit, dropping the oldest beyond the
    /// limit.
    pub fn push(&mut self, record: Arc<StatisticsRecord>) {
        self.records.push_back(record);
        while self.records.len() > self.limit {
            if let Some(dropped) = self.records.pop_front() {
                self.horizon = Some(dropped.timestamp);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Timestamp of the newest dropped record.
    pub fn horizon(&self) -> Option<TimeStamp> {
        self.horizon
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<StatisticsRecord>> {
        self.records.iter()
    }

    /// Records of all commits strictly after `since`, all commits for
    /// `None`. Fails when some of them were already dropped.
    pub fn since(&self, since: Option<TimeStamp>) -> Result<Vec<Arc<StatisticsRecord>>> {
        if let Some(horizon) = self.horizon {
            if since.is_none_or(|since| since < horizon) {
                let from = since.map_or_else(|| "the start".to_string(), |s| s.to_string());
                return Err(QuarryError::consistency(format!(
                    "statistics history from {from} is no longer available, records up to {horizon} \
                     were dropped; fetch the full table instead"
                )));
            }
        }
        let records: Vec<Arc<StatisticsRecord>> = self
            .records
            .iter()
            .filter(|r| since.is_none_or(|since| r.timestamp > since))
            .cloned()
            .collect();
        debug!("{} statistics records after {since:?}", records.len());
        Ok(records)
    }
}
