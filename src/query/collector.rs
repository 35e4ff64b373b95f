//! Top-N rank collector.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::index::types::DocNo;

/// A weighted document in the heap.
#[derive(Debug, Clone, Copy)]
struct WeightedDoc {
    docno: DocNo,
    weight: f64,
}

impl WeightedDoc {
    /// Result order: weight descending, then document number ascending.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| self.docno.cmp(&other.docno))
    }
}

impl PartialEq for WeightedDoc {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for WeightedDoc {}

impl PartialOrd for WeightedDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WeightedDoc {
    // The heap top is the worst of the collected documents.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

/// Keeps the best `capacity` documents by weight.
#[derive(Debug)]
pub struct RankCollector {
    capacity: usize,
    heap: BinaryHeap<WeightedDoc>,
    nof_collected: usize,
}

impl RankCollector {
    pub fn new(capacity: usize) -> Self {
        RankCollector {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(1024)),
            nof_collected: 0,
        }
    }

    pub fn collect(&mut self, docno: DocNo, weight: f64) {
        self.nof_collected += 1;
        if self.capacity == 0 {
            return;
        }
        let candidate = WeightedDoc { docno, weight };
        if self.heap.len() < self.capacity {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate.rank_cmp(worst) == Ordering::Less {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    /// Number of calls to [`RankCollector::collect`].
    pub fn nof_collected(&self) -> usize {
        self.nof_collected
    }

    /// Collected documents, best first.
    pub fn into_sorted(self) -> Vec<(DocNo, f64)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|d| (d.docno, d.weight))
            .collect()
    }
}
