//! Query results.

use serde::{Deserialize, Serialize};

use crate::index::types::DocNo;

/// A named value extracted from a ranked document by a summarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryElement {
    pub name: String,
    pub value: String,
    pub weight: f64,
    /// Index of the element in a group of related elements, -1 for none.
    pub index: i32,
}

impl SummaryElement {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        SummaryElement {
            name: name.into(),
            value: value.into(),
            weight: 1.0,
            index: -1,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_index(mut self, index: i32) -> Self {
        self.index = index;
        self
    }
}

/// A ranked document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rank {
    pub docno: DocNo,
    pub weight: f64,
    pub summary: Vec<SummaryElement>,
}

impl Rank {
    /// First summary element with the given name.
    pub fn element(&self, name: &str) -> Option<&SummaryElement> {
        self.summary.iter().find(|e| e.name == name)
    }
}

/// Result of a query evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Number of documents passing all restrictions.
    pub nof_ranked: usize,
    /// Number of selected documents inspected.
    pub nof_visited: usize,
    /// The requested page of ranks, best first.
    pub ranks: Vec<Rank>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn docnos(&self) -> Vec<DocNo> {
        self.ranks.iter().map(|r| r.docno).collect()
    }
}
