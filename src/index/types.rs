//! Core identifiers shared by the index and the query layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal dense document number. Valid numbers start at 1; 0 means "none".
pub type DocNo = u32;

/// Token position inside a document. Valid positions start at 1; 0 means "none".
pub type Position = u32;

/// Largest position a document may use. Spans end at most one past twice
/// this value, so position arithmetic never overflows.
pub const MAX_POSITION: Position = u32::MAX / 2;

/// Hash map shared between snapshots. Clones are O(1) and an update copies
/// only the path to the changed entry.
pub type SharedMap<K, V> = imbl::HashMap<K, V, ahash::RandomState>;

/// A typed term: the atomic unit of postings and forward-index entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Term {
    /// Caller-defined category, e.g. "word".
    pub term_type: String,
    /// The indexed token.
    pub value: String,
}

impl Term {
    /// Create a new term.
    pub fn new<T: Into<String>, V: Into<String>>(term_type: T, value: V) -> Self {
        Term {
            term_type: term_type.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.term_type, self.value)
    }
}
