//! Analyzed documents as handed over by the analyzer.
//!
//! Text analysis happens outside of this crate. What arrives here is already
//! reduced to typed terms with positions, scalar metadata values, string
//! attributes and access tokens.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::index::types::{Position, Term};

/// A scalar value stored in a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum NumericValue {
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
}

impl NumericValue {
    /// The value as a float, used by weighting and comparisons.
    pub fn as_f64(&self) -> f64 {
        match *self {
            NumericValue::Int(v) => v as f64,
            NumericValue::UInt(v) => v as f64,
            NumericValue::Float(v) => v,
        }
    }

    /// The value as an integer when it has no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            NumericValue::Int(v) => Some(v),
            NumericValue::UInt(v) => i64::try_from(v).ok(),
            NumericValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
            NumericValue::Float(_) => None,
        }
    }

    /// Numeric comparison across representations.
    pub fn compare(&self, other: &NumericValue) -> Option<Ordering> {
        match (self, other) {
            (NumericValue::Int(a), NumericValue::Int(b)) => Some(a.cmp(b)),
            (NumericValue::UInt(a), NumericValue::UInt(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericValue::Int(v) => write!(f, "{v}"),
            NumericValue::UInt(v) => write!(f, "{v}"),
            NumericValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for NumericValue {
    fn from(value: i64) -> Self {
        NumericValue::Int(value)
    }
}

impl From<i32> for NumericValue {
    fn from(value: i32) -> Self {
        NumericValue::Int(value as i64)
    }
}

impl From<u32> for NumericValue {
    fn from(value: u32) -> Self {
        NumericValue::UInt(value as u64)
    }
}

impl From<u64> for NumericValue {
    fn from(value: u64) -> Self {
        NumericValue::UInt(value)
    }
}

impl From<f64> for NumericValue {
    fn from(value: f64) -> Self {
        NumericValue::Float(value)
    }
}

/// One occurrence of a term at a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTerm {
    pub term_type: String,
    pub value: String,
    pub position: Position,
}

impl IndexTerm {
    pub fn term(&self) -> Term {
        Term::new(self.term_type.clone(), self.value.clone())
    }
}

/// A document reduced to what the index stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    /// Named string attributes, e.g. "title" or "docid".
    pub attributes: BTreeMap<String, String>,
    /// Scalar values for metadata columns.
    pub metadata: BTreeMap<String, NumericValue>,
    /// Terms inserted into the inverted (search) index.
    pub search_index: Vec<IndexTerm>,
    /// Terms inserted into the forward index.
    pub forward_index: Vec<IndexTerm>,
    /// Access tokens. Empty means no ACL entry.
    pub access: Vec<String>,
}

impl AnalyzedDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        AnalyzedDocument::default()
    }

    /// Set a string attribute.
    pub fn set_attribute<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) -> &mut Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a metadata value.
    pub fn set_metadata<N: Into<String>, V: Into<NumericValue>>(&mut self, name: N, value: V) -> &mut Self {
        self.metadata.insert(name.into(), value.into());
        self
    }

    /// Add a search index term occurrence.
    pub fn add_search_term<T: Into<String>, V: Into<String>>(
        &mut self,
        term_type: T,
        value: V,
        position: Position,
    ) -> &mut Self {
        self.search_index.push(IndexTerm {
            term_type: term_type.into(),
            value: value.into(),
            position,
        });
        self
    }

    /// Add a forward index term occurrence.
    pub fn add_forward_term<T: Into<String>, V: Into<String>>(
        &mut self,
        term_type: T,
        value: V,
        position: Position,
    ) -> &mut Self {
        self.forward_index.push(IndexTerm {
            term_type: term_type.into(),
            value: value.into(),
            position,
        });
        self
    }

    /// Grant access to a user.
    pub fn add_access<U: Into<String>>(&mut self, user: U) -> &mut Self {
        self.access.push(user.into());
        self
    }

    /// Convenience: index every whitespace separated token of `text` with type
    /// `term_type` in both the search and the forward index, positions from 1.
    pub fn add_text(&mut self, term_type: &str, text: &str) -> &mut Self {
        let start = self
            .search_index
            .iter()
            .chain(self.forward_index.iter())
            .filter(|t| t.term_type == term_type)
            .map(|t| t.position)
            .max()
            .unwrap_or(0);
        for (idx, token) in text.split_whitespace().enumerate() {
            let pos = start.saturating_add(idx as Position).saturating_add(1);
            self.add_search_term(term_type, token, pos);
            self.add_forward_term(term_type, token, pos);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_compare() {
        assert_eq!(
            NumericValue::Int(3).compare(&NumericValue::UInt(3)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            NumericValue::Float(2.5).compare(&NumericValue::Int(3)),
            Some(Ordering::Less)
        );
        assert_eq!(NumericValue::Float(4.0).as_i64(), Some(4));
        assert_eq!(NumericValue::Float(4.5).as_i64(), None);
    }

    #[test]
    fn test_add_text_positions() {
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", "2 2 2");
        doc.add_text("word", "3");

        let positions: Vec<Position> = doc.search_index.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
        assert_eq!(doc.forward_index.len(), 4);
        assert_eq!(doc.forward_index[3].value, "3");
    }
}
