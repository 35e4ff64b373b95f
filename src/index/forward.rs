//! Stored per-document data: forward index, attributes and access tokens.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::index::document::AnalyzedDocument;
use crate::index::types::{Position, Term};

/// One forward index entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardEntry {
    pub position: Position,
    pub value: String,
}

/// What the index keeps of a document besides postings and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub docid: String,
    pub attributes: BTreeMap<String, String>,
    /// Forward index per term type, ordered by position. Entries with equal
    /// positions keep their insertion order.
    pub forward: BTreeMap<String, Vec<ForwardEntry>>,
    /// Search index terms with their positions, ascending.
    pub search: BTreeMap<Term, Vec<Position>>,
    /// Sorted, deduplicated access tokens.
    pub access: Vec<String>,
}

impl StoredDocument {
    /// Build the stored form of an analyzed document.
    pub fn from_document(docid: &str, doc: &AnalyzedDocument, keep_access: bool) -> Self {
        let mut forward: BTreeMap<String, Vec<ForwardEntry>> = BTreeMap::new();
        for term in &doc.forward_index {
            forward
                .entry(term.term_type.clone())
                .or_default()
                .push(ForwardEntry {
                    position: term.position,
                    value: term.value.clone(),
                });
        }
        for entries in forward.values_mut() {
            entries.sort_by_key(|e| e.position);
        }

        let mut search: BTreeMap<Term, Vec<Position>> = BTreeMap::new();
        for term in &doc.search_index {
            search.entry(term.term()).or_default().push(term.position);
        }
        for positions in search.values_mut() {
            positions.sort_unstable();
            positions.dedup();
        }

        let mut access = if keep_access {
            doc.access.clone()
        } else {
            Vec::new()
        };
        access.sort();
        access.dedup();

        StoredDocument {
            docid: docid.to_string(),
            attributes: doc.attributes.clone(),
            forward,
            search,
            access,
        }
    }

    /// Forward index entries of one term type.
    pub fn forward_terms(&self, term_type: &str) -> &[ForwardEntry] {
        self.forward
            .get(term_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Reconstruct the text between two positions (inclusive) of a term type.
    pub fn text_between(&self, term_type: &str, from: Position, to: Position) -> String {
        self.forward_terms(term_type)
            .iter()
            .filter(|e| e.position >= from && e.position <= to)
            .map(|e| e.value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_order_is_stable() {
        let mut doc = AnalyzedDocument::new();
        doc.add_forward_term("orig", "World", 2);
        doc.add_forward_term("orig", "Hello", 1);
        doc.add_forward_term("orig", "!", 2);
        doc.add_search_term("word", "hello", 1);
        doc.add_search_term("word", "hello", 1);
        doc.add_access("bob");
        doc.add_access("alice");
        doc.add_access("bob");

        let stored = StoredDocument::from_document("d1", &doc, true);
        let values: Vec<&str> = stored
            .forward_terms("orig")
            .iter()
            .map(|e| e.value.as_str())
            .collect();
        assert_eq!(values, vec!["Hello", "World", "!"]);
        assert_eq!(stored.search[&Term::new("word", "hello")], vec![1]);
        assert_eq!(stored.access, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(stored.text_between("orig", 1, 2), "Hello World !");

        let without_acl = StoredDocument::from_document("d1", &doc, false);
        assert!(without_acl.access.is_empty());
    }
}
