//! Posting iterators.
//!
//! Every node of a query expression compiles to a [`PostingIterator`]: a lazy
//! producer of matching documents and, inside the current document, of
//! matching positions. Leaf iterators walk a term's posting list; structural
//! iterators combine their children document by document and compute the
//! matches of a document only when they land on it.
//!
//! Document numbers and positions start at 1. A return value of 0 means
//! "no (further) match".

use std::fmt;

use crate::index::types::{DocNo, Position};

pub mod compile;
pub mod filter;
pub mod join;
pub mod structure;
pub mod term;

pub use compile::{collect_matches, compile};
pub use filter::{AccessIterator, DocFieldIterator, DocumentSetIterator, RestrictionIterator};
pub use join::{ContainsIterator, DiffIterator, IntersectIterator, UnionIterator};
pub use structure::{InsideIterator, SequenceIterator, WithinIterator};
pub use term::{EmptyIterator, TermIterator};

/// A match inside a document: start position and number of positions covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span {
    pub start: Position,
    pub length: u32,
}

impl Span {
    pub fn new(start: Position, length: u32) -> Self {
        Span { start, length }
    }

    /// First position after the span.
    pub fn end(&self) -> Position {
        self.start.saturating_add(self.length)
    }

    /// Whether `other` lies completely inside this span.
    pub fn encloses(&self, other: &Span) -> bool {
        self.start <= other.start && other.end() <= self.end()
    }
}

/// Iterator over the matches of an expression.
pub trait PostingIterator: Send + fmt::Debug {
    /// Move to the smallest matching document `>= docno` and return it, or 0
    /// if there is none.
    fn skip_doc(&mut self, docno: DocNo) -> DocNo;

    /// Move to the smallest match start `>= pos` in the current document and
    /// return it, or 0 if there is none.
    fn skip_pos(&mut self, pos: Position) -> Position;

    /// The current document, 0 before the first and after the last.
    fn docno(&self) -> DocNo;

    /// Start of the current match, 0 if there is none.
    fn posno(&self) -> Position;

    /// Number of positions covered by the current match.
    fn length(&self) -> u32 {
        1
    }

    /// Number of matches in the current document.
    fn frequency(&mut self) -> u32;

    /// Number of documents matching, exact for terms and estimated for
    /// structures.
    fn document_frequency(&self) -> usize;

    /// All matches of the current document.
    fn spans(&mut self) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut pos = self.skip_pos(1);
        while pos != 0 {
            spans.push(Span::new(pos, self.length()));
            pos = match pos.checked_add(1) {
                Some(next) => self.skip_pos(next),
                None => 0,
            };
        }
        spans
    }
}

/// Caches the outcome of the last `skip_doc` so that repeated or
/// non-advancing calls are answered without touching the children.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct DocState {
    target: DocNo,
    doc: DocNo,
    valid: bool,
}

impl DocState {
    pub(crate) fn lookup(&self, docno: DocNo) -> Option<DocNo> {
        if !self.valid || docno < self.target {
            return None;
        }
        if self.doc == 0 {
            return Some(0);
        }
        (docno <= self.doc).then_some(self.doc)
    }

    pub(crate) fn set(&mut self, target: DocNo, doc: DocNo) -> DocNo {
        self.target = target;
        self.doc = doc;
        self.valid = true;
        doc
    }

    pub(crate) fn doc(&self) -> DocNo {
        self.doc
    }
}

/// The matches of the current document with a cursor.
#[derive(Debug, Default, Clone)]
pub(crate) struct MatchList {
    spans: Vec<Span>,
    cursor: Option<usize>,
}

impl MatchList {
    pub(crate) fn reset(&mut self, spans: Vec<Span>) {
        self.spans = spans;
        self.cursor = None;
    }

    pub(crate) fn clear(&mut self) {
        self.reset(Vec::new());
    }

    pub(crate) fn skip(&mut self, pos: Position) -> Position {
        let pos = pos.max(1);
        let idx = self.spans.partition_point(|s| s.start < pos);
        if idx < self.spans.len() {
            self.cursor = Some(idx);
            self.spans[idx].start
        } else {
            self.cursor = None;
            0
        }
    }

    pub(crate) fn current(&self) -> Option<Span> {
        self.cursor.map(|idx| self.spans[idx])
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }

    pub(crate) fn spans(&self) -> &[Span] {
        &self.spans
    }
}

/// Sort spans by start, keeping the shortest span per start.
pub(crate) fn normalize(mut spans: Vec<Span>) -> Vec<Span> {
    spans.sort_unstable();
    spans.dedup_by_key(|s| s.start);
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_state_lookup() {
        let mut state = DocState::default();
        assert_eq!(state.lookup(1), None);
        state.set(3, 7);
        assert_eq!(state.lookup(3), Some(7));
        assert_eq!(state.lookup(7), Some(7));
        assert_eq!(state.lookup(8), None);
        assert_eq!(state.lookup(2), None);
        state.set(9, 0);
        assert_eq!(state.lookup(20), Some(0));
    }

    #[test]
    fn test_match_list_skip() {
        let mut list = MatchList::default();
        list.reset(normalize(vec![Span::new(5, 2), Span::new(2, 1), Span::new(5, 1)]));
        assert_eq!(list.spans(), &[Span::new(2, 1), Span::new(5, 1)]);
        assert_eq!(list.skip(0), 2);
        assert_eq!(list.skip(3), 5);
        assert_eq!(list.current(), Some(Span::new(5, 1)));
        assert_eq!(list.skip(6), 0);
        assert_eq!(list.current(), None);
    }
}
