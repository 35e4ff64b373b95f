//! Leaf iterators.

use std::sync::Arc;

use crate::index::posting::{Posting, PostingList};
use crate::index::types::{DocNo, Position, Term};
use crate::query::posting::PostingIterator;

/// Iterates the posting list of one term.
#[derive(Debug)]
pub struct TermIterator {
    term: Term,
    list: Arc<PostingList>,
    current: Option<Arc<Posting>>,
    doc: DocNo,
    pos_cursor: Option<usize>,
}

impl TermIterator {
    pub fn new(term: Term, list: Arc<PostingList>) -> Self {
        TermIterator {
            term,
            list,
            current: None,
            doc: 0,
            pos_cursor: None,
        }
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    fn positions(&self) -> &[Position] {
        match &self.current {
            Some(posting) => &posting.positions,
            None => &[],
        }
    }
}

impl PostingIterator for TermIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if self.doc == docno {
            return docno;
        }
        self.current = self.list.first_from(docno).cloned();
        self.pos_cursor = None;
        self.doc = self.current.as_ref().map_or(0, |posting| posting.docno);
        self.doc
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        let positions = self.positions();
        let idx = positions.partition_point(|&p| p < pos.max(1));
        if idx < positions.len() {
            let found = positions[idx];
            self.pos_cursor = Some(idx);
            found
        } else {
            self.pos_cursor = None;
            0
        }
    }

    fn docno(&self) -> DocNo {
        self.doc
    }

    fn posno(&self) -> Position {
        match self.pos_cursor {
            Some(idx) => self.positions()[idx],
            None => 0,
        }
    }

    fn frequency(&mut self) -> u32 {
        self.positions().len() as u32
    }

    fn document_frequency(&self) -> usize {
        self.list.document_frequency()
    }
}

/// Matches nothing.
#[derive(Debug, Default)]
pub struct EmptyIterator;

impl PostingIterator for EmptyIterator {
    fn skip_doc(&mut self, _docno: DocNo) -> DocNo {
        0
    }

    fn skip_pos(&mut self, _pos: Position) -> Position {
        0
    }

    fn docno(&self) -> DocNo {
        0
    }

    fn posno(&self) -> Position {
        0
    }

    fn frequency(&mut self) -> u32 {
        0
    }

    fn document_frequency(&self) -> usize {
        0
    }
}
