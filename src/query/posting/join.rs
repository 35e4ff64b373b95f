//! Boolean joins: union, intersection, difference and cardinality containment.

use crate::index::types::{DocNo, Position};
use crate::query::posting::{DocState, MatchList, PostingIterator, Span, normalize};

/// Children of a join together with the document each one is positioned on.
#[derive(Debug)]
pub(crate) struct ChildCursors {
    children: Vec<Box<dyn PostingIterator>>,
    docs: Vec<DocNo>,
    ended: Vec<bool>,
    target: DocNo,
}

impl ChildCursors {
    pub(crate) fn new(children: Vec<Box<dyn PostingIterator>>) -> Self {
        let n = children.len();
        ChildCursors {
            children,
            docs: vec![0; n],
            ended: vec![false; n],
            target: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }

    pub(crate) fn child(&mut self, idx: usize) -> &mut dyn PostingIterator {
        self.children[idx].as_mut()
    }

    pub(crate) fn children(&self) -> &[Box<dyn PostingIterator>] {
        &self.children
    }

    /// Bring every child to its first document `>= docno` and return the
    /// smallest of them, 0 if all children are exhausted.
    pub(crate) fn advance_any(&mut self, docno: DocNo) -> DocNo {
        if docno < self.target {
            self.docs.iter_mut().for_each(|d| *d = 0);
            self.ended.iter_mut().for_each(|e| *e = false);
        }
        self.target = docno;
        let mut min = 0;
        for idx in 0..self.children.len() {
            if self.ended[idx] {
                continue;
            }
            if self.docs[idx] < docno {
                let doc = self.children[idx].skip_doc(docno);
                if doc == 0 {
                    self.ended[idx] = true;
                    self.docs[idx] = 0;
                    continue;
                }
                self.docs[idx] = doc;
            }
            if min == 0 || self.docs[idx] < min {
                min = self.docs[idx];
            }
        }
        min
    }

    /// Children positioned on `docno` after [`ChildCursors::advance_any`].
    pub(crate) fn on_doc(&self, docno: DocNo) -> Vec<usize> {
        (0..self.children.len())
            .filter(|&idx| !self.ended[idx] && self.docs[idx] == docno)
            .collect()
    }

    /// Smallest document `>= docno` containing all children, 0 if none.
    pub(crate) fn advance_all(&mut self, docno: DocNo) -> DocNo {
        if self.children.is_empty() {
            return 0;
        }
        let mut target = docno;
        'outer: loop {
            for child in self.children.iter_mut() {
                let doc = child.skip_doc(target);
                if doc == 0 {
                    return 0;
                }
                if doc > target {
                    target = doc;
                    continue 'outer;
                }
            }
            return target;
        }
    }
}

/// Matches of any child.
#[derive(Debug)]
pub struct UnionIterator {
    cursors: ChildCursors,
    state: DocState,
    matches: MatchList,
}

impl UnionIterator {
    pub fn new(children: Vec<Box<dyn PostingIterator>>) -> Self {
        UnionIterator {
            cursors: ChildCursors::new(children),
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for UnionIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if let Some(doc) = self.state.lookup(docno) {
            return doc;
        }
        let doc = self.cursors.advance_any(docno);
        let mut spans = Vec::new();
        for idx in self.cursors.on_doc(doc) {
            spans.extend(self.cursors.child(idx).spans());
        }
        self.matches.reset(normalize(spans));
        self.state.set(docno, doc)
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        self.matches.skip(pos)
    }

    fn docno(&self) -> DocNo {
        self.state.doc()
    }

    fn posno(&self) -> Position {
        self.matches.current().map(|s| s.start).unwrap_or(0)
    }

    fn length(&self) -> u32 {
        self.matches.current().map(|s| s.length).unwrap_or(0)
    }

    fn frequency(&mut self) -> u32 {
        self.matches.len() as u32
    }

    fn document_frequency(&self) -> usize {
        self.cursors
            .children()
            .iter()
            .map(|c| c.document_frequency())
            .sum()
    }
}

/// Positions occurring in every child.
#[derive(Debug)]
pub struct IntersectIterator {
    cursors: ChildCursors,
    state: DocState,
    matches: MatchList,
}

impl IntersectIterator {
    pub fn new(children: Vec<Box<dyn PostingIterator>>) -> Self {
        IntersectIterator {
            cursors: ChildCursors::new(children),
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for IntersectIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if let Some(doc) = self.state.lookup(docno) {
            return doc;
        }
        let mut target = docno;
        loop {
            let doc = self.cursors.advance_all(target);
            if doc == 0 {
                self.matches.clear();
                return self.state.set(docno, 0);
            }
            let mut common: Option<Vec<Span>> = None;
            for idx in 0..self.cursors.len() {
                let spans = self.cursors.child(idx).spans();
                common = Some(match common {
                    None => spans,
                    Some(prev) => prev
                        .into_iter()
                        .filter(|s| spans.iter().any(|o| o.start == s.start))
                        .collect(),
                });
            }
            let spans = common.unwrap_or_default();
            if !spans.is_empty() {
                self.matches.reset(normalize(spans));
                return self.state.set(docno, doc);
            }
            target = doc + 1;
        }
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        self.matches.skip(pos)
    }

    fn docno(&self) -> DocNo {
        self.state.doc()
    }

    fn posno(&self) -> Position {
        self.matches.current().map(|s| s.start).unwrap_or(0)
    }

    fn length(&self) -> u32 {
        self.matches.current().map(|s| s.length).unwrap_or(0)
    }

    fn frequency(&mut self) -> u32 {
        self.matches.len() as u32
    }

    fn document_frequency(&self) -> usize {
        self.cursors
            .children()
            .iter()
            .map(|c| c.document_frequency())
            .min()
            .unwrap_or(0)
    }
}

/// Positions of the first child that are not positions of the second.
#[derive(Debug)]
pub struct DiffIterator {
    positive: Box<dyn PostingIterator>,
    negative: Box<dyn PostingIterator>,
    state: DocState,
    matches: MatchList,
}

impl DiffIterator {
    pub fn new(positive: Box<dyn PostingIterator>, negative: Box<dyn PostingIterator>) -> Self {
        DiffIterator {
            positive,
            negative,
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for DiffIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if let Some(doc) = self.state.lookup(docno) {
            return doc;
        }
        let mut target = docno;
        loop {
            let doc = self.positive.skip_doc(target);
            if doc == 0 {
                self.matches.clear();
                return self.state.set(docno, 0);
            }
            let mut spans = self.positive.spans();
            if self.negative.skip_doc(doc) == doc {
                let excluded = self.negative.spans();
                spans.retain(|s| !excluded.iter().any(|e| e.start == s.start));
            }
            if !spans.is_empty() {
                self.matches.reset(spans);
                return self.state.set(docno, doc);
            }
            target = doc + 1;
        }
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        self.matches.skip(pos)
    }

    fn docno(&self) -> DocNo {
        self.state.doc()
    }

    fn posno(&self) -> Position {
        self.matches.current().map(|s| s.start).unwrap_or(0)
    }

    fn length(&self) -> u32 {
        self.matches.current().map(|s| s.length).unwrap_or(0)
    }

    fn frequency(&mut self) -> u32 {
        self.matches.len() as u32
    }

    fn document_frequency(&self) -> usize {
        self.positive.document_frequency()
    }
}

/// Documents in which at least `cardinality` children occur, in any order and
/// at any position. Cardinality 0 means any one child. Each child counts on
/// its own, even if two children match the same term occurrence.
#[derive(Debug)]
pub struct ContainsIterator {
    cursors: ChildCursors,
    cardinality: usize,
    state: DocState,
    matches: MatchList,
}

impl ContainsIterator {
    pub fn new(cardinality: usize, children: Vec<Box<dyn PostingIterator>>) -> Self {
        ContainsIterator {
            cursors: ChildCursors::new(children),
            cardinality: cardinality.max(1),
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for ContainsIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if let Some(doc) = self.state.lookup(docno) {
            return doc;
        }
        let mut target = docno;
        loop {
            let doc = self.cursors.advance_any(target);
            if doc == 0 {
                self.matches.clear();
                return self.state.set(docno, 0);
            }
            let present = self.cursors.on_doc(doc);
            if present.len() >= self.cardinality {
                let mut spans = Vec::new();
                for idx in present {
                    spans.extend(self.cursors.child(idx).spans());
                }
                self.matches.reset(normalize(spans));
                return self.state.set(docno, doc);
            }
            target = doc + 1;
        }
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        self.matches.skip(pos)
    }

    fn docno(&self) -> DocNo {
        self.state.doc()
    }

    fn posno(&self) -> Position {
        self.matches.current().map(|s| s.start).unwrap_or(0)
    }

    fn length(&self) -> u32 {
        self.matches.current().map(|s| s.length).unwrap_or(0)
    }

    fn frequency(&mut self) -> u32 {
        self.matches.len() as u32
    }

    fn document_frequency(&self) -> usize {
        let mut dfs: Vec<usize> = self
            .cursors
            .children()
            .iter()
            .map(|c| c.document_frequency())
            .collect();
        dfs.sort_unstable_by(|a, b| b.cmp(a));
        // With cardinality c > 1 a match needs c children, so at most the
        // c-th largest child frequency of documents can match.
        if self.cardinality <= 1 {
            dfs.iter().sum()
        } else {
            dfs.get(self.cardinality - 1).copied().unwrap_or(0)
        }
    }
}
