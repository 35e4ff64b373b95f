//! Positional joins: sequences, windows and containment in spans.

use crate::index::types::{DocNo, Position};
use crate::query::posting::join::ChildCursors;
use crate::query::posting::{DocState, MatchList, PostingIterator, Span, normalize};

/// Ordering constraint of a [`SequenceIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMode {
    /// Each element starts at or after the end of its predecessor and the
    /// last element starts at most `range` positions after the first.
    Ordered { range: u32 },
    /// Each element starts exactly at the end of its predecessor.
    Immediate,
}

fn delimited(delimiters: &[Span], span: &Span) -> bool {
    delimiters
        .iter()
        .any(|d| d.start >= span.start && d.start < span.end())
}

fn delimiter_spans(delimiter: &mut Option<Box<dyn PostingIterator>>, doc: DocNo) -> Vec<Span> {
    if let Some(it) = delimiter {
        if it.skip_doc(doc) == doc {
            return it.spans();
        }
    }
    Vec::new()
}

/// Matches of an ordered sequence, one per start of the first element.
pub(crate) fn sequence_spans(children: &[Vec<Span>], mode: SequenceMode, delimiters: &[Span]) -> Vec<Span> {
    let Some((head, tail)) = children.split_first() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    'first: for first in head {
        let mut prev = *first;
        for spans in tail {
            let next = match mode {
                SequenceMode::Immediate => spans.iter().find(|s| s.start == prev.end()),
                SequenceMode::Ordered { .. } => spans.iter().find(|s| s.start >= prev.end()),
            };
            match next {
                Some(span) => prev = *span,
                None => continue 'first,
            }
        }
        if let SequenceMode::Ordered { range } = mode {
            if prev.start.saturating_sub(first.start) > range {
                continue;
            }
        }
        let span = Span::new(first.start, prev.end().saturating_sub(first.start));
        if !delimited(delimiters, &span) {
            out.push(span);
        }
    }
    out
}

/// Matches of an unordered window: `need` of the children start within
/// `range` positions of the window start.
pub(crate) fn within_spans(children: &[Vec<Span>], range: u32, need: usize, delimiters: &[Span]) -> Vec<Span> {
    if need == 0 || children.len() < need {
        return Vec::new();
    }
    let mut starts: Vec<Position> = children.iter().flatten().map(|s| s.start).collect();
    starts.sort_unstable();
    starts.dedup();

    let mut out = Vec::new();
    for start in starts {
        let mut firsts: Vec<Span> = children
            .iter()
            .filter_map(|spans| spans.iter().find(|s| s.start >= start).copied())
            .collect();
        if firsts.len() < need {
            continue;
        }
        firsts.sort_unstable();
        let chosen = &firsts[..need];
        if chosen[need - 1].start.saturating_sub(start) > range {
            continue;
        }
        let end = chosen.iter().map(Span::end).max().unwrap_or(start.saturating_add(1));
        let span = Span::new(start, end.saturating_sub(start));
        if !delimited(delimiters, &span) {
            out.push(span);
        }
    }
    out
}

/// Ordered sequence of children, optionally bounded by a delimiter.
#[derive(Debug)]
pub struct SequenceIterator {
    cursors: ChildCursors,
    delimiter: Option<Box<dyn PostingIterator>>,
    mode: SequenceMode,
    state: DocState,
    matches: MatchList,
}

impl SequenceIterator {
    pub fn new(
        mode: SequenceMode,
        children: Vec<Box<dyn PostingIterator>>,
        delimiter: Option<Box<dyn PostingIterator>>,
    ) -> Self {
        SequenceIterator {
            cursors: ChildCursors::new(children),
            delimiter,
            mode,
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for SequenceIterator {
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
            let children: Vec<Vec<Span>> = (0..self.cursors.len())
                .map(|idx| self.cursors.child(idx).spans())
                .collect();
            let delimiters = delimiter_spans(&mut self.delimiter, doc);
            let spans = sequence_spans(&children, self.mode, &delimiters);
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

/// Unordered window over children, optionally bounded by a delimiter.
#[derive(Debug)]
pub struct WithinIterator {
    cursors: ChildCursors,
    delimiter: Option<Box<dyn PostingIterator>>,
    range: u32,
    need: usize,
    state: DocState,
    matches: MatchList,
}

impl WithinIterator {
    /// `cardinality` 0 requires all children.
    pub fn new(
        range: u32,
        cardinality: usize,
        children: Vec<Box<dyn PostingIterator>>,
        delimiter: Option<Box<dyn PostingIterator>>,
    ) -> Self {
        let need = if cardinality == 0 {
            children.len()
        } else {
            cardinality
        };
        WithinIterator {
            cursors: ChildCursors::new(children),
            delimiter,
            range,
            need,
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for WithinIterator {
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
            if present.len() >= self.need {
                let children: Vec<Vec<Span>> = present
                    .into_iter()
                    .map(|idx| self.cursors.child(idx).spans())
                    .collect();
                let delimiters = delimiter_spans(&mut self.delimiter, doc);
                let spans = within_spans(&children, self.range, self.need, &delimiters);
                if !spans.is_empty() {
                    self.matches.reset(spans);
                    return self.state.set(docno, doc);
                }
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
        dfs.get(self.need.saturating_sub(1)).copied().unwrap_or(0)
    }
}

/// Occurrences of `inner` that lie inside a span of `outer`.
#[derive(Debug)]
pub struct InsideIterator {
    cursors: ChildCursors,
    state: DocState,
    matches: MatchList,
}

impl InsideIterator {
    pub fn new(inner: Box<dyn PostingIterator>, outer: Box<dyn PostingIterator>) -> Self {
        InsideIterator {
            cursors: ChildCursors::new(vec![inner, outer]),
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }
}

impl PostingIterator for InsideIterator {
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
            let outer = self.cursors.child(1).spans();
            let spans: Vec<Span> = self
                .cursors
                .child(0)
                .spans()
                .into_iter()
                .filter(|s| outer.iter().any(|o| o.encloses(s)))
                .collect();
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
        self.cursors
            .children()
            .first()
            .map(|c| c.document_frequency())
            .unwrap_or(0)
    }
}
