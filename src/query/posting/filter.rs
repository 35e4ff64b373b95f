//! Iterators driven by document metadata, access lists and fixed document
//! sets.

use crate::index::acl::DocumentList;
use crate::index::metadata::MetaDataTable;
use crate::index::types::{DocNo, Position};
use crate::query::posting::{DocState, MatchList, PostingIterator, Span};
use crate::query::restriction::CompiledRestriction;

/// A field of each document delimited by two metadata columns holding
/// positions. A document matches when its start column is not 0. An end of 0
/// leaves the field open up to the end of the document.
#[derive(Debug)]
pub struct DocFieldIterator {
    start: usize,
    end: usize,
    table: MetaDataTable,
    max_docno: DocNo,
    nof_documents: usize,
    state: DocState,
    matches: MatchList,
}

impl DocFieldIterator {
    /// Visits document numbers up to `max_docno`; `nof_documents` is reported
    /// as the document frequency.
    pub fn new(start: usize, end: usize, table: MetaDataTable, max_docno: DocNo, nof_documents: usize) -> Self {
        DocFieldIterator {
            start,
            end,
            table,
            max_docno,
            nof_documents,
            state: DocState::default(),
            matches: MatchList::default(),
        }
    }

    fn field(&self, docno: DocNo) -> Option<Span> {
        let start = position(&self.table, docno, self.start)?;
        match position(&self.table, docno, self.end) {
            None => Some(Span::new(start, Position::MAX - start)),
            Some(end) if end > start => Some(Span::new(start, end - start)),
            Some(_) => None,
        }
    }
}

fn position(table: &MetaDataTable, docno: DocNo, column: usize) -> Option<Position> {
    let value = table.get(docno, column).as_i64()?;
    (value > 0).then(|| Position::try_from(value).unwrap_or(Position::MAX))
}

impl PostingIterator for DocFieldIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        if let Some(doc) = self.state.lookup(docno) {
            return doc;
        }
        // Deleted documents have cleared metadata and never match.
        for doc in docno..=self.max_docno {
            if let Some(span) = self.field(doc) {
                self.matches.reset(vec![span]);
                return self.state.set(docno, doc);
            }
        }
        self.matches.clear();
        self.state.set(docno, 0)
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
        self.nof_documents
    }
}

/// Documents visible to at least one of a group of users. Steps through the
/// per-user access sets without merging them.
#[derive(Debug)]
pub struct AccessIterator {
    lists: Vec<DocumentList>,
    doc: DocNo,
}

impl AccessIterator {
    pub fn new(lists: Vec<DocumentList>) -> Self {
        AccessIterator { lists, doc: 0 }
    }
}

impl PostingIterator for AccessIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        self.doc = self
            .lists
            .iter()
            .filter_map(|list| list.range(docno..).next())
            .copied()
            .min()
            .unwrap_or(0);
        self.doc
    }

    fn skip_pos(&mut self, _pos: Position) -> Position {
        0
    }

    fn docno(&self) -> DocNo {
        self.doc
    }

    fn posno(&self) -> Position {
        0
    }

    fn frequency(&mut self) -> u32 {
        0
    }

    fn document_frequency(&self) -> usize {
        self.lists.iter().map(|list| list.len()).max().unwrap_or(0)
    }
}

/// A fixed set of documents without positions.
#[derive(Debug)]
pub struct DocumentSetIterator {
    docnos: Vec<DocNo>,
    cursor: usize,
    doc: DocNo,
}

impl DocumentSetIterator {
    pub fn new(mut docnos: Vec<DocNo>) -> Self {
        docnos.sort_unstable();
        docnos.dedup();
        docnos.retain(|&d| d != 0);
        DocumentSetIterator {
            docnos,
            cursor: 0,
            doc: 0,
        }
    }
}

impl PostingIterator for DocumentSetIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let docno = docno.max(1);
        self.cursor = self.docnos.partition_point(|&d| d < docno);
        self.doc = self.docnos.get(self.cursor).copied().unwrap_or(0);
        self.doc
    }

    fn skip_pos(&mut self, _pos: Position) -> Position {
        0
    }

    fn docno(&self) -> DocNo {
        self.doc
    }

    fn posno(&self) -> Position {
        0
    }

    fn frequency(&mut self) -> u32 {
        0
    }

    fn document_frequency(&self) -> usize {
        self.docnos.len()
    }
}

/// Passes through the documents of `inner` whose metadata satisfies a
/// restriction.
#[derive(Debug)]
pub struct RestrictionIterator {
    inner: Box<dyn PostingIterator>,
    table: MetaDataTable,
    restriction: CompiledRestriction,
}

impl RestrictionIterator {
    pub fn new(inner: Box<dyn PostingIterator>, table: MetaDataTable, restriction: CompiledRestriction) -> Self {
        RestrictionIterator {
            inner,
            table,
            restriction,
        }
    }
}

impl PostingIterator for RestrictionIterator {
    fn skip_doc(&mut self, docno: DocNo) -> DocNo {
        let mut target = docno.max(1);
        loop {
            let doc = self.inner.skip_doc(target);
            if doc == 0 || self.restriction.matches(&self.table, doc) {
                return doc;
            }
            target = doc + 1;
        }
    }

    fn skip_pos(&mut self, pos: Position) -> Position {
        self.inner.skip_pos(pos)
    }

    fn docno(&self) -> DocNo {
        self.inner.docno()
    }

    fn posno(&self) -> Position {
        self.inner.posno()
    }

    fn length(&self) -> u32 {
        self.inner.length()
    }

    fn frequency(&mut self) -> u32 {
        self.inner.frequency()
    }

    fn document_frequency(&self) -> usize {
        self.inner.document_frequency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document::AnalyzedDocument;
    use crate::index::metadata::MetaDataSchema;
    use crate::query::restriction::{CompareOperator, MetaDataRestriction};

    fn table() -> MetaDataTable {
        let schema: MetaDataSchema = "title_start UINT16, title_end UINT16".parse().unwrap();
        let mut table = MetaDataTable::new(schema.clone());
        for (docno, start, end) in [(1u32, 2u32, 5u32), (2, 0, 0), (3, 4, 0), (4, 6, 6)] {
            let mut doc = AnalyzedDocument::new();
            doc.set_metadata("title_start", start).set_metadata("title_end", end);
            table.set_record(docno, &schema.build_record(&doc).unwrap());
        }
        table
    }

    #[test]
    fn test_docfield() {
        let mut it = DocFieldIterator::new(0, 1, table(), 5, 4);
        assert_eq!(it.skip_doc(1), 1);
        assert_eq!(it.spans(), vec![Span::new(2, 3)]);
        assert_eq!(it.skip_doc(2), 3);
        assert_eq!(it.skip_pos(1), 4);
        assert_eq!(it.length(), Position::MAX - 4);
        // An empty field does not match, nor does a number without a record.
        assert_eq!(it.skip_doc(4), 0);
        assert_eq!(it.document_frequency(), 4);
    }

    #[test]
    fn test_access_lists() {
        let list = |docs: &[DocNo]| docs.iter().copied().collect::<DocumentList>();
        let mut it = AccessIterator::new(vec![list(&[2, 9]), list(&[4, 5, 9])]);
        assert_eq!(it.skip_doc(1), 2);
        assert_eq!(it.skip_doc(3), 4);
        assert_eq!(it.skip_doc(6), 9);
        assert_eq!(it.skip_doc(10), 0);
        assert_eq!(it.skip_doc(2), 2);
        assert_eq!(it.document_frequency(), 3);

        let mut nobody = AccessIterator::new(Vec::new());
        assert_eq!(nobody.skip_doc(1), 0);
    }

    #[test]
    fn test_document_set() {
        let mut it = DocumentSetIterator::new(vec![7, 3, 3, 0]);
        assert_eq!(it.skip_doc(1), 3);
        assert_eq!(it.skip_doc(4), 7);
        assert_eq!(it.skip_doc(8), 0);
        assert_eq!(it.skip_doc(2), 3);
        assert_eq!(it.document_frequency(), 2);
    }

    #[test]
    fn test_restriction() {
        let table = table();
        let mut restriction = MetaDataRestriction::new();
        restriction.add_condition(CompareOperator::Greater, "title_start", 3u32.into(), true);
        let compiled = restriction.compile(table.schema()).unwrap();
        let inner = Box::new(DocumentSetIterator::new(vec![1, 2, 3, 4]));
        let mut it = RestrictionIterator::new(inner, table, compiled);
        assert_eq!(it.skip_doc(1), 3);
        assert_eq!(it.skip_doc(4), 4);
        assert_eq!(it.skip_doc(5), 0);
    }
}
