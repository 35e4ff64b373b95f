//! Per-term posting lists.
//!
//! A posting list holds the documents containing a term in ascending document
//! number order, each with its ascending occurrence positions. On disk the
//! document numbers and positions are delta encoded as varints. In memory the
//! list is a persistent ordered map: a modified copy shares everything but
//! the path to the changed posting with its origin.

use std::io::{Read, Write};
use std::sync::Arc;

use imbl::OrdMap;

use crate::error::{QuarryError, Result};
use crate::index::types::{DocNo, Position};
use crate::storage::structured::{StructReader, StructWriter};

/// A single posting: one document and the term's positions in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub docno: DocNo,
    pub positions: Vec<Position>,
}

impl Posting {
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// The posting list of one term.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingList {
    postings: OrdMap<DocNo, Arc<Posting>>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList::default()
    }

    /// Number of documents containing the term.
    pub fn document_frequency(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.values().map(Arc::as_ref)
    }

    /// The first posting with `docno >= target`.
    pub fn first_from(&self, target: DocNo) -> Option<&Arc<Posting>> {
        self.postings.range(target..).next().map(|(_, posting)| posting)
    }

    pub fn get(&self, docno: DocNo) -> Option<&Posting> {
        self.postings.get(&docno).map(Arc::as_ref)
    }

    /// Insert or replace the posting of a document. Positions are sorted and
    /// deduplicated.
    pub fn insert(&mut self, docno: DocNo, mut positions: Vec<Position>) {
        positions.sort_unstable();
        positions.dedup();
        self.postings.insert(docno, Arc::new(Posting { docno, positions }));
    }

    /// Remove the posting of a document, returning whether it existed.
    pub fn remove(&mut self, docno: DocNo) -> bool {
        self.postings.remove(&docno).is_some()
    }

    /// Encode the posting list.
    pub fn encode<W: Write>(&self, writer: &mut StructWriter<W>) -> Result<()> {
        writer.write_varint(self.postings.len() as u64)?;
        let mut prev_docno = 0u32;
        for posting in self.iter() {
            writer.write_varint((posting.docno - prev_docno) as u64)?;
            prev_docno = posting.docno;
            writer.write_ascending_u32s(&posting.positions)?;
        }
        Ok(())
    }

    /// Decode a posting list.
    pub fn decode<R: Read>(reader: &mut StructReader<R>) -> Result<Self> {
        let count = reader.read_varint()? as usize;
        let mut postings = Vec::with_capacity(count.min(1 << 16));
        let mut prev_docno = 0u32;
        for _ in 0..count {
            let delta = reader.read_varint()? as u32;
            if delta == 0 {
                return Err(QuarryError::serialization(
                    "posting list document numbers not ascending",
                ));
            }
            let docno = prev_docno + delta;
            prev_docno = docno;
            let positions = reader.read_ascending_u32s()?;
            postings.push(Posting { docno, positions });
        }
        Ok(PostingList {
            postings: postings.into_iter().map(|p| (p.docno, Arc::new(p))).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_insert_sorted_and_replace() {
        let mut list = PostingList::new();
        list.insert(5, vec![3, 1]);
        list.insert(2, vec![7]);
        list.insert(5, vec![4, 4, 2]);

        let docs: Vec<DocNo> = list.iter().map(|p| p.docno).collect();
        assert_eq!(docs, vec![2, 5]);
        assert_eq!(list.get(5).unwrap().positions, vec![2, 4]);
        assert_eq!(list.document_frequency(), 2);

        assert!(list.remove(2));
        assert!(!list.remove(2));
        assert_eq!(list.document_frequency(), 1);
    }

    #[test]
    fn test_seek() {
        let mut list = PostingList::new();
        for docno in [1, 4, 9] {
            list.insert(docno, vec![1]);
        }
        assert_eq!(list.first_from(4).map(|p| p.docno), Some(4));
        assert_eq!(list.first_from(5).map(|p| p.docno), Some(9));
        assert_eq!(list.first_from(0).map(|p| p.docno), Some(1));
        assert!(list.first_from(10).is_none());
    }

    #[test]
    fn test_clone_is_isolated() {
        let mut base = PostingList::new();
        for docno in 1..=500 {
            base.insert(docno, vec![1]);
        }
        let mut next = base.clone();
        next.remove(10);
        next.insert(600, vec![2]);
        assert_eq!(base.document_frequency(), 500);
        assert!(base.get(10).is_some());
        assert!(base.get(600).is_none());
        assert_eq!(next.document_frequency(), 500);
        assert_eq!(next.first_from(10).map(|p| p.docno), Some(11));
    }

    #[test]
    fn test_encode_decode() {
        let mut list = PostingList::new();
        list.insert(3, vec![1, 5, 6]);
        list.insert(10, vec![2]);

        let mut writer = StructWriter::new(Vec::new());
        list.encode(&mut writer).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = StructReader::new(io::Cursor::new(bytes));
        let decoded = PostingList::decode(&mut reader).unwrap();
        assert!(reader.verify_checksum().unwrap());
        assert_eq!(decoded, list);
    }
}
