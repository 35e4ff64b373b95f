//! Bidirectional mapping between document ids and document numbers.
//!
//! Numbers are dense and start at 1. A number freed by a deletion is parked
//! together with the snapshot generation that deleted it and only becomes
//! reusable once no reader of an older generation is still open.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::index::types::{DocNo, SharedMap};

/// The document identifier map.
#[derive(Debug, Clone, Default)]
pub struct DocIdMap {
    by_id: SharedMap<String, DocNo>,
    by_no: SharedMap<DocNo, String>,
    free: BTreeSet<DocNo>,
    pending: Vec<(u64, DocNo)>,
    next: DocNo,
}

/// Serializable form used by checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocIdMapImage {
    pub entries: Vec<(String, DocNo)>,
    pub free: Vec<DocNo>,
    pub next: DocNo,
}

impl DocIdMap {
    pub fn new() -> Self {
        DocIdMap {
            next: 1,
            ..Default::default()
        }
    }

    /// Number of mapped documents.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Largest number ever handed out.
    pub fn max_docno(&self) -> DocNo {
        self.next.saturating_sub(1)
    }

    pub fn docno(&self, docid: &str) -> Option<DocNo> {
        self.by_id.get(docid).copied()
    }

    pub fn docid(&self, docno: DocNo) -> Option<&str> {
        self.by_no.get(&docno).map(String::as_str)
    }

    /// Assign a number to a new document id: the smallest reclaimed number if
    /// any, a fresh one otherwise.
    pub fn allocate(&mut self, docid: &str) -> DocNo {
        if let Some(docno) = self.docno(docid) {
            return docno;
        }
        let docno = match self.free.pop_first() {
            Some(docno) => docno,
            None => {
                let docno = self.next;
                self.next += 1;
                docno
            }
        };
        self.insert(docid, docno);
        docno
    }

    /// Map `docid` to an explicitly chosen number (journal replay).
    pub fn insert(&mut self, docid: &str, docno: DocNo) {
        self.free.remove(&docno);
        if docno >= self.next {
            for skipped in self.next..docno {
                self.free.insert(skipped);
            }
            self.next = docno + 1;
        }
        self.by_id.insert(docid.to_string(), docno);
        self.by_no.insert(docno, docid.to_string());
    }

    /// Unmap a document. Its number is parked until [`DocIdMap::reclaim`]
    /// sees that no reader older than `generation` remains.
    pub fn remove(&mut self, docid: &str, generation: u64) -> Option<DocNo> {
        let docno = self.by_id.remove(docid)?;
        self.by_no.remove(&docno);
        self.pending.push((generation, docno));
        Some(docno)
    }

    /// Release parked numbers whose deleting generation is not newer than the
    /// oldest open reader (`None` when there is no open reader).
    pub fn reclaim(&mut self, oldest_reader: Option<u64>) -> usize {
        let before = self.pending.len();
        let mut kept = Vec::with_capacity(before);
        for (generation, docno) in self.pending.drain(..) {
            let releasable = match oldest_reader {
                Some(oldest) => oldest >= generation,
                None => true,
            };
            if releasable {
                self.free.insert(docno);
            } else {
                kept.push((generation, docno));
            }
        }
        self.pending = kept;
        before - self.pending.len()
    }

    /// Number of deleted document numbers not yet reusable.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Iterate over (docno, docid) in ascending document number order.
    pub fn iter_sorted(&self) -> Vec<(DocNo, &str)> {
        let mut entries: Vec<(DocNo, &str)> =
            self.by_no.iter().map(|(&no, id)| (no, id.as_str())).collect();
        entries.sort_unstable_by_key(|(no, _)| *no);
        entries
    }

    /// Snapshot image. Parked numbers are written as free: after a restart no
    /// reader can still reference them.
    pub fn image(&self) -> DocIdMapImage {
        let mut free: Vec<DocNo> = self.free.iter().copied().collect();
        free.extend(self.pending.iter().map(|(_, no)| *no));
        free.sort_unstable();
        DocIdMapImage {
            entries: self
                .iter_sorted()
                .into_iter()
                .map(|(no, id)| (id.to_string(), no))
                .collect(),
            free,
            next: self.next,
        }
    }

    pub fn from_image(image: DocIdMapImage) -> Self {
        let mut map = DocIdMap::new();
        for (docid, docno) in image.entries {
            map.by_id.insert(docid.clone(), docno);
            map.by_no.insert(docno, docid);
        }
        map.free = image.free.into_iter().collect();
        map.next = image.next.max(1);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_dense_numbers() {
        let mut map = DocIdMap::new();
        assert_eq!(map.allocate("a"), 1);
        assert_eq!(map.allocate("b"), 2);
        assert_eq!(map.allocate("a"), 1);
        assert_eq!(map.docid(2), Some("b"));
        assert_eq!(map.max_docno(), 2);
    }

    #[test]
    fn test_deferred_reuse() {
        let mut map = DocIdMap::new();
        map.allocate("a");
        map.allocate("b");
        assert_eq!(map.remove("a", 5), Some(1));

        // A reader opened on generation 4 still sees document 1.
        assert_eq!(map.reclaim(Some(4)), 0);
        assert_eq!(map.allocate("c"), 3);

        assert_eq!(map.reclaim(Some(5)), 1);
        assert_eq!(map.allocate("d"), 1);
        assert_eq!(map.pending_count(), 0);
    }

    #[test]
    fn test_explicit_insert_and_image() {
        let mut map = DocIdMap::new();
        map.insert("x", 3);
        assert_eq!(map.allocate("y"), 1);
        map.remove("x", 1);

        let restored = DocIdMap::from_image(map.image());
        assert_eq!(restored.docno("y"), Some(1));
        assert_eq!(restored.docno("x"), None);
        let mut restored = restored;
        assert_eq!(restored.allocate("z"), 2);
        assert_eq!(restored.allocate("w"), 3);
        assert_eq!(restored.allocate("v"), 4);
    }
}
