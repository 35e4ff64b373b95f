//! Immutable committed index state and reader leases.
//!
//! A [`Snapshot`] is never modified after publication. A commit clones the
//! current snapshot, applies its operations to the clone and publishes the
//! result atomically. Documents, posting lists and the id map are
//! structurally shared, so the copy made by a commit is proportional to what
//! the commit changes. Readers keep
//! the snapshot they opened alive through a [`SnapshotView`], which also
//! registers the snapshot generation so that deleted document numbers are not
//! reused while an older reader might still see them.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::acl::AccessIndex;
use crate::index::docid::DocIdMap;
use crate::index::document::AnalyzedDocument;
use crate::index::forward::StoredDocument;
use crate::index::metadata::{MetaDataCommand, MetaDataSchema, MetaDataTable};
use crate::index::posting::PostingList;
use crate::index::types::{DocNo, SharedMap, Term};
use crate::statistics::TimeStamp;

/// A resolved write operation, as recorded in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexOperation {
    /// Insert a document under a fixed number, replacing a previous version.
    Insert {
        docno: DocNo,
        docid: String,
        document: AnalyzedDocument,
    },
    /// Delete a document.
    Delete { docid: String },
    /// Remove a user from all access control lists.
    DeleteUser { user: String },
    /// Replace the (empty) metadata table.
    DefineMetaData { schema: MetaDataSchema },
    /// Migrate the metadata table.
    AlterMetaData { commands: Vec<MetaDataCommand> },
}

/// Committed state of a storage.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) timestamp: TimeStamp,
    pub(crate) acl_enabled: bool,
    pub(crate) docids: Arc<DocIdMap>,
    pub(crate) documents: SharedMap<DocNo, Arc<StoredDocument>>,
    pub(crate) postings: SharedMap<Term, Arc<PostingList>>,
    pub(crate) metadata: MetaDataTable,
    pub(crate) acl: AccessIndex,
}

impl Snapshot {
    /// An empty snapshot.
    pub fn empty(schema: MetaDataSchema, acl_enabled: bool) -> Self {
        Snapshot {
            generation: 0,
            timestamp: TimeStamp::default(),
            acl_enabled,
            docids: Arc::new(DocIdMap::new()),
            documents: SharedMap::default(),
            postings: SharedMap::default(),
            metadata: MetaDataTable::new(schema),
            acl: AccessIndex::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Timestamp of the commit that produced this snapshot.
    pub fn timestamp(&self) -> TimeStamp {
        self.timestamp
    }

    pub fn acl_enabled(&self) -> bool {
        self.acl_enabled
    }

    pub fn nof_documents(&self) -> usize {
        self.docids.len()
    }

    pub fn max_docno(&self) -> DocNo {
        self.docids.max_docno()
    }

    pub fn docno(&self, docid: &str) -> Option<DocNo> {
        self.docids.docno(docid)
    }

    pub fn docid(&self, docno: DocNo) -> Option<&str> {
        self.docids.docid(docno)
    }

    pub fn document(&self, docno: DocNo) -> Option<&StoredDocument> {
        self.documents.get(&docno).map(Arc::as_ref)
    }

    pub fn postings(&self, term: &Term) -> Option<Arc<PostingList>> {
        self.postings.get(term).cloned()
    }

    pub fn document_frequency(&self, term: &Term) -> usize {
        self.postings
            .get(term)
            .map(|p| p.document_frequency())
            .unwrap_or(0)
    }

    pub fn metadata(&self) -> &MetaDataTable {
        &self.metadata
    }

    pub fn access(&self) -> &AccessIndex {
        &self.acl
    }

    /// Distinct search index term types, sorted.
    pub fn term_types(&self) -> Vec<String> {
        let types: BTreeSet<&str> = self.postings.keys().map(|t| t.term_type.as_str()).collect();
        types.into_iter().map(str::to_string).collect()
    }

    /// All search index terms with their document frequency, sorted.
    pub fn term_statistics(&self) -> Vec<(Term, usize)> {
        let mut terms: Vec<(Term, usize)> = self
            .postings
            .iter()
            .map(|(t, p)| (t.clone(), p.document_frequency()))
            .collect();
        terms.sort();
        terms
    }

    /// Apply one operation. On error the snapshot may be partially modified;
    /// callers work on a private clone and discard it.
    pub fn apply(&mut self, operation: &IndexOperation, touched: &mut BTreeSet<Term>) -> Result<()> {
        match operation {
            IndexOperation::Insert {
                docno,
                docid,
                document,
            } => self.insert_document(*docno, docid, document, touched),
            IndexOperation::Delete { docid } => {
                let docno = self.docids.docno(docid).ok_or_else(|| {
                    QuarryError::transaction(format!("document '{docid}' does not exist"))
                })?;
                self.remove_document_data(docno, touched);
                Arc::make_mut(&mut self.docids).remove(docid, self.generation);
                Ok(())
            }
            IndexOperation::DeleteUser { user } => {
                for docno in self.acl.remove_user(user) {
                    if let Some(doc) = self.documents.get_mut(&docno) {
                        Arc::make_mut(doc).access.retain(|u| u != user);
                    }
                }
                Ok(())
            }
            IndexOperation::DefineMetaData { schema } => {
                if !self.docids.is_empty() {
                    return Err(QuarryError::transaction(
                        "metadata table can only be defined while the storage is empty",
                    ));
                }
                self.metadata = MetaDataTable::new(schema.clone());
                Ok(())
            }
            IndexOperation::AlterMetaData { commands } => {
                self.metadata = self.metadata.alter(commands, self.max_docno())?;
                Ok(())
            }
        }
    }

    fn insert_document(
        &mut self,
        docno: DocNo,
        docid: &str,
        document: &AnalyzedDocument,
        touched: &mut BTreeSet<Term>,
    ) -> Result<()> {
        let record = self.metadata.schema().build_record(document)?;
        if let Some(existing) = self.docids.docno(docid) {
            if existing != docno {
                return Err(QuarryError::transaction(format!(
                    "document '{docid}' is mapped to {existing}, not {docno}"
                )));
            }
            self.remove_document_data(docno, touched);
        }
        Arc::make_mut(&mut self.docids).insert(docid, docno);

        let stored = StoredDocument::from_document(docid, document, self.acl_enabled);
        for (term, positions) in &stored.search {
            match self.postings.get_mut(term) {
                Some(list) => Arc::make_mut(list).insert(docno, positions.clone()),
                None => {
                    let mut list = PostingList::new();
                    list.insert(docno, positions.clone());
                    self.postings.insert(term.clone(), Arc::new(list));
                }
            }
            touched.insert(term.clone());
        }
        self.acl.grant(docno, &stored.access);
        self.metadata.set_record(docno, &record);
        self.documents.insert(docno, Arc::new(stored));
        Ok(())
    }

    fn remove_document_data(&mut self, docno: DocNo, touched: &mut BTreeSet<Term>) {
        let Some(stored) = self.documents.remove(&docno) else {
            return;
        };
        for term in stored.search.keys() {
            let now_empty = match self.postings.get_mut(term) {
                Some(list) => {
                    Arc::make_mut(list).remove(docno);
                    list.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.postings.remove(term);
            }
            touched.insert(term.clone());
        }
        self.acl.revoke(docno, &stored.access);
        self.metadata.clear_record(docno);
    }

    /// Rebuild the access index from stored documents.
    pub(crate) fn rebuild_access(&mut self) {
        let mut acl = AccessIndex::new();
        for (&docno, doc) in &self.documents {
            acl.grant(docno, &doc.access);
        }
        self.acl = acl;
    }
}

/// Tracks which snapshot generations have open readers.
#[derive(Debug, Default)]
pub struct ReaderRegistry {
    open: Mutex<BTreeMap<u64, usize>>,
}

impl ReaderRegistry {
    pub fn new() -> Self {
        ReaderRegistry::default()
    }

    fn acquire(&self, generation: u64) {
        *self.open.lock().entry(generation).or_insert(0) += 1;
    }

    fn release(&self, generation: u64) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                open.remove(&generation);
            }
        }
    }

    /// Generation of the oldest open reader.
    pub fn oldest(&self) -> Option<u64> {
        self.open.lock().keys().next().copied()
    }

    /// Number of open readers.
    pub fn open_readers(&self) -> usize {
        self.open.lock().values().sum()
    }
}

/// A leased, read-only view of a snapshot.
#[derive(Debug)]
pub struct SnapshotView {
    snapshot: Arc<Snapshot>,
    registry: Arc<ReaderRegistry>,
}

impl SnapshotView {
    pub(crate) fn new(snapshot: Arc<Snapshot>, registry: Arc<ReaderRegistry>) -> Self {
        registry.acquire(snapshot.generation);
        SnapshotView { snapshot, registry }
    }
}

impl Clone for SnapshotView {
    fn clone(&self) -> Self {
        SnapshotView::new(Arc::clone(&self.snapshot), Arc::clone(&self.registry))
    }
}

impl Deref for SnapshotView {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.snapshot
    }
}

impl Drop for SnapshotView {
    fn drop(&mut self) {
        self.registry.release(self.snapshot.generation);
    }
}
