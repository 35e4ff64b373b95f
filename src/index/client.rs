//! Storage lifecycle and the read API.
//!
//! A [`StorageClient`] owns one storage instance. Writers go through
//! [`Transaction`]s, which are serialized by the client; readers work on the
//! snapshot that is current when they ask. Every commit publishes a new
//! snapshot atomically, so a reader never observes a half-applied commit.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::error::{QuarryError, Result};
use crate::index::browser::DocumentBrowser;
use crate::index::config::IndexConfig;
use crate::index::document::NumericValue;
use crate::index::forward::ForwardEntry;
use crate::index::journal::{self, CommitRecord, Journal};
use crate::index::snapshot::{IndexOperation, ReaderRegistry, Snapshot, SnapshotView};
use crate::index::transaction::{CommitSummary, StagedOperation, Transaction};
use crate::index::types::{DocNo, Position, Term};
use crate::query::expression::Expression;
use crate::query::posting;
use crate::statistics::blob::BlobOrigin;
use crate::statistics::{DfChange, StatisticsHistory, StatisticsIterator, StatisticsRecord, TimeStamp};
use crate::storage::{self, Storage};

/// Name of the persisted configuration file.
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug)]
struct Writer {
    journal: Journal,
}

#[derive(Debug)]
pub(crate) struct StorageInner {
    config: IndexConfig,
    backend: Arc<dyn Storage>,
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<Writer>,
    readers: Arc<ReaderRegistry>,
    statistics: RwLock<StatisticsHistory>,
    closed: AtomicBool,
}

/// Handle to an open storage. Cloning is cheap and shares the instance.
#[derive(Debug, Clone)]
pub struct StorageClient {
    inner: Arc<StorageInner>,
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or_default()
}

fn config_exists(path: &Path) -> bool {
    path.join(CONFIG_FILE).is_file()
}

impl StorageClient {
    /// Create a new storage. Fails if a storage already exists at the path.
    pub fn create(config: IndexConfig) -> Result<StorageClient> {
        if let Some(path) = &config.path {
            if config_exists(path) {
                return Err(QuarryError::config(format!(
                    "storage already exists at {}",
                    path.display()
                )));
            }
        }
        let backend = storage::open_backend(config.path.as_deref())?;
        let mut output = backend.create_output(CONFIG_FILE)?;
        serde_json::to_writer_pretty(&mut output, &config)?;
        output.flush_and_sync()?;
        output.close()?;

        let (journal, _) = Journal::open(Arc::clone(&backend))?;
        let snapshot = Snapshot::empty(config.metadata.clone(), config.acl);
        info!("created storage {config}");
        let history = StatisticsHistory::new(config.statistics_history);
        Ok(StorageClient::assemble(config, backend, journal, snapshot, history))
    }

    /// Open an existing storage.
    ///
    /// The stored configuration wins over the given one, except for the
    /// cache size and the statistics history length. A non-empty metadata schema in `config` must match the
    /// schema of the storage.
    pub fn open(config: IndexConfig) -> Result<StorageClient> {
        let path = config
            .path
            .clone()
            .ok_or_else(|| QuarryError::config("opening a storage requires a path"))?;
        if !config_exists(&path) {
            return Err(QuarryError::config(format!(
                "storage does not exist at {}",
                path.display()
            )));
        }
        let backend = storage::open_backend(Some(&path))?;
        let stored: IndexConfig = serde_json::from_reader(backend.open_input(CONFIG_FILE)?)?;

        let (mut snapshot, mut history, horizon) = match journal::read_checkpoint(backend.as_ref(), stored.acl)? {
            Some(checkpoint) => (checkpoint.snapshot, checkpoint.statistics, checkpoint.statistics_horizon),
            None => (Snapshot::empty(stored.metadata.clone(), stored.acl), Vec::new(), None),
        };
        let (journal, records) = Journal::open(Arc::clone(&backend))?;
        let mut replayed = 0usize;
        for record in records {
            if record.generation <= snapshot.generation {
                continue;
            }
            snapshot.generation = record.generation;
            snapshot.timestamp = record.timestamp;
            let mut touched = BTreeSet::new();
            for operation in &record.operations {
                snapshot.apply(operation, &mut touched)?;
            }
            history.push(record.statistics);
            replayed += 1;
        }
        debug!(
            "opened storage at {} (generation {}, {} commits replayed)",
            path.display(),
            snapshot.generation,
            replayed
        );

        if !config.metadata.is_empty() && &config.metadata != snapshot.metadata.schema() {
            return Err(QuarryError::config(format!(
                "metadata schema '{}' does not match the storage schema '{}'",
                config.metadata,
                snapshot.metadata.schema()
            )));
        }

        let effective = IndexConfig {
            path: Some(path),
            cache_size: config.cache_size,
            statistics_history: config.statistics_history,
            metadata: snapshot.metadata.schema().clone(),
            ..stored
        };
        let history = StatisticsHistory::restore(effective.statistics_history, horizon, history);
        Ok(StorageClient::assemble(effective, backend, journal, snapshot, history))
    }

    /// Whether a storage exists for `config`. In-memory storages never do.
    pub fn exists(config: &IndexConfig) -> bool {
        config.path.as_deref().is_some_and(config_exists)
    }

    /// Delete a storage and all its files.
    pub fn destroy(config: &IndexConfig) -> Result<()> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| QuarryError::config("destroying a storage requires a path"))?;
        if !config_exists(path) {
            return Err(QuarryError::config(format!(
                "storage does not exist at {}",
                path.display()
            )));
        }
        fs::remove_dir_all(path)?;
        info!("destroyed storage at {}", path.display());
        Ok(())
    }

    fn assemble(
        config: IndexConfig,
        backend: Arc<dyn Storage>,
        journal: Journal,
        snapshot: Snapshot,
        statistics: StatisticsHistory,
    ) -> StorageClient {
        StorageClient {
            inner: Arc::new(StorageInner {
                config,
                backend,
                current: RwLock::new(Arc::new(snapshot)),
                writer: Mutex::new(Writer { journal }),
                readers: Arc::new(ReaderRegistry::new()),
                statistics: RwLock::new(statistics),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Release the storage. Further transactions fail; open snapshots stay
    /// readable.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let _writer = self.inner.writer.lock();
        self.inner.backend.sync()?;
        debug!("storage closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Start a new transaction.
    pub fn transaction(&self) -> Result<Transaction> {
        self.inner.ensure_open()?;
        Ok(Transaction::new(self.clone()))
    }

    /// Lease the current snapshot.
    pub fn snapshot(&self) -> SnapshotView {
        let current = Arc::clone(&self.inner.current.read());
        SnapshotView::new(current, Arc::clone(&self.inner.readers))
    }

    /// Browse the documents of the current snapshot.
    pub fn browser(&self) -> DocumentBrowser {
        DocumentBrowser::new(self.snapshot())
    }

    /// Effective configuration.
    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    /// Number of readers holding a snapshot lease.
    pub fn open_readers(&self) -> usize {
        self.inner.readers.open_readers()
    }

    pub fn nof_documents_inserted(&self) -> usize {
        self.snapshot().nof_documents()
    }

    pub fn max_document_number(&self) -> DocNo {
        self.snapshot().max_docno()
    }

    pub fn document_number(&self, docid: &str) -> Option<DocNo> {
        self.snapshot().docno(docid)
    }

    pub fn document_id(&self, docno: DocNo) -> Option<String> {
        self.snapshot().docid(docno).map(str::to_string)
    }

    pub fn document_frequency(&self, term: &Term) -> usize {
        self.snapshot().document_frequency(term)
    }

    pub fn term_types(&self) -> Vec<String> {
        self.snapshot().term_types()
    }

    /// Users appearing in any access control list.
    pub fn users(&self) -> Vec<String> {
        self.snapshot().access().users()
    }

    /// Evaluate an expression to its matches `(docno, positions)`.
    pub fn postings(&self, expression: &Expression) -> Result<Vec<(DocNo, Vec<Position>)>> {
        let snapshot = self.snapshot();
        let mut iterator = posting::compile(expression, &snapshot)?;
        Ok(posting::collect_matches(iterator.as_mut()))
    }

    /// Forward index entries of a document for one term type.
    pub fn forward_index(&self, docno: DocNo, term_type: &str) -> Vec<ForwardEntry> {
        self.snapshot()
            .document(docno)
            .map(|doc| doc.forward_terms(term_type).to_vec())
            .unwrap_or_default()
    }

    pub fn attribute(&self, docno: DocNo, name: &str) -> Option<String> {
        self.snapshot()
            .document(docno)
            .and_then(|doc| doc.attribute(name).map(str::to_string))
    }

    /// Metadata value of a document. Unknown columns are an error.
    pub fn metadata(&self, docno: DocNo, name: &str) -> Result<Option<NumericValue>> {
        let snapshot = self.snapshot();
        let table = snapshot.metadata();
        if table.schema().index_of(name).is_none() {
            return Err(QuarryError::config(format!("unknown metadata column '{name}'")));
        }
        if snapshot.docid(docno).is_none() {
            return Ok(None);
        }
        Ok(table.get_by_name(docno, name))
    }

    /// Access tokens of a document.
    pub fn access(&self, docno: DocNo) -> Vec<String> {
        self.snapshot()
            .document(docno)
            .map(|doc| doc.access.clone())
            .unwrap_or_default()
    }

    /// The full document frequency table as blobs, with positive sign
    /// (`register`) or negative sign (deregistration).
    pub fn init_statistics(&self, register: bool) -> StatisticsIterator {
        let snapshot = self.snapshot();
        let sign: i64 = if register { 1 } else { -1 };
        let record = StatisticsRecord {
            timestamp: snapshot.timestamp(),
            nofdocs_delta: sign * snapshot.nof_documents() as i64,
            changes: snapshot
                .term_statistics()
                .into_iter()
                .map(|(term, df)| DfChange {
                    term,
                    increment: sign * df as i64,
                })
                .collect(),
        };
        let origin = if register {
            BlobOrigin::Register
        } else {
            BlobOrigin::Deregister
        };
        StatisticsIterator::new(vec![Arc::new(record)], origin, self.inner.config.statsproc)
    }

    /// Blobs of all commits strictly after `since` (all commits for `None`).
    /// Fails once the history no longer reaches back to `since`; the full
    /// table from [`StorageClient::init_statistics`] replaces it then.
    pub fn update_statistics(&self, since: Option<TimeStamp>) -> Result<StatisticsIterator> {
        let records = self.inner.statistics.read().since(since)?;
        Ok(StatisticsIterator::new(
            records,
            BlobOrigin::Update,
            self.inner.config.statsproc,
        ))
    }

    pub(crate) fn commit(&self, staged: Vec<StagedOperation>) -> Result<CommitSummary> {
        self.inner.commit(staged)
    }
}

impl StorageInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QuarryError::invalid_operation("storage is closed"));
        }
        Ok(())
    }

    fn commit(&self, staged: Vec<StagedOperation>) -> Result<CommitSummary> {
        self.ensure_open()?;
        let mut writer = self.writer.lock();

        let base = Arc::clone(&self.current.read());
        let mut next = Snapshot::clone(&base);
        next.generation = base.generation + 1;
        let reclaimed = Arc::make_mut(&mut next.docids).reclaim(self.readers.oldest());
        if reclaimed > 0 {
            debug!("reclaimed {reclaimed} document numbers");
        }

        let mut summary = CommitSummary {
            timestamp: base.timestamp,
            ..Default::default()
        };
        let mut operations = Vec::with_capacity(staged.len());
        let mut touched = BTreeSet::new();
        for op in staged {
            let operation = match op {
                StagedOperation::Insert {
                    docid,
                    document,
                    update,
                } => {
                    let docno = match next.docno(&docid) {
                        Some(docno) if update => {
                            summary.nof_updated += 1;
                            docno
                        }
                        Some(_) => {
                            return Err(QuarryError::transaction(format!(
                                "document '{docid}' already exists and was not inserted as an update"
                            )));
                        }
                        None => {
                            summary.nof_inserted += 1;
                            Arc::make_mut(&mut next.docids).allocate(&docid)
                        }
                    };
                    IndexOperation::Insert {
                        docno,
                        docid,
                        document,
                    }
                }
                StagedOperation::Delete { docid } => {
                    summary.nof_deleted += 1;
                    IndexOperation::Delete { docid }
                }
                StagedOperation::DeleteUser { user } => IndexOperation::DeleteUser { user },
                StagedOperation::DefineMetaData { schema } => IndexOperation::DefineMetaData { schema },
                StagedOperation::AlterMetaData { commands } => {
                    IndexOperation::AlterMetaData { commands }
                }
            };
            next.apply(&operation, &mut touched)?;
            operations.push(operation);
        }
        if operations.is_empty() {
            return Ok(summary);
        }

        let changes: Vec<DfChange> = touched
            .into_iter()
            .filter_map(|term| {
                let increment =
                    next.document_frequency(&term) as i64 - base.document_frequency(&term) as i64;
                (increment != 0).then_some(DfChange { term, increment })
            })
            .collect();
        let timestamp = base.timestamp.next(unix_now());
        next.timestamp = timestamp;
        summary.timestamp = timestamp;
        let statistics = StatisticsRecord {
            timestamp,
            nofdocs_delta: next.nof_documents() as i64 - base.nof_documents() as i64,
            changes,
        };

        writer.journal.append(&CommitRecord {
            generation: next.generation,
            timestamp,
            operations,
            statistics: statistics.clone(),
        })?;

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        self.statistics.write().push(Arc::new(statistics));
        debug!(
            "committed generation {} at {timestamp}: {} inserted, {} updated, {} deleted",
            next.generation, summary.nof_inserted, summary.nof_updated, summary.nof_deleted
        );

        if writer.journal.size() > self.config.cache_size {
            let history = self.statistics.read().clone();
            match journal::write_checkpoint(self.backend.as_ref(), &next, &history) {
                Ok(()) => writer.journal.reset()?,
                Err(e) => warn!("checkpoint at generation {} failed: {e}", next.generation),
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document::AnalyzedDocument;
    use crate::statistics::StatisticsMessage;

    fn doc(text: &str) -> AnalyzedDocument {
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", text);
        doc
    }

    #[test]
    fn test_commit_publishes_snapshot() {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let before = client.snapshot();

        let mut txn = client.transaction().unwrap();
        txn.insert_document("a", doc("x y")).unwrap();
        txn.insert_document("b", doc("y")).unwrap();
        let summary = txn.commit().unwrap();
        assert_eq!(summary.nof_inserted, 2);

        assert_eq!(before.nof_documents(), 0);
        assert_eq!(client.nof_documents_inserted(), 2);
        assert_eq!(client.document_frequency(&Term::new("word", "y")), 2);
        assert_eq!(client.document_id(1).as_deref(), Some("a"));
        assert_eq!(client.max_document_number(), 2);
    }

    #[test]
    fn test_statistics_deltas() {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let mut txn = client.transaction().unwrap();
        txn.insert_document("a", doc("x x")).unwrap();
        txn.commit().unwrap();
        let first = client.snapshot().timestamp();

        let mut txn = client.transaction().unwrap();
        txn.update_document("a", doc("z")).unwrap();
        txn.commit().unwrap();

        let messages: Vec<StatisticsMessage> = client
            .update_statistics(Some(first))
            .unwrap()
            .map(|blob| StatisticsMessage::decode(&blob.unwrap()).unwrap())
            .collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].nofdocs_delta, 0);
        let increments: Vec<(String, i64)> = messages[0]
            .changes
            .iter()
            .map(|c| (c.term.value.clone(), c.increment))
            .collect();
        assert_eq!(increments, vec![("x".to_string(), -1), ("z".to_string(), 1)]);
    }

    #[test]
    fn test_statistics_history_is_bounded() {
        let config = IndexConfig::builder().statistics_history(2).build();
        let client = StorageClient::create(config).unwrap();
        let mut stamps = Vec::new();
        for id in ["a", "b", "c"] {
            let mut txn = client.transaction().unwrap();
            txn.insert_document(id, doc("x")).unwrap();
            stamps.push(txn.commit().unwrap().timestamp);
        }

        assert!(matches!(
            client.update_statistics(None).unwrap_err(),
            QuarryError::Consistency(_)
        ));
        assert!(client.update_statistics(Some(TimeStamp::default())).is_err());
        assert_eq!(client.update_statistics(Some(stamps[0])).unwrap().count(), 2);
        assert_eq!(client.update_statistics(Some(stamps[1])).unwrap().count(), 1);
    }

    #[test]
    fn test_init_statistics_sign() {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let mut txn = client.transaction().unwrap();
        txn.insert_document("a", doc("x")).unwrap();
        txn.commit().unwrap();

        let mut deregister = client.init_statistics(false);
        let message = deregister.next_message().unwrap();
        assert_eq!(message.nofdocs_delta, -1);
        assert_eq!(message.changes[0].increment, -1);
        assert!(deregister.next_message().is_none());
    }

    #[test]
    fn test_deleted_number_reused_after_readers_release() {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let mut txn = client.transaction().unwrap();
        txn.insert_document("a", doc("x")).unwrap();
        txn.insert_document("b", doc("x")).unwrap();
        txn.commit().unwrap();

        let reader = client.snapshot();
        let mut txn = client.transaction().unwrap();
        txn.delete_document("a").unwrap();
        txn.commit().unwrap();

        let mut txn = client.transaction().unwrap();
        txn.insert_document("c", doc("x")).unwrap();
        txn.commit().unwrap();
        assert_eq!(client.document_number("c"), Some(3));
        assert_eq!(reader.docid(1), Some("a"));

        drop(reader);
        let mut txn = client.transaction().unwrap();
        txn.insert_document("d", doc("x")).unwrap();
        txn.commit().unwrap();
        assert_eq!(client.document_number("d"), Some(1));
    }

    #[test]
    fn test_closed_storage_rejects_transactions() {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        client.close().unwrap();
        assert!(matches!(
            client.transaction().unwrap_err(),
            QuarryError::InvalidOperation(_)
        ));
    }

    #[test]
    fn test_open_requires_existing_storage() {
        assert!(matches!(
            StorageClient::open(IndexConfig::memory()).unwrap_err(),
            QuarryError::Config(_)
        ));
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::at(dir.path().join("missing"));
        assert!(!StorageClient::exists(&config));
        assert!(StorageClient::open(config).is_err());
    }
}
