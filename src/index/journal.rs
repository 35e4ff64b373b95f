//! Commit journal and checkpoints.
//!
//! Every commit appends one framed record to `journal.log`:
//!
//! ```text
//! magic u32 | payload length u32 | bincode payload | crc32 u32
//! ```
//!
//! On open the journal is replayed on top of the latest checkpoint. A record
//! that is incomplete or fails its checksum marks a torn tail: the journal is
//! truncated at that record and replay stops there. Once the journal grows
//! past the configured cache size, the full state is written to `checkpoint.bin`
//! (via a temporary file and a rename) and the journal starts over.

use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::docid::{DocIdMap, DocIdMapImage};
use crate::index::forward::StoredDocument;
use crate::index::metadata::{MetaDataSchema, MetaDataTable};
use crate::index::posting::PostingList;
use crate::index::snapshot::{IndexOperation, Snapshot};
use crate::index::types::{DocNo, SharedMap, Term};
use crate::statistics::{StatisticsHistory, StatisticsRecord, TimeStamp};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

pub const JOURNAL_FILE: &str = "journal.log";
pub const CHECKPOINT_FILE: &str = "checkpoint.bin";
const CHECKPOINT_TMP: &str = "checkpoint.tmp";

const RECORD_MAGIC: u32 = 0x4E52_4A51;
const CHECKPOINT_MAGIC: u32 = 0x504B_4351;
const CHECKPOINT_VERSION: u16 = 2;

/// One committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub generation: u64,
    pub timestamp: TimeStamp,
    pub operations: Vec<IndexOperation>,
    pub statistics: StatisticsRecord,
}

/// Append-only commit log.
#[derive(Debug)]
pub struct Journal {
    storage: Arc<dyn Storage>,
    size: u64,
    /// A failed append may have left bytes past `size`.
    needs_rollback: bool,
}

impl Journal {
    /// Open the journal, returning the intact records it holds.
    pub fn open(storage: Arc<dyn Storage>) -> Result<(Journal, Vec<CommitRecord>)> {
        if !storage.file_exists(JOURNAL_FILE) {
            let mut output = storage.create_output(JOURNAL_FILE)?;
            output.close()?;
            let journal = Journal {
                storage,
                size: 0,
                needs_rollback: false,
            };
            return Ok((journal, Vec::new()));
        }

        let mut data = Vec::new();
        storage.open_input(JOURNAL_FILE)?.read_to_end(&mut data)?;

        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset < data.len() {
            match decode_record(&data[offset..]) {
                Ok((record, used)) => {
                    records.push(record);
                    offset += used;
                }
                Err(e) => {
                    warn!(
                        "truncating torn journal tail at offset {offset} ({} bytes dropped): {e}",
                        data.len() - offset
                    );
                    storage.truncate_file(JOURNAL_FILE, offset as u64)?;
                    break;
                }
            }
        }
        debug!("journal holds {} intact commit records", records.len());

        Ok((
            Journal {
                storage,
                size: offset as u64,
                needs_rollback: false,
            },
            records,
        ))
    }

    /// Durably append a record. A failed append cuts the journal back to its
    /// last intact record, so a partial write never precedes later records.
    pub fn append(&mut self, record: &CommitRecord) -> Result<()> {
        let bytes = encode_record(record)?;
        if self.needs_rollback {
            self.roll_back()?;
        }
        if let Err(e) = self.write_synced(&bytes) {
            self.needs_rollback = true;
            if let Err(rollback) = self.roll_back() {
                warn!("cannot cut journal back to {} bytes: {rollback}", self.size);
            }
            return Err(e);
        }
        self.size += bytes.len() as u64;
        Ok(())
    }

    fn write_synced(&self, bytes: &[u8]) -> Result<()> {
        let mut output = self.storage.append_output(JOURNAL_FILE)?;
        output.write_all(bytes)?;
        output.flush_and_sync()?;
        output.close()
    }

    fn roll_back(&mut self) -> Result<()> {
        warn!("discarding partial journal write after offset {}", self.size);
        self.storage.truncate_file(JOURNAL_FILE, self.size)?;
        self.needs_rollback = false;
        Ok(())
    }

    /// Current journal size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Discard all records (after a checkpoint).
    pub fn reset(&mut self) -> Result<()> {
        let mut output = self.storage.create_output(JOURNAL_FILE)?;
        output.close()?;
        self.storage.sync()?;
        self.size = 0;
        self.needs_rollback = false;
        Ok(())
    }
}

fn encode_record(record: &CommitRecord) -> Result<Vec<u8>> {
    let payload = bincode::serialize(record)?;
    let length = u32::try_from(payload.len())
        .map_err(|_| QuarryError::storage("commit record too large for the journal"))?;
    let mut writer = StructWriter::new(Vec::with_capacity(payload.len() + 12));
    writer.write_u32(RECORD_MAGIC)?;
    writer.write_u32(length)?;
    writer.write_raw(&payload)?;
    writer.finish()
}

fn decode_record(bytes: &[u8]) -> Result<(CommitRecord, usize)> {
    let mut reader = StructReader::new(Cursor::new(bytes));
    if reader.read_u32()? != RECORD_MAGIC {
        return Err(QuarryError::serialization("bad journal record magic"));
    }
    let length = reader.read_u32()? as usize;
    if bytes.len() < length + 12 {
        return Err(QuarryError::serialization("incomplete journal record"));
    }
    let payload = reader.read_raw(length)?;
    if !reader.verify_checksum()? {
        return Err(QuarryError::serialization("journal record checksum mismatch"));
    }
    let record: CommitRecord = bincode::deserialize(&payload)?;
    Ok((record, length + 12))
}

#[derive(Serialize, Deserialize)]
struct CheckpointCatalog {
    generation: u64,
    timestamp: TimeStamp,
    schema: MetaDataSchema,
    docids: DocIdMapImage,
    documents: Vec<(DocNo, StoredDocument)>,
    statistics: Vec<StatisticsRecord>,
    statistics_horizon: Option<TimeStamp>,
}

/// State restored from a checkpoint.
#[derive(Debug)]
pub struct Checkpoint {
    pub snapshot: Snapshot,
    pub statistics: Vec<StatisticsRecord>,
    /// Timestamp of the newest statistics record dropped before the checkpoint.
    pub statistics_horizon: Option<TimeStamp>,
}

/// Write the full state of `snapshot` plus the statistics history.
pub fn write_checkpoint(
    storage: &dyn Storage,
    snapshot: &Snapshot,
    statistics: &StatisticsHistory,
) -> Result<()> {
    let mut documents: Vec<(DocNo, StoredDocument)> = snapshot
        .documents
        .iter()
        .map(|(&no, doc)| (no, doc.as_ref().clone()))
        .collect();
    documents.sort_by_key(|(no, _)| *no);

    let catalog = CheckpointCatalog {
        generation: snapshot.generation,
        timestamp: snapshot.timestamp,
        schema: snapshot.metadata.schema().clone(),
        docids: snapshot.docids.image(),
        documents,
        statistics: statistics.iter().map(|r| r.as_ref().clone()).collect(),
        statistics_horizon: statistics.horizon(),
    };

    let output = storage.create_output(CHECKPOINT_TMP)?;
    let mut writer = StructWriter::new(output);
    writer.write_u32(CHECKPOINT_MAGIC)?;
    writer.write_u16(CHECKPOINT_VERSION)?;
    writer.write_bytes(&bincode::serialize(&catalog)?)?;
    writer.write_bytes(&snapshot.metadata.to_bytes(snapshot.max_docno()))?;

    let mut terms: Vec<(&Term, &Arc<PostingList>)> = snapshot.postings.iter().collect();
    terms.sort_by(|a, b| a.0.cmp(b.0));
    writer.write_varint(terms.len() as u64)?;
    for (term, list) in terms {
        writer.write_string(&term.term_type)?;
        writer.write_string(&term.value)?;
        list.encode(&mut writer)?;
    }

    let mut output = writer.finish()?;
    output.close()?;
    storage.rename_file(CHECKPOINT_TMP, CHECKPOINT_FILE)?;
    storage.sync()?;
    debug!(
        "checkpoint written at generation {} ({} documents)",
        snapshot.generation,
        snapshot.nof_documents()
    );
    Ok(())
}

/// Read the latest checkpoint, if one exists.
pub fn read_checkpoint(storage: &dyn Storage, acl_enabled: bool) -> Result<Option<Checkpoint>> {
    if !storage.file_exists(CHECKPOINT_FILE) {
        return Ok(None);
    }
    let mut data = Vec::new();
    storage.open_input(CHECKPOINT_FILE)?.read_to_end(&mut data)?;
    let mut reader = StructReader::new(Cursor::new(data.as_slice()));

    if reader.read_u32()? != CHECKPOINT_MAGIC {
        return Err(QuarryError::storage("checkpoint file has a bad magic number"));
    }
    let version = reader.read_u16()?;
    if version != CHECKPOINT_VERSION {
        return Err(QuarryError::storage(format!(
            "unsupported checkpoint version {version}"
        )));
    }
    let catalog: CheckpointCatalog = bincode::deserialize(&reader.read_bytes()?)?;
    let metadata = MetaDataTable::from_bytes(catalog.schema, &reader.read_bytes()?)?;

    let nterms = reader.read_varint()? as usize;
    let mut postings = SharedMap::default();
    for _ in 0..nterms {
        let term_type = reader.read_string()?;
        let value = reader.read_string()?;
        let list = PostingList::decode(&mut reader)?;
        postings.insert(Term::new(term_type, value), Arc::new(list));
    }
    if !reader.verify_checksum()? {
        return Err(QuarryError::storage("checkpoint checksum mismatch"));
    }

    let mut snapshot = Snapshot {
        generation: catalog.generation,
        timestamp: catalog.timestamp,
        acl_enabled,
        docids: Arc::new(DocIdMap::from_image(catalog.docids)),
        documents: catalog
            .documents
            .into_iter()
            .map(|(no, doc)| (no, Arc::new(doc)))
            .collect(),
        postings,
        metadata,
        acl: Default::default(),
    };
    snapshot.rebuild_access();

    Ok(Some(Checkpoint {
        snapshot,
        statistics: catalog.statistics,
        statistics_horizon: catalog.statistics_horizon,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::document::AnalyzedDocument;
    use crate::storage::StorageOutput;
    use crate::storage::memory::MemoryStorage;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;

    fn record(generation: u64, docid: &str) -> CommitRecord {
        let mut document = AnalyzedDocument::new();
        document.add_text("word", "a b");
        CommitRecord {
            generation,
            timestamp: TimeStamp::new(1, generation),
            operations: vec![IndexOperation::Insert {
                docno: generation as DocNo,
                docid: docid.to_string(),
                document,
            }],
            statistics: StatisticsRecord {
                timestamp: TimeStamp::new(1, generation),
                nofdocs_delta: 1,
                changes: Vec::new(),
            },
        }
    }

    #[test]
    fn test_append_and_replay() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let (mut journal, records) = Journal::open(Arc::clone(&storage)).unwrap();
        assert!(records.is_empty());
        journal.append(&record(1, "a")).unwrap();
        journal.append(&record(2, "b")).unwrap();

        let (journal, records) = Journal::open(Arc::clone(&storage)).unwrap();
        assert_eq!(records, vec![record(1, "a"), record(2, "b")]);
        assert_eq!(journal.size(), storage.file_size(JOURNAL_FILE).unwrap());
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let (mut journal, _) = Journal::open(Arc::clone(&storage)).unwrap();
        journal.append(&record(1, "a")).unwrap();
        let intact = journal.size();
        journal.append(&record(2, "b")).unwrap();
        storage.truncate_file(JOURNAL_FILE, journal.size() - 5).unwrap();

        let (journal, records) = Journal::open(Arc::clone(&storage)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(journal.size(), intact);
        assert_eq!(storage.file_size(JOURNAL_FILE).unwrap(), intact);
    }

    /// Memory storage whose next append output fails after `budget` bytes.
    #[derive(Debug, Default)]
    struct ShortWriteStorage {
        inner: MemoryStorage,
        budget: Mutex<Option<usize>>,
    }

    #[derive(Debug)]
    struct ShortOutput {
        inner: Box<dyn StorageOutput>,
        remaining: usize,
    }

    impl Write for ShortOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.remaining == 0 {
                return Err(std::io::Error::other("device full"));
            }
            let n = buf.len().min(self.remaining);
            self.remaining -= n;
            self.inner.write(&buf[..n])
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.inner.flush()
        }
    }

    impl StorageOutput for ShortOutput {
        fn flush_and_sync(&mut self) -> Result<()> {
            self.inner.flush_and_sync()
        }

        fn close(&mut self) -> Result<()> {
            self.inner.close()
        }
    }

    impl Storage for ShortWriteStorage {
        fn open_input(&self, name: &str) -> Result<Box<dyn Read + Send>> {
            self.inner.open_input(name)
        }

        fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
            self.inner.create_output(name)
        }

        fn append_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
            let inner = self.inner.append_output(name)?;
            Ok(match self.budget.lock().take() {
                Some(remaining) => Box::new(ShortOutput { inner, remaining }),
                None => inner,
            })
        }

        fn file_exists(&self, name: &str) -> bool {
            self.inner.file_exists(name)
        }

        fn file_size(&self, name: &str) -> Result<u64> {
            self.inner.file_size(name)
        }

        fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
            self.inner.rename_file(old_name, new_name)
        }

        fn truncate_file(&self, name: &str, size: u64) -> Result<()> {
            self.inner.truncate_file(name, size)
        }

        fn sync(&self) -> Result<()> {
            self.inner.sync()
        }
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let storage = Arc::new(ShortWriteStorage::default());
        let (mut journal, _) = Journal::open(storage.clone()).unwrap();
        journal.append(&record(1, "a")).unwrap();
        let intact = journal.size();

        *storage.budget.lock() = Some(10);
        assert!(journal.append(&record(2, "b")).is_err());
        assert_eq!(journal.size(), intact);
        assert_eq!(storage.file_size(JOURNAL_FILE).unwrap(), intact);

        journal.append(&record(3, "c")).unwrap();
        let (_, records) = Journal::open(storage).unwrap();
        assert_eq!(records, vec![record(1, "a"), record(3, "c")]);
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let storage = MemoryStorage::new();
        let mut snapshot = Snapshot::empty("doclen UINT16 = count(word)".parse().unwrap(), true);
        snapshot.generation = 1;
        let mut document = AnalyzedDocument::new();
        document.add_text("word", "hello world hello");
        document.add_access("alice");
        document.set_attribute("title", "Greeting");
        snapshot
            .apply(
                &IndexOperation::Insert {
                    docno: 1,
                    docid: "doc1".to_string(),
                    document,
                },
                &mut BTreeSet::new(),
            )
            .unwrap();

        let mut history = StatisticsHistory::new(1);
        for generation in 1..=2 {
            history.push(Arc::new(record(generation, "doc1").statistics));
        }
        write_checkpoint(&storage, &snapshot, &history).unwrap();
        assert!(!storage.file_exists(CHECKPOINT_TMP));

        let checkpoint = read_checkpoint(&storage, true).unwrap().unwrap();
        assert_eq!(checkpoint.statistics.len(), 1);
        assert_eq!(checkpoint.statistics_horizon, Some(TimeStamp::new(1, 1)));
        let restored = checkpoint.snapshot;
        assert_eq!(restored.generation(), 1);
        assert_eq!(restored.docno("doc1"), Some(1));
        assert_eq!(
            restored.postings(&Term::new("word", "hello")).unwrap().get(1).unwrap().positions,
            vec![1, 3]
        );
        assert_eq!(
            restored.metadata().get_by_name(1, "doclen").unwrap().as_f64(),
            3.0
        );
        assert_eq!(restored.access().documents_for(&["alice".to_string()]), vec![1]);
        assert_eq!(restored.document(1).unwrap().attribute("title"), Some("Greeting"));
    }
}
