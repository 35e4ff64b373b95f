//! Transaction management for atomic index operations.
//!
//! A transaction stages operations in a private buffer. Nothing becomes
//! visible before [`Transaction::commit`], which hands the whole buffer to the
//! storage in one step: either every staged operation is applied and
//! journaled, or none is. Dropping a transaction without committing discards
//! the buffer.

use log::{debug, warn};
use uuid::Uuid;

use crate::error::{QuarryError, Result};
use crate::index::client::StorageClient;
use crate::index::document::AnalyzedDocument;
use crate::index::metadata::{MetaDataCommand, MetaDataSchema, MetaDataTable};
use crate::index::types::MAX_POSITION;
use crate::statistics::TimeStamp;

/// Transaction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Accepting operations.
    Active,
    /// Handed over to the storage for commit.
    Preparing,
    /// Committed.
    Committed,
    /// Rolled back, explicitly or by a failed commit.
    Aborted,
}

/// An operation waiting for commit.
#[derive(Debug, Clone)]
pub(crate) enum StagedOperation {
    Insert {
        docid: String,
        document: AnalyzedDocument,
        update: bool,
    },
    Delete {
        docid: String,
    },
    DeleteUser {
        user: String,
    },
    DefineMetaData {
        schema: MetaDataSchema,
    },
    AlterMetaData {
        commands: Vec<MetaDataCommand>,
    },
}

/// Outcome of a successful commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub nof_inserted: usize,
    pub nof_updated: usize,
    pub nof_deleted: usize,
    /// Timestamp of the commit, or of the previous commit if nothing was
    /// staged.
    pub timestamp: TimeStamp,
}

/// A scoped write context.
#[derive(Debug)]
pub struct Transaction {
    client: StorageClient,
    id: Uuid,
    state: TransactionState,
    staged: Vec<StagedOperation>,
    schema: MetaDataSchema,
}

impl Transaction {
    pub(crate) fn new(client: StorageClient) -> Self {
        let schema = client.snapshot().metadata().schema().clone();
        let id = Uuid::new_v4();
        debug!("transaction {id} started");
        Transaction {
            client,
            id,
            state: TransactionState::Active,
            staged: Vec::new(),
            schema,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of staged operations.
    pub fn nof_staged(&self) -> usize {
        self.staged.len()
    }

    fn ensure_active(&self) -> Result<()> {
        if self.state != TransactionState::Active {
            return Err(QuarryError::invalid_operation(format!(
                "transaction {} is {:?}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn stage_document(&mut self, docid: &str, mut document: AnalyzedDocument, update: bool) -> Result<()> {
        self.ensure_active()?;
        if docid.is_empty() {
            return Err(QuarryError::transaction("document id must not be empty"));
        }
        if let Some(term) = document
            .search_index
            .iter()
            .chain(document.forward_index.iter())
            .find(|t| t.position == 0 || t.position > MAX_POSITION)
        {
            return Err(QuarryError::transaction(format!(
                "document '{docid}': term {} has position {}, positions range from 1 to {MAX_POSITION}",
                term.term(),
                term.position
            )));
        }
        if let Err(e) = self.schema.build_record(&document) {
            debug!("document '{docid}' rejected: {e}");
            return Err(e);
        }
        if !document.access.is_empty() && !self.client.config().acl {
            warn!("document '{docid}': access tokens ignored, storage has no ACL");
            document.access.clear();
        }
        self.staged.push(StagedOperation::Insert {
            docid: docid.to_string(),
            document,
            update,
        });
        Ok(())
    }

    /// Stage a new document. Committing fails if `docid` already exists.
    pub fn insert_document(&mut self, docid: &str, document: AnalyzedDocument) -> Result<()> {
        self.stage_document(docid, document, false)
    }

    /// Stage a document that replaces an existing one with the same id, or is
    /// inserted if there is none.
    pub fn update_document(&mut self, docid: &str, document: AnalyzedDocument) -> Result<()> {
        self.stage_document(docid, document, true)
    }

    /// Stage the deletion of a document. Committing fails if the document
    /// does not exist at that point.
    pub fn delete_document(&mut self, docid: &str) -> Result<()> {
        self.ensure_active()?;
        self.staged.push(StagedOperation::Delete {
            docid: docid.to_string(),
        });
        Ok(())
    }

    /// Stage the removal of `user` from all access control lists.
    pub fn delete_user_access_rights(&mut self, user: &str) -> Result<()> {
        self.ensure_active()?;
        self.staged.push(StagedOperation::DeleteUser {
            user: user.to_string(),
        });
        Ok(())
    }

    /// Stage the definition of the metadata table. Only legal while the
    /// storage holds no documents.
    pub fn define_metadata_table(&mut self, schema: MetaDataSchema) -> Result<()> {
        self.ensure_active()?;
        self.schema = schema.clone();
        self.staged.push(StagedOperation::DefineMetaData { schema });
        Ok(())
    }

    /// Stage a metadata table migration.
    pub fn alter_metadata_table(&mut self, commands: Vec<MetaDataCommand>) -> Result<()> {
        self.ensure_active()?;
        let altered = MetaDataTable::new(self.schema.clone()).alter(&commands, 0)?;
        self.schema = altered.schema().clone();
        self.staged.push(StagedOperation::AlterMetaData { commands });
        Ok(())
    }

    /// Apply all staged operations atomically.
    pub fn commit(&mut self) -> Result<CommitSummary> {
        self.ensure_active()?;
        self.state = TransactionState::Preparing;
        let staged = std::mem::take(&mut self.staged);
        match self.client.commit(staged) {
            Ok(summary) => {
                self.state = TransactionState::Committed;
                debug!("transaction {} committed", self.id);
                Ok(summary)
            }
            Err(e) => {
                self.state = TransactionState::Aborted;
                debug!("transaction {} aborted: {e}", self.id);
                Err(e)
            }
        }
    }

    /// Discard all staged operations.
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active()?;
        self.staged.clear();
        self.state = TransactionState::Aborted;
        debug!("transaction {} rolled back", self.id);
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state == TransactionState::Active && !self.staged.is_empty() {
            debug!(
                "transaction {} dropped with {} staged operations, discarding",
                self.id,
                self.staged.len()
            );
        }
    }
}
