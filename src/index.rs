//! The transactional document store.
//!
//! Documents arrive already analyzed ([`document::AnalyzedDocument`]) and are
//! written through a [`transaction::Transaction`]. Each commit produces a new
//! immutable [`snapshot::Snapshot`] holding postings, forward index,
//! attributes, metadata and access control lists, and appends one record to
//! the durable journal.

pub mod acl;
pub mod browser;
pub mod client;
pub mod config;
pub mod docid;
pub mod document;
pub mod forward;
pub mod journal;
pub mod metadata;
pub mod posting;
pub mod snapshot;
pub mod transaction;
pub mod types;

pub use browser::{DocumentBrowser, Selector};
pub use client::StorageClient;
pub use config::IndexConfig;
pub use document::{AnalyzedDocument, NumericValue};
pub use metadata::{MetaDataCommand, MetaDataSchema, MetaDataType};
pub use snapshot::SnapshotView;
pub use transaction::{CommitSummary, Transaction, TransactionState};
pub use types::{DocNo, MAX_POSITION, Position, Term};
