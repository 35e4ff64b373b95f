//! # Quarry
//!
//! A transactional inverted index storage with ranked query evaluation.
//!
//! ## Features
//!
//! - Snapshot isolated reads with a single writer transaction at a time
//! - Durable commit journal with checkpoints
//! - Search index, forward index, attributes, metadata and access control lists
//! - Versioned statistics blobs for distributing document frequencies
//! - Structural posting iterators (sequence, within, contains, ...)
//! - Pluggable weighting functions, a weighting formula VM and summarizers

pub mod cli;
pub mod error;
pub mod index;
pub mod query;
pub mod statistics;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::error::{QuarryError, Result};
    pub use crate::index::{AnalyzedDocument, DocNo, IndexConfig, NumericValue, Position, StorageClient, Term};
    pub use crate::query::{Expression, FunctionConfig, Query, QueryEval, QueryResult};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
