//! Summarizers extract the presentable content of ranked documents.

use std::fmt;

use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;
use crate::query::result::SummaryElement;

pub mod attribute;
pub mod forwardindex;
pub mod matchphrase;
pub mod metadata;

pub use attribute::AttributeSummarizer;
pub use forwardindex::ForwardIndexSummarizer;
pub use matchphrase::MatchPhraseSummarizer;
pub use metadata::MetaDataSummarizer;

/// A configured summarizer.
pub trait SummarizerFunction: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Parameter rendering for query dumps.
    fn describe(&self) -> String;

    /// Name of the debug summary element, if any.
    fn debug_name(&self) -> Option<&str> {
        None
    }

    /// Bind the summarizer to a query.
    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn SummarizerExecution>>;
}

/// A summarizer bound to one query.
pub trait SummarizerExecution: Send + fmt::Debug {
    fn summarize(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<Vec<SummaryElement>>;
}
