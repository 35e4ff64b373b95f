//! Metadata values.

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;
use crate::query::result::SummaryElement;
use crate::query::summarizer::{SummarizerExecution, SummarizerFunction};
use crate::query::weighting::FunctionConfig;

#[derive(Debug, Clone)]
pub struct MetaDataSummarizer {
    column: String,
    result: String,
    debug: Option<String>,
}

impl MetaDataSummarizer {
    pub const PARAMS: &'static [&'static str] = &["name", "result"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        let column = config.required_text("name")?;
        let result = config.text("result")?.unwrap_or_else(|| column.clone());
        Ok(MetaDataSummarizer {
            column,
            result,
            debug: config.debug_name()?,
        })
    }
}

impl SummarizerFunction for MetaDataSummarizer {
    fn name(&self) -> &str {
        "metadata"
    }

    fn describe(&self) -> String {
        format!("metadata( name='{}', result='{}')", self.column, self.result)
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn SummarizerExecution>> {
        let column = ctx
            .snapshot()
            .metadata()
            .schema()
            .index_of(&self.column)
            .ok_or_else(|| QuarryError::config(format!("metadata summarizer: unknown column '{}'", self.column)))?;
        Ok(Box::new(MetaDataSummaryExecution {
            column,
            result: self.result.clone(),
        }))
    }
}

#[derive(Debug)]
struct MetaDataSummaryExecution {
    column: usize,
    result: String,
}

impl SummarizerExecution for MetaDataSummaryExecution {
    fn summarize(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<Vec<SummaryElement>> {
        let value = snapshot.metadata().get(docno, self.column);
        Ok(vec![SummaryElement::new(self.result.clone(), value.to_string())])
    }
}
