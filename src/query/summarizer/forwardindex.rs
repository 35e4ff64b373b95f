//! Forward index dump.

use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;
use crate::query::result::SummaryElement;
use crate::query::summarizer::{SummarizerExecution, SummarizerFunction};
use crate::query::weighting::FunctionConfig;

/// One element per forward index term of a type, in position order, with
/// the position as element index. `N` limits the number of elements.
#[derive(Debug, Clone)]
pub struct ForwardIndexSummarizer {
    term_type: String,
    result: String,
    max_terms: Option<usize>,
    debug: Option<String>,
}

impl ForwardIndexSummarizer {
    pub const PARAMS: &'static [&'static str] = &["type", "result", "N"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        let term_type = config.required_text("type")?;
        let result = config.text("result")?.unwrap_or_else(|| term_type.clone());
        let max_terms = match config.number("N", 0.0)? {
            n if n >= 1.0 => Some(n as usize),
            _ => None,
        };
        Ok(ForwardIndexSummarizer {
            term_type,
            result,
            max_terms,
            debug: config.debug_name()?,
        })
    }
}

impl SummarizerFunction for ForwardIndexSummarizer {
    fn name(&self) -> &str {
        "forwardindex"
    }

    fn describe(&self) -> String {
        match self.max_terms {
            Some(n) => format!("forwardindex( type='{}', result='{}', N={n})", self.term_type, self.result),
            None => format!("forwardindex( type='{}', result='{}')", self.term_type, self.result),
        }
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, _ctx: &EvalContext<'_>) -> Result<Box<dyn SummarizerExecution>> {
        Ok(Box::new(self.clone()))
    }
}

impl SummarizerExecution for ForwardIndexSummarizer {
    fn summarize(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<Vec<SummaryElement>> {
        let Some(doc) = snapshot.document(docno) else {
            return Ok(Vec::new());
        };
        let limit = self.max_terms.unwrap_or(usize::MAX);
        Ok(doc
            .forward_terms(&self.term_type)
            .iter()
            .take(limit)
            .map(|entry| {
                SummaryElement::new(self.result.clone(), entry.value.clone())
                    .with_index(i32::try_from(entry.position).unwrap_or(i32::MAX))
            })
            .collect())
    }
}
