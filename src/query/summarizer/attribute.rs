//! Document attributes.

use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;
use crate::query::result::SummaryElement;
use crate::query::summarizer::{SummarizerExecution, SummarizerFunction};
use crate::query::weighting::FunctionConfig;

/// Returns attribute `name` as element `result` (default: the attribute
/// name). The attribute `docid` falls back to the document identifier.
#[derive(Debug, Clone)]
pub struct AttributeSummarizer {
    attribute: String,
    result: String,
    debug: Option<String>,
}

impl AttributeSummarizer {
    pub const PARAMS: &'static [&'static str] = &["name", "result"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        let attribute = config.required_text("name")?;
        let result = config.text("result")?.unwrap_or_else(|| attribute.clone());
        Ok(AttributeSummarizer {
            attribute,
            result,
            debug: config.debug_name()?,
        })
    }
}

impl SummarizerFunction for AttributeSummarizer {
    fn name(&self) -> &str {
        "attribute"
    }

    fn describe(&self) -> String {
        format!("attribute( name='{}', result='{}')", self.attribute, self.result)
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, _ctx: &EvalContext<'_>) -> Result<Box<dyn SummarizerExecution>> {
        Ok(Box::new(self.clone()))
    }
}

impl SummarizerExecution for AttributeSummarizer {
    fn summarize(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<Vec<SummaryElement>> {
        let Some(doc) = snapshot.document(docno) else {
            return Ok(Vec::new());
        };
        let value = match doc.attribute(&self.attribute) {
            Some(value) => value,
            None if self.attribute == "docid" => doc.docid.as_str(),
            None => return Ok(Vec::new()),
        };
        Ok(vec![SummaryElement::new(self.result.clone(), value)])
    }
}
