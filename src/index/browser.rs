//! Enumeration of documents restricted by metadata conditions.

use std::fmt;
use std::str::FromStr;

use crate::error::{QuarryError, Result};
use crate::index::document::NumericValue;
use crate::index::snapshot::SnapshotView;
use crate::index::types::DocNo;
use crate::query::restriction::{CompareOperator, CompiledRestriction, MetaDataRestriction};

/// What to fetch from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    DocId,
    DocNo,
    Attribute(String),
    MetaData(String),
}

impl FromStr for Selector {
    type Err = QuarryError;

    /// `docid`, `docno`, `attribute:<name>` or `metadata:<name>`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            None if s == "docid" => Ok(Selector::DocId),
            None if s == "docno" => Ok(Selector::DocNo),
            Some(("attribute", name)) if !name.is_empty() => Ok(Selector::Attribute(name.to_string())),
            Some(("metadata", name)) if !name.is_empty() => Ok(Selector::MetaData(name.to_string())),
            _ => Err(QuarryError::config(format!("unknown document selector '{s}'"))),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::DocId => f.write_str("docid"),
            Selector::DocNo => f.write_str("docno"),
            Selector::Attribute(name) => write!(f, "attribute:{name}"),
            Selector::MetaData(name) => write!(f, "metadata:{name}"),
        }
    }
}

/// Walks the documents of one snapshot in ascending number order.
#[derive(Debug)]
pub struct DocumentBrowser {
    snapshot: SnapshotView,
    restriction: MetaDataRestriction,
    compiled: CompiledRestriction,
}

impl DocumentBrowser {
    pub fn new(snapshot: SnapshotView) -> Self {
        DocumentBrowser {
            snapshot,
            restriction: MetaDataRestriction::new(),
            compiled: CompiledRestriction::default(),
        }
    }

    /// Add a restriction condition (see [`MetaDataRestriction::add_condition`]).
    pub fn add_metadata_restriction_condition(
        &mut self,
        operator: CompareOperator,
        column: &str,
        value: NumericValue,
        new_group: bool,
    ) -> Result<()> {
        let mut restriction = self.restriction.clone();
        restriction.add_condition(operator, column, value, new_group);
        self.compiled = restriction.compile(self.snapshot.metadata().schema())?;
        self.restriction = restriction;
        Ok(())
    }

    /// Smallest existing document number `>= docno` passing the restriction,
    /// 0 if there is none.
    pub fn skip_doc(&self, docno: DocNo) -> DocNo {
        let start = docno.max(1);
        let max = self.snapshot.max_docno();
        (start..=max)
            .find(|&d| {
                self.snapshot.docid(d).is_some()
                    && self.compiled.matches(self.snapshot.metadata(), d)
            })
            .unwrap_or(0)
    }

    /// Selected values of a document, `None` if it does not exist.
    pub fn get(&self, docno: DocNo, selectors: &[Selector]) -> Option<Vec<(String, String)>> {
        let document = self.snapshot.document(docno)?;
        let values = selectors
            .iter()
            .filter_map(|selector| {
                let value = match selector {
                    Selector::DocId => Some(document.docid.clone()),
                    Selector::DocNo => Some(docno.to_string()),
                    Selector::Attribute(name) => document.attribute(name).map(str::to_string),
                    Selector::MetaData(name) => self
                        .snapshot
                        .metadata()
                        .get_by_name(docno, name)
                        .map(|v| v.to_string()),
                };
                value.map(|v| (selector.to_string(), v))
            })
            .collect();
        Some(values)
    }
}
