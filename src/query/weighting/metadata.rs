//! Weight read from a metadata column.

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::EvalContext;
use crate::query::weighting::{FunctionConfig, WeightingExecution, WeightingFunction};

#[derive(Debug, Clone)]
pub struct MetaDataWeight {
    column: String,
    weight: f64,
    debug: Option<String>,
}

impl MetaDataWeight {
    pub const PARAMS: &'static [&'static str] = &["name", "weight"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        Ok(MetaDataWeight {
            column: config.required_text("name")?,
            weight: config.number("weight", 1.0)?,
            debug: config.debug_name()?,
        })
    }
}

impl WeightingFunction for MetaDataWeight {
    fn name(&self) -> &str {
        "metadata"
    }

    fn describe(&self) -> String {
        format!("metadata( name='{}', weight={})", self.column, self.weight)
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn WeightingExecution>> {
        let column = ctx
            .snapshot()
            .metadata()
            .schema()
            .index_of(&self.column)
            .ok_or_else(|| QuarryError::config(format!("metadata weighting: unknown column '{}'", self.column)))?;
        Ok(Box::new(MetaDataExecution {
            column,
            weight: self.weight,
        }))
    }
}

#[derive(Debug)]
struct MetaDataExecution {
    column: usize,
    weight: f64,
}

impl WeightingExecution for MetaDataExecution {
    fn call(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<f64> {
        Ok(self.weight * snapshot.metadata().get(docno, self.column).as_f64())
    }
}
