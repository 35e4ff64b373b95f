//! Weighted match frequency.

use crate::error::{QuarryError, Result};
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::{EvalContext, FeatureIterator};
use crate::query::weighting::{FunctionConfig, WeightingExecution, WeightingFunction};

/// Sum over the features of a set of `feature weight * weight * frequency`.
#[derive(Debug, Clone)]
pub struct TermFrequency {
    weight: f64,
    feature_set: String,
    debug: Option<String>,
}

impl TermFrequency {
    pub const PARAMS: &'static [&'static str] = &["weight", "match"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        Ok(TermFrequency {
            weight: config.number("weight", 1.0)?,
            feature_set: config
                .feature_set("match")?
                .ok_or_else(|| QuarryError::config(format!("{} needs a 'match' feature set", config.name)))?,
            debug: config.debug_name()?,
        })
    }
}

impl WeightingFunction for TermFrequency {
    fn name(&self) -> &str {
        "tf"
    }

    fn describe(&self) -> String {
        format!("tf( weight={}, match= %{})", self.weight, self.feature_set)
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn WeightingExecution>> {
        Ok(Box::new(TermFrequencyExecution {
            weight: self.weight,
            features: ctx.features(&self.feature_set)?,
        }))
    }
}

#[derive(Debug)]
struct TermFrequencyExecution {
    weight: f64,
    features: Vec<FeatureIterator>,
}

impl WeightingExecution for TermFrequencyExecution {
    fn call(&mut self, _snapshot: &Snapshot, docno: DocNo) -> Result<f64> {
        let mut sum = 0.0;
        for feature in &mut self.features {
            if feature.iterator.skip_doc(docno) == docno {
                sum += feature.weight * feature.iterator.frequency() as f64;
            }
        }
        Ok(sum * self.weight)
    }
}
