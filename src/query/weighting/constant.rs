//! Constant weight, optionally per matching feature.

use crate::error::Result;
use crate::index::snapshot::Snapshot;
use crate::index::types::DocNo;
use crate::query::eval::{EvalContext, FeatureIterator};
use crate::query::weighting::{FunctionConfig, WeightingExecution, WeightingFunction};

/// Without a `match` set every document gets `weight`. With one, a document
/// gets `weight` times the summed weights of the features it contains.
#[derive(Debug, Clone)]
pub struct ConstantWeight {
    weight: f64,
    feature_set: Option<String>,
    debug: Option<String>,
}

impl ConstantWeight {
    pub const PARAMS: &'static [&'static str] = &["weight", "match"];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        Ok(ConstantWeight {
            weight: config.number("weight", 1.0)?,
            feature_set: config.feature_set("match")?,
            debug: config.debug_name()?,
        })
    }
}

impl WeightingFunction for ConstantWeight {
    fn name(&self) -> &str {
        "constant"
    }

    fn describe(&self) -> String {
        match &self.feature_set {
            Some(set) => format!("constant( weight={}, match= %{set})", self.weight),
            None => format!("constant( weight={})", self.weight),
        }
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn WeightingExecution>> {
        let features = match &self.feature_set {
            Some(set) => Some(ctx.features(set)?),
            None => None,
        };
        Ok(Box::new(ConstantExecution {
            weight: self.weight,
            features,
        }))
    }
}

#[derive(Debug)]
struct ConstantExecution {
    weight: f64,
    features: Option<Vec<FeatureIterator>>,
}

impl WeightingExecution for ConstantExecution {
    fn call(&mut self, _snapshot: &Snapshot, docno: DocNo) -> Result<f64> {
        let Some(features) = self.features.as_mut() else {
            return Ok(self.weight);
        };
        let matched: f64 = features
            .iter_mut()
            .filter_map(|f| (f.iterator.skip_doc(docno) == docno).then_some(f.weight))
            .sum();
        Ok(self.weight * matched)
    }
}
