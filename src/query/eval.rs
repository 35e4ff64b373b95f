//! Query evaluation schemes.
//!
//! A [`QueryEval`] describes how queries are evaluated: which feature sets
//! select, restrict or exclude documents, which weighting functions and
//! formula rank them and which summarizers describe the result. It is set up
//! once and creates any number of [`Query`] objects bound to a storage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::client::StorageClient;
use crate::index::snapshot::Snapshot;
use crate::index::types::Term;
use crate::query::expression::Expression;
use crate::query::formula::WeightingFormula;
use crate::query::posting::{PostingIterator, compile};
use crate::query::registry::FunctionRegistry;
use crate::query::result::QueryResult;
use crate::query::session::Query;
use crate::query::summarizer::SummarizerFunction;
use crate::query::weighting::{FunctionConfig, WeightingFunction};

/// An expression assigned to a named feature set of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFeature {
    pub set: String,
    pub expression: Expression,
    #[serde(default = "default_feature_weight")]
    pub weight: f64,
}

fn default_feature_weight() -> f64 {
    1.0
}

impl QueryFeature {
    pub fn new<S: Into<String>>(set: S, expression: Expression, weight: f64) -> Self {
        QueryFeature {
            set: set.into(),
            expression,
            weight,
        }
    }
}

/// A compiled feature handed to weighting functions and summarizers.
#[derive(Debug)]
pub struct FeatureIterator {
    pub expression: Expression,
    pub weight: f64,
    /// Document frequency used for weighting: the defined term statistics if
    /// any, otherwise the frequency in the snapshot.
    pub document_frequency: usize,
    pub iterator: Box<dyn PostingIterator>,
}

/// What functions see of the query they are bound to.
#[derive(Debug)]
pub struct EvalContext<'a> {
    snapshot: &'a Snapshot,
    features: &'a [QueryFeature],
    term_statistics: &'a BTreeMap<Term, usize>,
    nof_documents: usize,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(
        snapshot: &'a Snapshot,
        features: &'a [QueryFeature],
        term_statistics: &'a BTreeMap<Term, usize>,
        nof_documents: usize,
    ) -> Self {
        EvalContext {
            snapshot,
            features,
            term_statistics,
            nof_documents,
        }
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    /// Collection size used for weighting.
    pub fn nof_documents(&self) -> usize {
        self.nof_documents
    }

    /// Fresh iterators over the features of a set, in definition order.
    pub fn features(&self, set: &str) -> Result<Vec<FeatureIterator>> {
        self.features
            .iter()
            .filter(|f| f.set == set)
            .map(|f| {
                let iterator = compile(&f.expression, self.snapshot)?;
                let document_frequency = f
                    .expression
                    .as_term()
                    .and_then(|term| self.term_statistics.get(&term).copied())
                    .unwrap_or_else(|| iterator.document_frequency());
                Ok(FeatureIterator {
                    expression: f.expression.clone(),
                    weight: f.weight,
                    document_frequency,
                    iterator,
                })
            })
            .collect()
    }
}

/// Query evaluation scheme.
#[derive(Clone)]
pub struct QueryEval {
    registry: Arc<FunctionRegistry>,
    pub(crate) selection: Vec<String>,
    pub(crate) restriction: Vec<String>,
    pub(crate) exclusion: Vec<String>,
    pub(crate) terms: Vec<QueryFeature>,
    pub(crate) weighting: Vec<Arc<dyn WeightingFunction>>,
    pub(crate) formula: Option<WeightingFormula>,
    pub(crate) summarizers: Vec<Arc<dyn SummarizerFunction>>,
}

impl Default for QueryEval {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryEval {
    /// A scheme using the built-in functions.
    pub fn new() -> Self {
        QueryEval::with_registry(Arc::new(FunctionRegistry::new()))
    }

    pub fn with_registry(registry: Arc<FunctionRegistry>) -> Self {
        QueryEval {
            registry,
            selection: Vec::new(),
            restriction: Vec::new(),
            exclusion: Vec::new(),
            terms: Vec::new(),
            weighting: Vec::new(),
            formula: None,
            summarizers: Vec::new(),
        }
    }

    /// Add a term to feature set `set` of every query, whether or not the
    /// query mentions it.
    pub fn add_term(&mut self, set: &str, term_type: &str, value: &str) {
        self.terms
            .push(QueryFeature::new(set, Expression::term(term_type, value), 1.0));
    }

    /// Documents matching a feature of `set` are candidates for ranking.
    pub fn add_selection_feature(&mut self, set: &str) {
        self.selection.push(set.to_string());
    }

    /// Ranked documents must match every feature of `set`.
    pub fn add_restriction_feature(&mut self, set: &str) {
        self.restriction.push(set.to_string());
    }

    /// Ranked documents must not match any feature of `set`.
    pub fn add_exclusion_feature(&mut self, set: &str) {
        self.exclusion.push(set.to_string());
    }

    /// Add a weighting function. Its result is argument `_i` of the formula,
    /// `i` counting the functions in order of addition.
    pub fn add_weighting_function(&mut self, config: &FunctionConfig) -> Result<()> {
        let function = self.registry.weighting_function(config)?;
        debug!("weighting function _{} = {}", self.weighting.len(), function.describe());
        self.weighting.push(function);
        Ok(())
    }

    /// Combine the weighting function results with a formula instead of
    /// summing them.
    pub fn define_weighting_formula(&mut self, source: &str, defaults: &BTreeMap<String, f64>) -> Result<()> {
        self.formula = Some(WeightingFormula::compile(source, defaults)?);
        Ok(())
    }

    pub fn add_summarizer(&mut self, config: &FunctionConfig) -> Result<()> {
        let summarizer = self.registry.summarizer(config)?;
        self.summarizers.push(summarizer);
        Ok(())
    }

    pub fn formula(&self) -> Option<&WeightingFormula> {
        self.formula.as_ref()
    }

    /// Create a query against the current snapshot of a storage.
    pub fn create_query(&self, client: &StorageClient) -> Result<Query> {
        if client.is_closed() {
            return Err(QuarryError::invalid_operation("storage is closed"));
        }
        if let Some(formula) = &self.formula {
            if formula.arity() > self.weighting.len() {
                return Err(QuarryError::config(format!(
                    "weighting formula '{formula}' references _{} but only {} weighting functions are defined",
                    formula.arity() - 1,
                    self.weighting.len()
                )));
            }
        }
        Ok(Query::new(self.clone(), client.snapshot()))
    }

    /// Evaluate independent queries in parallel.
    pub fn evaluate_batch(queries: &mut [Query]) -> Vec<Result<QueryResult>> {
        queries.par_iter_mut().map(Query::evaluate).collect()
    }
}

impl fmt::Debug for QueryEval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryEval")
            .field("selection", &self.selection)
            .field("restriction", &self.restriction)
            .field("exclusion", &self.exclusion)
            .field("terms", &self.terms)
            .field("weighting", &self.weighting)
            .field("formula", &self.formula)
            .field("summarizers", &self.summarizers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::config::IndexConfig;
    use crate::index::document::AnalyzedDocument;

    fn client() -> StorageClient {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let mut txn = client.transaction().unwrap();
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", "a b a");
        txn.insert_document("d1", doc).unwrap();
        txn.commit().unwrap();
        client
    }

    #[test]
    fn test_formula_arity_checked_at_query_creation() {
        let client = client();
        let mut eval = QueryEval::new();
        eval.add_weighting_function(&FunctionConfig::new("tf").feature("match", "seek"))
            .unwrap();
        eval.define_weighting_formula("_0 + _1", &BTreeMap::new()).unwrap();
        assert!(matches!(eval.create_query(&client), Err(QuarryError::Config(_))));
        eval.add_weighting_function(&FunctionConfig::new("constant")).unwrap();
        assert!(eval.create_query(&client).is_ok());
    }

    #[test]
    fn test_unknown_function() {
        let mut eval = QueryEval::new();
        assert!(eval.add_weighting_function(&FunctionConfig::new("nope")).is_err());
        assert!(eval.add_summarizer(&FunctionConfig::new("nope")).is_err());
        assert!(eval.weighting.is_empty());
    }

    #[test]
    fn test_context_features_use_term_statistics() {
        let client = client();
        let snapshot = client.snapshot();
        let features = vec![
            QueryFeature::new("seek", Expression::term("word", "a"), 1.0),
            QueryFeature::new("seek", Expression::term("word", "b"), 2.0),
            QueryFeature::new("other", Expression::term("word", "b"), 1.0),
        ];
        let mut stats = BTreeMap::new();
        stats.insert(Term::new("word", "b"), 40);
        let ctx = EvalContext::new(&snapshot, &features, &stats, 100);
        let seek = ctx.features("seek").unwrap();
        assert_eq!(seek.len(), 2);
        assert_eq!(seek[0].document_frequency, 1);
        assert_eq!(seek[1].document_frequency, 40);
        assert_eq!(seek[1].weight, 2.0);
        assert_eq!(ctx.nof_documents(), 100);
    }
}
