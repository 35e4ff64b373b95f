//! Query sessions.
//!
//! A [`Query`] is created by [`QueryEval::create_query`] in state
//! [`QueryState::Built`]. Features, restrictions and paging are defined in
//! that state only. [`Query::evaluate`] walks the selected documents of the
//! snapshot taken at creation, ranks them and returns the requested page
//! with summaries.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, trace, warn};

use crate::error::{QuarryError, Result};
use crate::index::document::NumericValue;
use crate::index::snapshot::{Snapshot, SnapshotView};
use crate::index::types::{DocNo, Term};
use crate::query::collector::RankCollector;
use crate::query::eval::{EvalContext, QueryEval, QueryFeature};
use crate::query::expression::Expression;
use crate::query::posting::{AccessIterator, DocumentSetIterator, PostingIterator, UnionIterator, compile};
use crate::query::restriction::{CompareOperator, CompiledRestriction, MetaDataRestriction};
use crate::query::result::{QueryResult, Rank, SummaryElement};
use crate::query::summarizer::SummarizerExecution;
use crate::query::weighting::WeightingExecution;

/// Default number of ranks returned.
pub const DEFAULT_MAX_NOF_RANKS: usize = 20;

/// Lifecycle of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Built,
    Evaluating,
    Ranked,
    Paginated,
    Returned,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Built => "built",
            QueryState::Evaluating => "evaluating",
            QueryState::Ranked => "ranked",
            QueryState::Paginated => "paginated",
            QueryState::Returned => "returned",
        };
        f.write_str(name)
    }
}

/// A query bound to a storage snapshot.
#[derive(Debug)]
pub struct Query {
    eval: QueryEval,
    snapshot: SnapshotView,
    state: QueryState,
    features: Vec<QueryFeature>,
    restriction: MetaDataRestriction,
    evaluation_set: Option<Vec<DocNo>>,
    term_statistics: BTreeMap<Term, usize>,
    nof_documents: Option<usize>,
    max_nof_ranks: usize,
    min_rank: usize,
    users: Vec<String>,
    variables: BTreeMap<String, f64>,
    debug: bool,
}

/// Candidate filters of one evaluation run.
struct Filters {
    restrictions: Vec<Box<dyn PostingIterator>>,
    exclusions: Vec<Box<dyn PostingIterator>>,
    access: Option<AccessIterator>,
    evaluation_set: Option<DocumentSetIterator>,
    metadata: Option<CompiledRestriction>,
}

impl Filters {
    fn accept(&mut self, snapshot: &Snapshot, docno: DocNo) -> bool {
        if let Some(access) = &mut self.access {
            if access.skip_doc(docno) != docno {
                return false;
            }
        }
        if let Some(set) = &mut self.evaluation_set {
            if set.skip_doc(docno) != docno {
                return false;
            }
        }
        if let Some(restriction) = &self.metadata {
            if !restriction.matches(snapshot.metadata(), docno) {
                return false;
            }
        }
        if self.restrictions.iter_mut().any(|it| it.skip_doc(docno) != docno) {
            return false;
        }
        !self.exclusions.iter_mut().any(|it| it.skip_doc(docno) == docno)
    }
}

impl Query {
    pub(crate) fn new(eval: QueryEval, snapshot: SnapshotView) -> Self {
        Query {
            eval,
            snapshot,
            state: QueryState::Built,
            features: Vec::new(),
            restriction: MetaDataRestriction::new(),
            evaluation_set: None,
            term_statistics: BTreeMap::new(),
            nof_documents: None,
            max_nof_ranks: DEFAULT_MAX_NOF_RANKS,
            min_rank: 0,
            users: Vec::new(),
            variables: BTreeMap::new(),
            debug: false,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// The snapshot the query evaluates against.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    fn ensure_built(&self, operation: &str) -> Result<()> {
        if self.state != QueryState::Built {
            return Err(QuarryError::invalid_operation(format!(
                "{operation} is not allowed on a query in state {}",
                self.state
            )));
        }
        Ok(())
    }

    fn transition(&mut self, next: QueryState) {
        debug!("query state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Assign an expression to feature set `set`.
    pub fn define_feature(&mut self, set: &str, expression: Expression, weight: f64) -> Result<()> {
        self.ensure_built("define_feature")?;
        compile(&expression, &self.snapshot)?;
        self.features.push(QueryFeature::new(set, expression, weight));
        Ok(())
    }

    /// See [`MetaDataRestriction::add_condition`].
    pub fn add_metadata_restriction_condition(
        &mut self,
        operator: CompareOperator,
        column: &str,
        value: NumericValue,
        new_group: bool,
    ) -> Result<()> {
        self.ensure_built("add_metadata_restriction_condition")?;
        self.restriction.add_condition(operator, column, value, new_group);
        Ok(())
    }

    /// Only documents of `docnos` are ranked. Repeated calls extend the set.
    pub fn add_document_evaluation_set(&mut self, docnos: &[DocNo]) -> Result<()> {
        self.ensure_built("add_document_evaluation_set")?;
        self.evaluation_set
            .get_or_insert_with(Vec::new)
            .extend_from_slice(docnos);
        Ok(())
    }

    /// Document frequency of `term` used for weighting instead of the local one.
    pub fn define_term_statistics(&mut self, term: Term, document_frequency: usize) -> Result<()> {
        self.ensure_built("define_term_statistics")?;
        self.term_statistics.insert(term, document_frequency);
        Ok(())
    }

    /// Collection size used for weighting instead of the local one.
    pub fn define_global_statistics(&mut self, nof_documents: usize) -> Result<()> {
        self.ensure_built("define_global_statistics")?;
        self.nof_documents = Some(nof_documents);
        Ok(())
    }

    pub fn set_max_nof_ranks(&mut self, max_nof_ranks: usize) -> Result<()> {
        self.ensure_built("set_max_nof_ranks")?;
        self.max_nof_ranks = max_nof_ranks;
        Ok(())
    }

    pub fn set_min_rank(&mut self, min_rank: usize) -> Result<()> {
        self.ensure_built("set_min_rank")?;
        self.min_rank = min_rank;
        Ok(())
    }

    /// Rank only documents visible to at least one of the added users.
    pub fn add_access(&mut self, user: &str) -> Result<()> {
        self.ensure_built("add_access")?;
        if !self.snapshot.acl_enabled() {
            warn!("access '{user}' ignored, storage has no access control");
        }
        self.users.push(user.to_string());
        Ok(())
    }

    /// Override variables of the weighting formula.
    pub fn set_weighting_variables(&mut self, variables: BTreeMap<String, f64>) -> Result<()> {
        self.ensure_built("set_weighting_variables")?;
        match self.eval.formula() {
            Some(formula) => {
                formula.bind(&variables)?;
            }
            None => {
                if let Some(name) = variables.keys().next() {
                    return Err(QuarryError::config(format!(
                        "variable '{name}' defined but no weighting formula"
                    )));
                }
            }
        }
        self.variables = variables;
        Ok(())
    }

    /// Emit debug summary elements of functions with a `debug` parameter.
    pub fn set_debug_mode(&mut self, debug: bool) -> Result<()> {
        self.ensure_built("set_debug_mode")?;
        self.debug = debug;
        Ok(())
    }

    /// Rank the selected documents and summarize the requested page.
    ///
    /// Allowed in state `Built` and again after a result was returned. An
    /// error aborts the evaluation and puts the query back into `Built`.
    pub fn evaluate(&mut self) -> Result<QueryResult> {
        if !matches!(self.state, QueryState::Built | QueryState::Returned) {
            return Err(QuarryError::invalid_operation(format!(
                "evaluate is not allowed on a query in state {}",
                self.state
            )));
        }
        self.transition(QueryState::Evaluating);
        match self.run() {
            Ok(result) => {
                self.transition(QueryState::Returned);
                Ok(result)
            }
            Err(err) => {
                debug!("query evaluation failed: {err}");
                self.state = QueryState::Built;
                Err(err)
            }
        }
    }

    fn all_features(&self) -> Vec<QueryFeature> {
        self.eval.terms.iter().chain(self.features.iter()).cloned().collect()
    }

    fn filters(&self, ctx: &EvalContext<'_>) -> Result<Filters> {
        let snapshot = ctx.snapshot();
        let mut restrictions = Vec::new();
        for set in &self.eval.restriction {
            restrictions.extend(ctx.features(set)?.into_iter().map(|f| f.iterator));
        }
        let mut exclusions = Vec::new();
        for set in &self.eval.exclusion {
            exclusions.extend(ctx.features(set)?.into_iter().map(|f| f.iterator));
        }
        let access = (snapshot.acl_enabled() && !self.users.is_empty())
            .then(|| AccessIterator::new(snapshot.access().lists_for(&self.users)));
        let evaluation_set = self.evaluation_set.clone().map(DocumentSetIterator::new);
        let metadata = if self.restriction.is_empty() {
            None
        } else {
            Some(self.restriction.compile(snapshot.metadata().schema())?)
        };
        Ok(Filters {
            restrictions,
            exclusions,
            access,
            evaluation_set,
            metadata,
        })
    }

    fn run(&mut self) -> Result<QueryResult> {
        let view = self.snapshot.clone();
        let snapshot: &Snapshot = &view;
        let features = self.all_features();
        let term_statistics = self.term_statistics.clone();
        let nof_documents = self.nof_documents.unwrap_or_else(|| snapshot.nof_documents());
        let ctx = EvalContext::new(snapshot, &features, &term_statistics, nof_documents);

        let mut selected = Vec::new();
        for set in &self.eval.selection {
            selected.extend(ctx.features(set)?.into_iter().map(|f| f.iterator));
        }
        let mut filters = self.filters(&ctx)?;
        let mut weighting = self
            .eval
            .weighting
            .iter()
            .map(|function| function.instance(&ctx))
            .collect::<Result<Vec<Box<dyn WeightingExecution>>>>()?;
        let variables = match self.eval.formula() {
            Some(formula) => formula.bind(&self.variables)?,
            None => Vec::new(),
        };

        let mut collector = RankCollector::new(self.min_rank.saturating_add(self.max_nof_ranks));
        let mut nof_visited = 0;
        if !selected.is_empty() {
            let mut selection = UnionIterator::new(selected);
            let mut docno = selection.skip_doc(1);
            while docno != 0 {
                nof_visited += 1;
                if filters.accept(snapshot, docno) {
                    let args = weighting
                        .iter_mut()
                        .map(|w| w.call(snapshot, docno))
                        .collect::<Result<Vec<f64>>>()?;
                    let weight = match self.eval.formula() {
                        Some(formula) => formula.evaluate(&args, &variables)?,
                        None => args.iter().sum(),
                    };
                    trace!("rank candidate docno={docno} weight={weight}");
                    collector.collect(docno, weight);
                }
                docno = match docno.checked_add(1) {
                    Some(next) => selection.skip_doc(next),
                    None => 0,
                };
            }
        }
        let nof_ranked = collector.nof_collected();
        let ranked = collector.into_sorted();
        self.transition(QueryState::Ranked);

        let page: Vec<(DocNo, f64)> = ranked
            .into_iter()
            .skip(self.min_rank)
            .take(self.max_nof_ranks)
            .collect();
        self.transition(QueryState::Paginated);

        let mut summarizers = self
            .eval
            .summarizers
            .iter()
            .map(|function| function.instance(&ctx))
            .collect::<Result<Vec<Box<dyn SummarizerExecution>>>>()?;
        let mut ranks = Vec::with_capacity(page.len());
        for (docno, weight) in page {
            let mut summary = Vec::new();
            for (idx, summarizer) in summarizers.iter_mut().enumerate() {
                let elements = summarizer.summarize(snapshot, docno)?;
                if self.debug {
                    if let Some(name) = self.eval.summarizers[idx].debug_name() {
                        let explain = format!("{}: {} elements", self.eval.summarizers[idx].describe(), elements.len());
                        summary.push(SummaryElement::new(name, explain));
                    }
                }
                summary.extend(elements);
            }
            if self.debug {
                for (idx, execution) in weighting.iter_mut().enumerate() {
                    if let Some(name) = self.eval.weighting[idx].debug_name() {
                        let (value, explain) = execution.call_debug(snapshot, docno)?;
                        summary.push(SummaryElement::new(name, explain).with_weight(value));
                    }
                }
            }
            ranks.push(Rank {
                docno,
                weight,
                summary,
            });
        }
        debug!(
            "query evaluated: {nof_visited} visited, {nof_ranked} ranked, {} returned",
            ranks.len()
        );
        Ok(QueryResult {
            nof_ranked,
            nof_visited,
            ranks,
        })
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query evaluation program:")?;
        for set in &self.eval.selection {
            writeln!(f, "SELECT {set};")?;
        }
        for set in &self.eval.restriction {
            writeln!(f, "RESTRICT {set};")?;
        }
        for set in &self.eval.exclusion {
            writeln!(f, "EXCLUDE {set};")?;
        }
        for function in &self.eval.weighting {
            writeln!(f, "EVAL {};", function.describe())?;
        }
        if let Some(formula) = self.eval.formula() {
            writeln!(f, "FORMULA {formula};")?;
        }
        for summarizer in &self.eval.summarizers {
            writeln!(f, "SUMMARIZE {};", summarizer.describe())?;
        }
        for feature in self.eval.terms.iter().chain(self.features.iter()) {
            writeln!(f, "feature '{}' {:.5}:", feature.set, feature.weight)?;
            writeln!(f, "  {}", feature.expression)?;
        }
        if !self.restriction.is_empty() {
            writeln!(f, "restriction: {}", self.restriction)?;
        }
        if let Some(docnos) = &self.evaluation_set {
            let list: Vec<String> = docnos.iter().map(ToString::to_string).collect();
            writeln!(f, "evaluation set: {}", list.join(" "))?;
        }
        for (term, df) in &self.term_statistics {
            writeln!(f, "term statistics {term}: df={df}")?;
        }
        if let Some(n) = self.nof_documents {
            writeln!(f, "global statistics: nofdocs={n}")?;
        }
        for (name, value) in &self.variables {
            writeln!(f, "variable {name} = {value}")?;
        }
        writeln!(f, "maxNofRanks = {}", self.max_nof_ranks)?;
        writeln!(f, "minRank = {}", self.min_rank)?;
        if !self.users.is_empty() {
            writeln!(f, "user: {}", self.users.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::client::StorageClient;
    use crate::index::config::IndexConfig;
    use crate::index::document::AnalyzedDocument;
    use crate::query::weighting::FunctionConfig;

    fn client(texts: &[&str]) -> StorageClient {
        let client = StorageClient::create(IndexConfig::memory()).unwrap();
        let mut txn = client.transaction().unwrap();
        for (idx, text) in texts.iter().enumerate() {
            let mut doc = AnalyzedDocument::new();
            doc.add_text("word", text).set_attribute("docid", format!("doc{idx}"));
            txn.insert_document(&format!("doc{idx}"), doc).unwrap();
        }
        txn.commit().unwrap();
        client
    }

    fn tf_eval() -> QueryEval {
        let mut eval = QueryEval::new();
        eval.add_selection_feature("select");
        eval.add_weighting_function(&FunctionConfig::new("tf").feature("match", "seek"))
            .unwrap();
        eval
    }

    fn query(client: &StorageClient, eval: &QueryEval, value: &str) -> Query {
        let mut query = eval.create_query(client).unwrap();
        query
            .define_feature("select", Expression::term("word", value), 1.0)
            .unwrap();
        query
            .define_feature("seek", Expression::term("word", value), 1.0)
            .unwrap();
        query
    }

    #[test]
    fn test_rank_order_and_counts() {
        let client = client(&["a b", "a a a", "b", "a a"]);
        let mut query = query(&client, &tf_eval(), "a");
        let result = query.evaluate().unwrap();
        assert_eq!(result.nof_visited, 3);
        assert_eq!(result.nof_ranked, 3);
        assert_eq!(result.docnos(), vec![2, 4, 1]);
        assert_eq!(result.ranks[0].weight, 3.0);
        assert_eq!(query.state(), QueryState::Returned);
    }

    #[test]
    fn test_setters_only_in_built_state() {
        let client = client(&["a"]);
        let mut query = query(&client, &tf_eval(), "a");
        query.evaluate().unwrap();
        assert!(matches!(query.set_max_nof_ranks(3), Err(QuarryError::InvalidOperation(_))));
        assert!(query.add_access("x").is_err());
        assert!(query.define_feature("seek", Expression::term("word", "a"), 1.0).is_err());
        // re-evaluation after a returned result
        assert_eq!(query.evaluate().unwrap().docnos(), vec![1]);
    }

    #[test]
    fn test_pagination() {
        let client = client(&["a", "a a", "a a a", "a a a a", "a a a a a"]);
        let eval = tf_eval();
        let mut full = query(&client, &eval, "a");
        full.set_max_nof_ranks(4).unwrap();
        let full = full.evaluate().unwrap().docnos();
        assert_eq!(full, vec![5, 4, 3, 2]);

        let mut page = query(&client, &eval, "a");
        page.set_min_rank(2).unwrap();
        page.set_max_nof_ranks(2).unwrap();
        let result = page.evaluate().unwrap();
        assert_eq!(result.docnos(), full[2..4].to_vec());
        assert_eq!(result.nof_ranked, 5);
    }

    #[test]
    fn test_restriction_and_exclusion_sets() {
        let client = client(&["a b", "a c", "a", "b"]);
        let mut eval = tf_eval();
        eval.add_restriction_feature("must");
        eval.add_exclusion_feature("not");
        let mut q = query(&client, &eval, "a");
        q.define_feature("must", Expression::union(vec![
            Expression::term("word", "b"),
            Expression::term("word", "c"),
        ]), 1.0)
            .unwrap();
        q.define_feature("not", Expression::term("word", "c"), 1.0).unwrap();
        let result = q.evaluate().unwrap();
        assert_eq!(result.docnos(), vec![1]);
        assert_eq!(result.nof_visited, 3);
        assert_eq!(result.nof_ranked, 1);
    }

    #[test]
    fn test_evaluation_set() {
        let client = client(&["a", "a a", "a a a"]);
        let mut q = query(&client, &tf_eval(), "a");
        q.add_document_evaluation_set(&[1, 3]).unwrap();
        assert_eq!(q.evaluate().unwrap().docnos(), vec![3, 1]);
    }

    #[test]
    fn test_no_selection_gives_empty_result() {
        let client = client(&["a"]);
        let mut eval = QueryEval::new();
        eval.add_selection_feature("select");
        let mut q = eval.create_query(&client).unwrap();
        let result = q.evaluate().unwrap();
        assert!(result.is_empty());
        assert_eq!(result.nof_visited, 0);
    }

    #[test]
    fn test_formula_and_variables() {
        let client = client(&["a", "a a"]);
        let mut eval = tf_eval();
        let mut defaults = BTreeMap::new();
        defaults.insert("scale".to_string(), 2.0);
        eval.define_weighting_formula("_0 * scale", &defaults).unwrap();
        let mut q = query(&client, &eval, "a");
        let mut vars = BTreeMap::new();
        vars.insert("scale".to_string(), 10.0);
        q.set_weighting_variables(vars).unwrap();
        let result = q.evaluate().unwrap();
        assert_eq!(result.ranks[0].weight, 20.0);

        let mut q = query(&client, &eval, "a");
        let mut unknown = BTreeMap::new();
        unknown.insert("nope".to_string(), 1.0);
        assert!(q.set_weighting_variables(unknown).is_err());
    }

    #[test]
    fn test_division_by_zero_aborts_evaluation() {
        let client = client(&["a"]);
        let mut eval = tf_eval();
        eval.define_weighting_formula("_0 / 0", &BTreeMap::new()).unwrap();
        let mut q = query(&client, &eval, "a");
        assert!(matches!(q.evaluate(), Err(QuarryError::Evaluation(_))));
        assert_eq!(q.state(), QueryState::Built);
    }

    #[test]
    fn test_debug_elements_and_dump() {
        let client = client(&["a b"]);
        let mut eval = QueryEval::new();
        eval.add_selection_feature("select");
        eval.add_weighting_function(
            &FunctionConfig::new("tf")
                .feature("match", "seek")
                .param("debug", "debug_weight"),
        )
        .unwrap();
        eval.add_summarizer(&FunctionConfig::new("attribute").param("name", "docid"))
            .unwrap();
        let mut q = query(&client, &eval, "a");
        q.set_debug_mode(true).unwrap();
        let dump = q.to_string();
        assert!(dump.starts_with("query evaluation program:\nSELECT select;\n"));
        assert!(dump.contains("feature 'seek' 1.00000:\n  word 'a'\n"));
        assert!(dump.contains("maxNofRanks = 20\nminRank = 0\n"));

        let result = q.evaluate().unwrap();
        let rank = &result.ranks[0];
        assert_eq!(rank.element("docid").map(|e| e.value.as_str()), Some("doc0"));
        assert_eq!(rank.element("debug_weight").map(|e| e.weight), Some(1.0));
    }

    #[test]
    fn test_snapshot_taken_at_creation() {
        let client = client(&["a"]);
        let eval = tf_eval();
        let mut q = query(&client, &eval, "a");
        let mut txn = client.transaction().unwrap();
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", "a a");
        txn.insert_document("late", doc).unwrap();
        txn.commit().unwrap();
        assert_eq!(q.evaluate().unwrap().docnos(), vec![1]);
    }
}
