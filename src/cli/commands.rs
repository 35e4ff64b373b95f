//! Command implementations for the quarry CLI.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Instant;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::error::{QuarryError, Result};
use crate::index::document::IndexTerm;
use crate::index::{AnalyzedDocument, DocumentBrowser, NumericValue, Selector, StorageClient, Term};
use crate::query::{CompareOperator, QueryEval, QueryFeature};
use crate::query::weighting::FunctionConfig;
use crate::statistics::StatisticsMessage;

/// Execute a CLI command.
pub fn execute_command(args: QuarryArgs) -> Result<()> {
    match &args.command {
        Command::Create(storage) => create_storage(storage, &args),
        Command::Destroy(storage) => destroy_storage(storage, &args),
        Command::Insert(insert_args) => insert_documents(insert_args, &args),
        Command::Delete(delete_args) => delete_documents(delete_args, &args),
        Command::Query(query_args) => evaluate_query(query_args, &args),
        Command::Stats(stats_args) => show_stats(stats_args, &args),
        Command::Inspect(inspect_args) => inspect(inspect_args, &args),
    }
}

fn create_storage(storage: &StorageArgs, cli_args: &QuarryArgs) -> Result<()> {
    let config = storage.config()?;
    let client = StorageClient::create(config)?;
    let result = StorageResult {
        path: path_of(&client),
        config: client.config().to_string(),
    };
    client.close()?;
    output_result("Storage created", &result, cli_args)
}

fn destroy_storage(storage: &StorageArgs, cli_args: &QuarryArgs) -> Result<()> {
    let config = storage.config()?;
    StorageClient::destroy(&config)?;
    let result = StorageResult {
        path: config
            .path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        config: config.to_string(),
    };
    output_result("Storage destroyed", &result, cli_args)
}

fn path_of(client: &StorageClient) -> String {
    client
        .config()
        .path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

/// One line of an insert file.
///
/// `text` maps a term type to whitespace separated tokens that go into both
/// the search and the forward index. `search` and `forward` list explicit
/// term occurrences.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInput {
    pub docid: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub text: BTreeMap<String, String>,
    #[serde(default)]
    pub search: Vec<IndexTerm>,
    #[serde(default)]
    pub forward: Vec<IndexTerm>,
    #[serde(default)]
    pub access: Vec<String>,
}

/// Convert a JSON number to a metadata value.
pub fn numeric_value(name: &str, value: &Value) -> Result<NumericValue> {
    let Value::Number(number) = value else {
        return Err(QuarryError::config(format!("metadata '{name}' expects a number, got {value}")));
    };
    if let Some(v) = number.as_u64() {
        Ok(NumericValue::UInt(v))
    } else if let Some(v) = number.as_i64() {
        Ok(NumericValue::Int(v))
    } else if let Some(v) = number.as_f64() {
        Ok(NumericValue::Float(v))
    } else {
        Err(QuarryError::config(format!("metadata '{name}' has an unsupported number {number}")))
    }
}

impl DocumentInput {
    pub fn into_document(self) -> Result<(String, AnalyzedDocument)> {
        let mut doc = AnalyzedDocument::new();
        doc.attributes = self.attributes;
        for (name, value) in &self.metadata {
            doc.set_metadata(name.clone(), numeric_value(name, value)?);
        }
        doc.search_index = self.search;
        doc.forward_index = self.forward;
        for (term_type, text) in &self.text {
            doc.add_text(term_type, text);
        }
        doc.access = self.access;
        Ok((self.docid, doc))
    }
}

fn read_documents(path: &Path) -> Result<Vec<(String, AnalyzedDocument)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut documents = Vec::new();
    for (line_num, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let input: DocumentInput = serde_json::from_str(&line).map_err(|e| {
            QuarryError::config(format!("{}:{}: {e}", path.display(), line_num + 1))
        })?;
        documents.push(input.into_document()?);
    }
    Ok(documents)
}

fn insert_documents(args: &InsertArgs, cli_args: &QuarryArgs) -> Result<()> {
    let client = StorageClient::open(args.storage.config()?)?;
    let start_time = Instant::now();
    let documents = read_documents(&args.document_file)?;
    info!("inserting {} documents from {}", documents.len(), args.document_file.display());

    let mut result = CommitResult::default();
    for batch in documents.chunks(args.batch_size.max(1)) {
        let mut txn = client.transaction()?;
        for (docid, doc) in batch {
            if args.update {
                txn.update_document(docid, doc.clone())?;
            } else {
                txn.insert_document(docid, doc.clone())?;
            }
        }
        let summary = txn.commit()?;
        debug!("committed batch of {} documents at {}", batch.len(), summary.timestamp);
        result.add(&summary);
    }
    result.nof_documents = client.nof_documents_inserted();
    result.duration_ms = start_time.elapsed().as_millis() as u64;
    client.close()?;
    output_result("Documents inserted", &result, cli_args)
}

fn delete_documents(args: &DeleteArgs, cli_args: &QuarryArgs) -> Result<()> {
    let client = StorageClient::open(args.storage.config()?)?;
    let start_time = Instant::now();
    let mut txn = client.transaction()?;
    for docid in &args.docids {
        txn.delete_document(docid)?;
    }
    let mut result = CommitResult::default();
    result.add(&txn.commit()?);
    result.nof_documents = client.nof_documents_inserted();
    result.duration_ms = start_time.elapsed().as_millis() as u64;
    client.close()?;
    output_result("Documents deleted", &result, cli_args)
}

/// A metadata restriction condition of a query file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionInput {
    pub op: CompareOperator,
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub new_group: bool,
}

/// Query description file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryInput {
    #[serde(default)]
    pub selection: Vec<String>,
    #[serde(default)]
    pub restriction: Vec<String>,
    #[serde(default)]
    pub exclusion: Vec<String>,
    #[serde(default)]
    pub features: Vec<QueryFeature>,
    #[serde(default)]
    pub weighting: Vec<FunctionConfig>,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, f64>,
    #[serde(default)]
    pub summarizers: Vec<FunctionConfig>,
    #[serde(default)]
    pub conditions: Vec<ConditionInput>,
    #[serde(default)]
    pub access: Vec<String>,
    #[serde(default)]
    pub min_rank: Option<usize>,
    #[serde(default)]
    pub max_nof_ranks: Option<usize>,
}

impl QueryInput {
    /// The evaluation scheme of the query.
    pub fn eval(&self) -> Result<QueryEval> {
        let mut eval = QueryEval::new();
        for set in &self.selection {
            eval.add_selection_feature(set);
        }
        for set in &self.restriction {
            eval.add_restriction_feature(set);
        }
        for set in &self.exclusion {
            eval.add_exclusion_feature(set);
        }
        for function in &self.weighting {
            eval.add_weighting_function(function)?;
        }
        if let Some(formula) = &self.formula {
            eval.define_weighting_formula(formula, &BTreeMap::new())?;
        }
        for summarizer in &self.summarizers {
            eval.add_summarizer(summarizer)?;
        }
        Ok(eval)
    }
}

fn evaluate_query(args: &QueryArgs, cli_args: &QuarryArgs) -> Result<()> {
    let client = StorageClient::open(args.storage.config()?)?;
    let input: QueryInput = serde_json::from_str(&fs::read_to_string(&args.query_file)?)?;
    let eval = input.eval()?;

    let start_time = Instant::now();
    let mut query = eval.create_query(&client)?;
    for feature in &input.features {
        query.define_feature(&feature.set, feature.expression.clone(), feature.weight)?;
    }
    for condition in &input.conditions {
        let value = numeric_value(&condition.name, &condition.value)?;
        query.add_metadata_restriction_condition(condition.op, &condition.name, value, condition.new_group)?;
    }
    for user in &input.access {
        query.add_access(user)?;
    }
    if !input.variables.is_empty() {
        query.set_weighting_variables(input.variables.clone())?;
    }
    if let Some(min_rank) = args.min_rank.or(input.min_rank) {
        query.set_min_rank(min_rank)?;
    }
    if let Some(max_nof_ranks) = args.max_nof_ranks.or(input.max_nof_ranks) {
        query.set_max_nof_ranks(max_nof_ranks)?;
    }
    query.set_debug_mode(args.debug)?;
    if args.dump {
        eprint!("{query}");
    }

    let result = query.evaluate()?;
    let snapshot = query.snapshot();
    let output = QueryOutput::new(
        result,
        |docno| snapshot.docid(docno).map(str::to_string),
        start_time.elapsed().as_millis() as u64,
    );
    output_result("", &output, cli_args)
}

fn parse_term(s: &str) -> Result<Term> {
    let (term_type, value) = s
        .split_once(':')
        .ok_or_else(|| QuarryError::config(format!("term '{s}' is not <type>:<value>")))?;
    Ok(Term::new(term_type, value))
}

fn show_stats(args: &StatsArgs, cli_args: &QuarryArgs) -> Result<()> {
    let client = StorageClient::open(args.storage.config()?)?;
    match args.mode {
        StatsMode::Summary => {
            let summary = StatsSummary {
                nof_documents: client.nof_documents_inserted(),
                max_docno: client.max_document_number(),
                term_types: client.term_types(),
                users: client.users(),
            };
            output_result("Statistics", &summary, cli_args)
        }
        StatsMode::Df => {
            let term = args
                .term
                .as_deref()
                .ok_or_else(|| QuarryError::config("--mode df requires --term <type>:<value>"))
                .and_then(parse_term)?;
            let row = vec![
                ("term".to_string(), term.to_string()),
                ("df".to_string(), client.document_frequency(&term).to_string()),
            ];
            output_result("", &Rows { rows: vec![row] }, cli_args)
        }
        StatsMode::Update | StatsMode::Init => {
            let blobs = match args.mode {
                StatsMode::Init => client.init_statistics(!args.deregister),
                _ => client.update_statistics(args.since()?)?,
            };
            let mut output = BlobsOutput {
                blobs: Vec::new(),
                bytes: 0,
            };
            for blob in blobs {
                let blob = blob?;
                output.bytes += blob.len();
                output.blobs.push(StatisticsMessage::decode(&blob)?);
            }
            output_result("Statistics blobs", &output, cli_args)
        }
    }
}

/// Parse a browse condition such as `date>=20`.
fn parse_condition(s: &str) -> Result<(String, CompareOperator, NumericValue)> {
    let idx = s
        .find(['<', '>', '=', '!'])
        .ok_or_else(|| QuarryError::config(format!("condition '{s}' has no operator")))?;
    let (name, rest) = s.split_at(idx);
    let op_len = rest
        .find(|c: char| !matches!(c, '<' | '>' | '=' | '!'))
        .unwrap_or(rest.len());
    let (op, value) = rest.split_at(op_len);
    let value: Value = serde_json::from_str(value.trim())
        .map_err(|_| QuarryError::config(format!("condition '{s}' needs a numeric value")))?;
    let name = name.trim().to_string();
    let value = numeric_value(&name, &value)?;
    Ok((name, op.parse()?, value))
}

fn document_number(client: &StorageClient, key: Option<&str>) -> Result<u32> {
    let key = key.ok_or_else(|| QuarryError::config("a document id or number is required"))?;
    match key.parse::<u32>() {
        Ok(docno) if client.document_id(docno).is_some() => Ok(docno),
        _ => client
            .document_number(key)
            .ok_or_else(|| QuarryError::config(format!("unknown document '{key}'"))),
    }
}

fn inspect(args: &InspectArgs, cli_args: &QuarryArgs) -> Result<()> {
    let client = StorageClient::open(args.storage.config()?)?;
    let key = args.key.as_deref();
    let mut rows = Rows::default();
    match args.what {
        InspectWhat::Docno => {
            let docid = key.ok_or_else(|| QuarryError::config("a document id is required"))?;
            let docno = client
                .document_number(docid)
                .ok_or_else(|| QuarryError::config(format!("unknown document id '{docid}'")))?;
            rows.rows.push(vec![("docno".to_string(), docno.to_string())]);
        }
        InspectWhat::Docid => {
            let docno = document_number(&client, key)?;
            let docid = client.document_id(docno).unwrap_or_default();
            rows.rows.push(vec![("docid".to_string(), docid)]);
        }
        InspectWhat::Forward => {
            let docno = document_number(&client, key)?;
            let types = match &args.term_type {
                Some(term_type) => vec![term_type.clone()],
                None => client.term_types(),
            };
            for term_type in types {
                for entry in client.forward_index(docno, &term_type) {
                    rows.rows.push(vec![
                        ("type".to_string(), term_type.clone()),
                        ("pos".to_string(), entry.position.to_string()),
                        ("value".to_string(), entry.value),
                    ]);
                }
            }
        }
        InspectWhat::Access => {
            let docno = document_number(&client, key)?;
            for user in client.access(docno) {
                rows.rows.push(vec![("user".to_string(), user)]);
            }
        }
        InspectWhat::Browse => {
            let selectors = args
                .select
                .iter()
                .map(|s| s.parse())
                .collect::<Result<Vec<Selector>>>()?;
            let mut browser = DocumentBrowser::new(client.snapshot());
            for condition in &args.conditions {
                let (name, op, value) = parse_condition(condition)?;
                browser.add_metadata_restriction_condition(op, &name, value, true)?;
            }
            let mut docno = browser.skip_doc(1);
            while docno != 0 {
                if let Some(values) = browser.get(docno, &selectors) {
                    rows.rows.push(values);
                }
                docno = browser.skip_doc(docno + 1);
            }
        }
    }
    output_result("", &rows, cli_args)
}
