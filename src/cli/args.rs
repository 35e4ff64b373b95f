//! Command line argument parsing for the quarry CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::index::IndexConfig;
use crate::statistics::TimeStamp;

/// Quarry - a transactional inverted index storage with ranked query evaluation
#[derive(Parser, Debug, Clone)]
#[command(name = "quarry")]
#[command(about = "Transactional inverted index storage with ranked query evaluation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct QuarryArgs {
    /// Verbosity level (0=error, 1=warn, 2=info, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl QuarryArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new storage
    Create(StorageArgs),

    /// Delete a storage and all its files
    Destroy(StorageArgs),

    /// Insert analyzed documents from a JSONL file
    Insert(InsertArgs),

    /// Delete documents by id
    Delete(DeleteArgs),

    /// Evaluate a query described in a JSON file
    Query(QueryArgs),

    /// Show or export statistics
    Stats(StatsArgs),

    /// Inspect stored documents
    Inspect(InspectArgs),
}

/// Storage selection shared by all commands.
#[derive(Parser, Debug, Clone)]
pub struct StorageArgs {
    /// Storage directory or configuration string (`path=...;acl=true;...`)
    #[arg(value_name = "STORAGE")]
    pub storage: String,
}

impl StorageArgs {
    /// The configuration named on the command line. A bare path selects a
    /// storage directory with default settings.
    pub fn config(&self) -> Result<IndexConfig> {
        if self.storage.contains('=') {
            self.storage.parse()
        } else {
            Ok(IndexConfig::at(&self.storage))
        }
    }
}

/// Arguments for inserting documents
#[derive(Parser, Debug, Clone)]
pub struct InsertArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Document file (one JSON document per line)
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Replace documents that already exist
    #[arg(short, long)]
    pub update: bool,

    /// Number of documents per transaction
    #[arg(short, long, default_value = "1000")]
    pub batch_size: usize,
}

/// Arguments for deleting documents
#[derive(Parser, Debug, Clone)]
pub struct DeleteArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Document ids
    #[arg(value_name = "DOCID", required = true)]
    pub docids: Vec<String>,
}

/// Arguments for query evaluation
#[derive(Parser, Debug, Clone)]
pub struct QueryArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Query description file (JSON)
    #[arg(value_name = "QUERY_FILE")]
    pub query_file: PathBuf,

    /// Index of the first rank returned
    #[arg(long)]
    pub min_rank: Option<usize>,

    /// Maximum number of ranks returned
    #[arg(short = 'n', long)]
    pub max_nof_ranks: Option<usize>,

    /// Emit debug summary elements
    #[arg(long)]
    pub debug: bool,

    /// Print the query evaluation program before the result
    #[arg(long)]
    pub dump: bool,
}

/// What the stats command shows
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    /// Number of documents and term types
    Summary,
    /// Statistics blobs of all commits after `--since`
    Update,
    /// Full document frequency table as registration blobs
    Init,
    /// Document frequency of one term
    Df,
}

/// Arguments for statistics
#[derive(Parser, Debug, Clone)]
pub struct StatsArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// What to show
    #[arg(short, long, default_value = "summary")]
    pub mode: StatsMode,

    /// Timestamp `<unixtime>:<counter>` after which blobs are exported
    #[arg(long)]
    pub since: Option<String>,

    /// Term `<type>:<value>` for `--mode df`
    #[arg(long)]
    pub term: Option<String>,

    /// Deregistration blobs for `--mode init`
    #[arg(long)]
    pub deregister: bool,
}

impl StatsArgs {
    pub fn since(&self) -> Result<Option<TimeStamp>> {
        self.since.as_deref().map(parse_timestamp).transpose()
    }
}

/// Parse `<unixtime>:<counter>`.
pub fn parse_timestamp(s: &str) -> Result<TimeStamp> {
    let (unixtime, counter) = s
        .split_once(':')
        .ok_or_else(|| QuarryError::config(format!("timestamp '{s}' is not <unixtime>:<counter>")))?;
    let unixtime = unixtime
        .trim()
        .parse()
        .map_err(|_| QuarryError::config(format!("invalid unixtime in timestamp '{s}'")))?;
    let counter = counter
        .trim()
        .parse()
        .map_err(|_| QuarryError::config(format!("invalid counter in timestamp '{s}'")))?;
    Ok(TimeStamp::new(unixtime, counter))
}

/// What the inspect command looks up
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectWhat {
    /// Document number of a document id
    Docno,
    /// Document id of a document number
    Docid,
    /// Forward index of a document (`--type` selects the term type)
    Forward,
    /// Access tokens of a document
    Access,
    /// Selected values of all documents (`--select`, `--where`)
    Browse,
}

/// Arguments for inspecting documents
#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// What to look up
    #[arg(value_name = "WHAT")]
    pub what: InspectWhat,

    /// Document id or number
    #[arg(value_name = "KEY")]
    pub key: Option<String>,

    /// Term type for the forward index
    #[arg(short = 't', long = "type")]
    pub term_type: Option<String>,

    /// Selectors for browsing: docid, docno, attribute:<name>, metadata:<name>
    #[arg(short, long, value_delimiter = ',', default_value = "docid")]
    pub select: Vec<String>,

    /// Metadata conditions for browsing, e.g. `date>=20` (each one ANDed)
    #[arg(short, long = "where")]
    pub conditions: Vec<String>,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_command() {
        let args = QuarryArgs::try_parse_from([
            "quarry",
            "query",
            "/path/to/storage",
            "query.json",
            "-n",
            "5",
            "--min-rank",
            "10",
            "--debug",
        ])
        .unwrap();

        if let Command::Query(query_args) = args.command {
            assert_eq!(query_args.storage.storage, "/path/to/storage");
            assert_eq!(query_args.query_file, PathBuf::from("query.json"));
            assert_eq!(query_args.max_nof_ranks, Some(5));
            assert_eq!(query_args.min_rank, Some(10));
            assert!(query_args.debug);
        } else {
            panic!("Expected Query command");
        }
    }

    #[test]
    fn test_storage_config() {
        let args = StorageArgs {
            storage: "/data/quarry".to_string(),
        };
        let config = args.config().unwrap();
        assert_eq!(config.path, Some(PathBuf::from("/data/quarry")));
        assert!(!config.acl);

        let args = StorageArgs {
            storage: "path=/data/quarry;acl=true".to_string(),
        };
        assert!(args.config().unwrap().acl);

        let args = StorageArgs {
            storage: "path=/x;colour=red".to_string(),
        };
        assert!(args.config().is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        let args = QuarryArgs::try_parse_from(["quarry", "create", "x"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = QuarryArgs::try_parse_from(["quarry", "-vvv", "create", "x"]).unwrap();
        assert_eq!(args.verbosity(), 3);

        let args = QuarryArgs::try_parse_from(["quarry", "--quiet", "create", "x"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_stats_and_inspect() {
        let args = QuarryArgs::try_parse_from([
            "quarry", "--format", "json", "stats", "x", "--mode", "update", "--since", "100:3",
        ])
        .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        if let Command::Stats(stats) = args.command {
            assert_eq!(stats.mode, StatsMode::Update);
            assert_eq!(stats.since().unwrap(), Some(TimeStamp::new(100, 3)));
        } else {
            panic!("Expected Stats command");
        }

        let args = QuarryArgs::try_parse_from([
            "quarry",
            "inspect",
            "x",
            "browse",
            "--select",
            "docid,metadata:date",
            "--where",
            "date>=20",
        ])
        .unwrap();
        if let Command::Inspect(inspect) = args.command {
            assert_eq!(inspect.what, InspectWhat::Browse);
            assert_eq!(inspect.select, vec!["docid", "metadata:date"]);
            assert_eq!(inspect.conditions, vec!["date>=20"]);
        } else {
            panic!("Expected Inspect command");
        }
        assert!(parse_timestamp("12").is_err());
    }
}
