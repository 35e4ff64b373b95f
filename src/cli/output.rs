//! Output formatting for CLI commands.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, QuarryArgs};
use crate::error::Result;
use crate::index::CommitSummary;
use crate::query::QueryResult;
use crate::statistics::StatisticsMessage;

/// Result of a create or destroy command.
#[derive(Debug, Serialize, Deserialize)]
pub struct StorageResult {
    pub path: String,
    pub config: String,
}

impl fmt::Display for StorageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "path:   {}", self.path)?;
        writeln!(f, "config: {}", self.config)
    }
}

/// Result of an insert or delete command.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CommitResult {
    pub transactions: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub nof_documents: usize,
    pub duration_ms: u64,
}

impl CommitResult {
    pub fn add(&mut self, summary: &CommitSummary) {
        self.transactions += 1;
        self.inserted += summary.nof_inserted;
        self.updated += summary.nof_updated;
        self.deleted += summary.nof_deleted;
    }
}

impl fmt::Display for CommitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "transactions: {}", self.transactions)?;
        writeln!(f, "inserted:     {}", self.inserted)?;
        writeln!(f, "updated:      {}", self.updated)?;
        writeln!(f, "deleted:      {}", self.deleted)?;
        writeln!(f, "documents:    {}", self.nof_documents)?;
        writeln!(f, "duration:     {} ms", self.duration_ms)
    }
}

/// A ranked document as printed by the query command.
#[derive(Debug, Serialize, Deserialize)]
pub struct RankOutput {
    pub docno: u32,
    pub docid: Option<String>,
    pub weight: f64,
    pub summary: Vec<(String, String)>,
}

/// Result of a query command.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueryOutput {
    pub nof_ranked: usize,
    pub nof_visited: usize,
    pub ranks: Vec<RankOutput>,
    pub duration_ms: u64,
}

impl QueryOutput {
    pub fn new<F>(result: QueryResult, docid: F, duration_ms: u64) -> Self
    where
        F: Fn(u32) -> Option<String>,
    {
        let ranks = result
            .ranks
            .into_iter()
            .map(|rank| RankOutput {
                docno: rank.docno,
                docid: docid(rank.docno),
                weight: rank.weight,
                summary: rank
                    .summary
                    .into_iter()
                    .map(|element| (element.name, element.value))
                    .collect(),
            })
            .collect();
        QueryOutput {
            nof_ranked: result.nof_ranked,
            nof_visited: result.nof_visited,
            ranks,
            duration_ms,
        }
    }
}

impl fmt::Display for QueryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ranked {} of {} visited documents in {} ms",
            self.nof_ranked, self.nof_visited, self.duration_ms
        )?;
        for (idx, rank) in self.ranks.iter().enumerate() {
            writeln!(
                f,
                "{:>3}. [{}] {} weight={:.5}",
                idx + 1,
                rank.docno,
                rank.docid.as_deref().unwrap_or("-"),
                rank.weight
            )?;
            for (name, value) in &rank.summary {
                writeln!(f, "       {name}: {value}")?;
            }
        }
        Ok(())
    }
}

/// Statistics summary.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatsSummary {
    pub nof_documents: usize,
    pub max_docno: u32,
    pub term_types: Vec<String>,
    pub users: Vec<String>,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "documents:  {}", self.nof_documents)?;
        writeln!(f, "max docno:  {}", self.max_docno)?;
        writeln!(f, "term types: {}", self.term_types.join(", "))?;
        if !self.users.is_empty() {
            writeln!(f, "users:      {}", self.users.join(", "))?;
        }
        Ok(())
    }
}

/// Decoded statistics blobs.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlobsOutput {
    pub blobs: Vec<StatisticsMessage>,
    pub bytes: usize,
}

impl fmt::Display for BlobsOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} blobs, {} bytes", self.blobs.len(), self.bytes)?;
        for blob in &self.blobs {
            writeln!(
                f,
                "{} part {} {:?} nofdocs {:+}",
                blob.timestamp, blob.part, blob.origin, blob.nofdocs_delta
            )?;
            for change in &blob.changes {
                writeln!(f, "  {} {:+}", change.term, change.increment)?;
            }
        }
        Ok(())
    }
}

/// Name/value rows.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Rows {
    pub rows: Vec<Vec<(String, String)>>,
}

impl fmt::Display for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|(name, value)| format!("{name}={value}")).collect();
            writeln!(f, "{}", cells.join(" "))?;
        }
        Ok(())
    }
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize + fmt::Display>(message: &str, result: &T, args: &QuarryArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: fmt::Display>(message: &str, result: &T, args: &QuarryArgs) -> Result<()> {
    if args.verbosity() > 0 && !message.is_empty() {
        println!("{message}");
    }
    print!("{result}");
    Ok(())
}

fn output_json<T: Serialize>(result: &T, args: &QuarryArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Rank, SummaryElement};

    #[test]
    fn test_query_output() {
        let result = QueryResult {
            nof_ranked: 2,
            nof_visited: 3,
            ranks: vec![Rank {
                docno: 7,
                weight: 1.5,
                summary: vec![SummaryElement::new("title", "Tokyo")],
            }],
        };
        let output = QueryOutput::new(result, |docno| Some(format!("doc{docno}")), 4);
        let text = output.to_string();
        assert!(text.starts_with("ranked 2 of 3 visited documents in 4 ms\n"));
        assert!(text.contains("  1. [7] doc7 weight=1.50000\n"));
        assert!(text.contains("title: Tokyo"));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["ranks"][0]["docid"], "doc7");
    }

    #[test]
    fn test_commit_result() {
        let mut result = CommitResult::default();
        result.add(&CommitSummary {
            nof_inserted: 3,
            nof_updated: 1,
            ..CommitSummary::default()
        });
        result.add(&CommitSummary {
            nof_deleted: 2,
            ..CommitSummary::default()
        });
        assert_eq!(result.transactions, 2);
        assert_eq!((result.inserted, result.updated, result.deleted), (3, 1, 2));
    }
}
