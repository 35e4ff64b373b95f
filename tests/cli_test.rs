//! Integration tests for the command line front end.

use std::fs;

use clap::Parser;
use quarry::cli::args::QuarryArgs;
use quarry::cli::commands::execute_command;
use quarry::error::Result;
use quarry::index::{IndexConfig, StorageClient, Term};
use tempfile::TempDir;

fn run(args: &[&str]) -> Result<()> {
    let mut argv = vec!["quarry", "--quiet", "--format", "json"];
    argv.extend_from_slice(args);
    execute_command(QuarryArgs::try_parse_from(argv).map_err(anyhow::Error::from)?)
}

#[test]
fn test_create_insert_query_delete() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("storage");
    let storage = format!("path={};metadata='date UINT16'", path.display());

    run(&["create", &storage])?;
    assert!(run(&["create", &storage]).is_err());

    let docs = dir.path().join("docs.jsonl");
    fs::write(
        &docs,
        concat!(
            r#"{"docid": "8", "text": {"word": "2 2 2"}, "metadata": {"date": 1}}"#,
            "\n",
            r#"{"docid": "9", "text": {"word": "3 3"}, "metadata": {"date": 2}}"#,
            "\n\n",
        ),
    )?;
    run(&["insert", &storage, docs.to_str().unwrap_or_default(), "--batch-size", "1"])?;
    assert!(run(&["insert", &storage, docs.to_str().unwrap_or_default()]).is_err());
    run(&["insert", &storage, docs.to_str().unwrap_or_default(), "--update"])?;

    let query = dir.path().join("query.json");
    fs::write(
        &query,
        r#"{
            "selection": ["select"],
            "features": [
                {"set": "select", "expression": {"structure": {"operator": "contains", "cardinality": 1,
                    "children": [{"term": {"type": "word", "value": "2"}}, {"term": {"type": "word", "value": "3"}}]}}},
                {"set": "seek", "expression": {"term": {"type": "word", "value": "2"}}}
            ],
            "weighting": [{"name": "bm25", "params": {"k1": 0.75, "b": 2.1, "avgdoclen": 8, "match": {"feature": "seek"}}}],
            "summarizers": [{"name": "attribute", "params": {"name": "docid"}}]
        }"#,
    )?;
    run(&["query", &storage, query.to_str().unwrap_or_default(), "-n", "1"])?;
    run(&["stats", &storage, "--mode", "update"])?;
    run(&["stats", &storage, "--mode", "df", "--term", "word:2"])?;
    run(&["inspect", &storage, "forward", "8", "--type", "word"])?;
    run(&["inspect", &storage, "browse", "--select", "docid,metadata:date", "--where", "date>=2"])?;
    run(&["delete", &storage, "8"])?;

    let client = StorageClient::open(IndexConfig::at(&path))?;
    assert_eq!(client.nof_documents_inserted(), 1);
    assert_eq!(client.document_frequency(&Term::new("word", "3")), 1);
    assert_eq!(client.document_frequency(&Term::new("word", "2")), 0);
    client.close()?;

    run(&["destroy", &storage])?;
    assert!(!path.exists());
    Ok(())
}
