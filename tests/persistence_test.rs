//! Integration tests for on-disk storages.

use quarry::error::{QuarryError, Result};
use quarry::index::{AnalyzedDocument, IndexConfig, MetaDataSchema, NumericValue, StorageClient, Term};
use quarry::query::{Expression, FunctionConfig, QueryEval};
use tempfile::TempDir;

fn config(dir: &TempDir) -> IndexConfig {
    IndexConfig::builder()
        .path(dir.path().join("storage"))
        .acl(true)
        .metadata("date UINT16".parse::<MetaDataSchema>().unwrap_or_default())
        .build()
}

fn document() -> AnalyzedDocument {
    let mut doc = AnalyzedDocument::new();
    doc.add_search_term("word", "tokyo", 1)
        .add_search_term("word", "city", 4)
        .add_forward_term("orig", "Tokyo", 1)
        .add_forward_term("orig", "is", 2)
        .add_forward_term("orig", "a", 3)
        .add_forward_term("orig", "city", 4)
        .add_forward_term("orig", "!", 9)
        .set_attribute("title", "Tokyo")
        .set_metadata("date", 2020u32)
        .add_access("alice");
    doc
}

#[test]
fn test_reopen_restores_committed_state() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    assert!(!StorageClient::exists(&config));
    {
        let client = StorageClient::create(config.clone())?;
        let mut txn = client.transaction()?;
        txn.insert_document("tokyo", document())?;
        let mut other = AnalyzedDocument::new();
        other.add_text("word", "osaka city").set_metadata("date", 1999u32);
        txn.insert_document("osaka", other)?;
        txn.commit()?;

        let mut txn = client.transaction()?;
        let mut lost = AnalyzedDocument::new();
        lost.add_text("word", "kyoto");
        txn.insert_document("kyoto", lost)?;
        // dropped without commit
        drop(txn);
        client.close()?;
        assert!(client.transaction().is_err());
    }
    assert!(StorageClient::exists(&config));
    assert!(matches!(StorageClient::create(config.clone()), Err(QuarryError::Config(_))));

    let client = StorageClient::open(IndexConfig::at(dir.path().join("storage")))?;
    assert!(client.config().acl);
    assert_eq!(client.nof_documents_inserted(), 2);
    assert_eq!(client.document_number("kyoto"), None);
    assert_eq!(client.document_frequency(&Term::new("word", "city")), 2);

    let docno = client.document_number("tokyo").unwrap_or(0);
    let forward: Vec<(u32, String)> = client
        .forward_index(docno, "orig")
        .into_iter()
        .map(|e| (e.position, e.value))
        .collect();
    assert_eq!(
        forward,
        vec![
            (1, "Tokyo".to_string()),
            (2, "is".to_string()),
            (3, "a".to_string()),
            (4, "city".to_string()),
            (9, "!".to_string()),
        ]
    );
    assert_eq!(client.attribute(docno, "title").as_deref(), Some("Tokyo"));
    assert_eq!(client.metadata(docno, "date")?, Some(NumericValue::UInt(2020)));
    assert_eq!(client.access(docno), vec!["alice"]);
    assert_eq!(
        client.postings(&Expression::sequence(3, vec![
            Expression::term("word", "tokyo"),
            Expression::term("word", "city"),
        ]))?,
        vec![(docno, vec![1])]
    );
    Ok(())
}

#[test]
fn test_checkpoint_and_replay() -> Result<()> {
    let dir = TempDir::new()?;
    let mut config = config(&dir);
    config.cache_size = 256;
    {
        let client = StorageClient::create(config.clone())?;
        for batch in 0..10 {
            let mut txn = client.transaction()?;
            for i in 0..5 {
                let mut doc = AnalyzedDocument::new();
                doc.add_text("word", &format!("common b{batch} i{i}"));
                txn.insert_document(&format!("d{batch}-{i}"), doc)?;
            }
            txn.commit()?;
        }
        let mut txn = client.transaction()?;
        txn.delete_document("d0-0")?;
        txn.commit()?;
    }

    let client = StorageClient::open(config.clone())?;
    assert_eq!(client.nof_documents_inserted(), 49);
    assert_eq!(client.document_frequency(&Term::new("word", "common")), 49);
    assert_eq!(client.document_frequency(&Term::new("word", "b3")), 5);
    assert_eq!(client.document_frequency(&Term::new("word", "i3")), 10);
    assert_eq!(client.document_frequency(&Term::new("word", "i0")), 9);
    assert_eq!(client.update_statistics(None)?.count(), 11);

    let mut eval = QueryEval::new();
    eval.add_selection_feature("select");
    eval.add_weighting_function(&FunctionConfig::new("tf").feature("match", "select"))?;
    let mut query = eval.create_query(&client)?;
    query.define_feature("select", Expression::term("word", "b7"), 1.0)?;
    query.set_max_nof_ranks(100)?;
    assert_eq!(query.evaluate()?.nof_ranked, 5);
    Ok(())
}

#[test]
fn test_destroy() -> Result<()> {
    let dir = TempDir::new()?;
    let config = config(&dir);
    assert!(matches!(StorageClient::open(config.clone()), Err(QuarryError::Config(_))));
    StorageClient::create(config.clone())?.close()?;
    StorageClient::destroy(&config)?;
    assert!(!StorageClient::exists(&config));
    assert!(StorageClient::destroy(&config).is_err());
    Ok(())
}
