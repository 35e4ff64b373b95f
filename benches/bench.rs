//! Criterion benchmarks for quarry.
//!
//! Measures commit throughput of analyzed documents and the evaluation of
//! ranked queries over an in-memory storage.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use quarry::index::{AnalyzedDocument, IndexConfig, StorageClient};
use quarry::query::{Expression, FunctionConfig, QueryEval};

const WORDS: &[&str] = &[
    "storage", "index", "query", "document", "term", "posting", "weight", "summary", "snapshot",
    "commit", "journal", "metadata", "access", "statistics", "blob", "feature", "sequence",
    "within", "contains", "union", "ranking", "formula", "phrase", "window",
];

/// Generate test documents of varying length.
fn generate_test_documents(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let len = 20 + (i % 80);
            (0..len)
                .map(|j| WORDS[(i * 7 + j * 13 + j * j) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn build_storage(texts: &[String]) -> StorageClient {
    let client = StorageClient::create(IndexConfig::memory()).expect("create storage");
    let mut txn = client.transaction().expect("transaction");
    for (i, text) in texts.iter().enumerate() {
        let mut doc = AnalyzedDocument::new();
        doc.add_text("word", text).set_attribute("title", format!("document {i}"));
        txn.insert_document(&format!("doc{i}"), doc).expect("insert");
    }
    txn.commit().expect("commit");
    client
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    for count in [100, 1000] {
        let texts = generate_test_documents(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &texts, |b, texts| {
            b.iter(|| black_box(build_storage(texts)));
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let client = build_storage(&generate_test_documents(2000));
    let mut eval = QueryEval::new();
    eval.add_selection_feature("select");
    eval.add_weighting_function(&FunctionConfig::new("bm25").feature("match", "seek"))
        .expect("bm25");
    eval.add_summarizer(&FunctionConfig::new("attribute").param("name", "title"))
        .expect("attribute");

    let queries = [
        ("term", Expression::term("word", "posting")),
        (
            "contains",
            Expression::contains(2, vec![
                Expression::term("word", "query"),
                Expression::term("word", "phrase"),
                Expression::term("word", "window"),
            ]),
        ),
        (
            "sequence",
            Expression::sequence(5, vec![
                Expression::term("word", "storage"),
                Expression::term("word", "index"),
            ]),
        ),
    ];

    let mut group = c.benchmark_group("query");
    for (name, expression) in &queries {
        group.bench_function(*name, |b| {
            b.iter(|| {
                let mut query = eval.create_query(&client).expect("query");
                query.define_feature("select", expression.clone(), 1.0).expect("select");
                query.define_feature("seek", expression.clone(), 1.0).expect("seek");
                black_box(query.evaluate().expect("evaluate"))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_query);
criterion_main!(benches);
