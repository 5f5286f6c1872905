//! Index and query benchmarks over a synthetic catalog.
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use catdex::index::{CatalogConfig, Document, IntervalConfig, IntervalIndex, RequestCache};
use catdex::query::{Catalog, Query, SearchOptions};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

const PORTAL_TYPES: &[&str] = &["Document", "News", "Event", "Folder", "File"];
const STATES: &[&str] = &["private", "pending", "visible", "published"];
const SUBJECTS: &[&str] = &["a", "b", "c", "d", "e", "f", "g", "h"];

const CONFIG: &str = r#"{"indexes": [
    {"id": "portal_type", "kind": "field"},
    {"id": "review_state", "kind": "field"},
    {"id": "Subject", "kind": "keyword", "attributes": ["subject"]},
    {"id": "effective", "kind": "interval", "since_field": "start", "until_field": "end"},
    {"id": "comp01", "kind": "composite", "components": [
        {"id": "portal_type", "kind": "field"},
        {"id": "review_state", "kind": "field"},
        {"id": "Subject", "kind": "keyword", "attributes": ["subject"]}
    ]}
]}"#;

/// Deterministic document `i`; roughly a quarter of endpoints are open
fn document(i: usize) -> Document {
    let since = (i % 4 != 0).then_some((i as i64 * 37) % 100_000);
    let until = (i % 3 != 0).then(|| since.unwrap_or(0) + (i as i64 * 13) % 50_000);
    Document::new()
        .with("portal_type", PORTAL_TYPES[i % PORTAL_TYPES.len()])
        .with("review_state", STATES[(i / 3) % STATES.len()])
        .with(
            "subject",
            json!([SUBJECTS[i % SUBJECTS.len()], SUBJECTS[(i / 7) % SUBJECTS.len()]]),
        )
        .with("start", since)
        .with("end", until)
}

fn build_catalog(n: usize) -> Catalog {
    let config = CatalogConfig::from_json(CONFIG).expect("Failed to parse config");
    let mut catalog = Catalog::from_config(&config).expect("Failed to build catalog");
    for i in 0..n {
        catalog
            .catalog_object(&format!("/doc/{}", i), document(i))
            .expect("Failed to catalog document");
    }
    catalog
}

fn bench_catalog_object(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_object");
    group.sample_size(10);

    for n in [1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| build_catalog(black_box(n)))
        });
    }
    group.finish();
}

fn bench_interval_query(c: &mut Criterion) {
    let mut index = IntervalIndex::new("effective", IntervalConfig::new("start", "end"))
        .expect("Failed to create interval index");
    for i in 0..50_000 {
        index
            .index_object(i as u32, &document(i))
            .expect("Failed to index document");
    }
    let all: catdex::index::PostingSet = (0..50_000u32).step_by(3).collect();

    let mut group = c.benchmark_group("interval_query");
    group.bench_function("unrestricted", |b| {
        b.iter(|| index.query_point(black_box(25_000), None, None))
    });
    group.bench_function("with_resultset", |b| {
        b.iter(|| index.query_point(black_box(25_000), Some(&all), None))
    });
    group.bench_function("cached", |b| {
        let mut cache = RequestCache::new();
        b.iter(|| index.query_point(black_box(25_000), Some(&all), Some(&mut cache)))
    });
    group.finish();
}

fn bench_composite_search(c: &mut Criterion) {
    let catalog = build_catalog(20_000);
    let queries = [
        json!({"portal_type": "News", "review_state": "visible"}),
        json!({"portal_type": ["News", "Event"], "review_state": "published", "Subject": "c"}),
        json!({"portal_type": "Document", "Subject": ["a", "b"], "effective": 40_000}),
    ];

    let mut group = c.benchmark_group("search");
    for (i, raw) in queries.iter().enumerate() {
        let query = Query::from_json(&raw.to_string()).expect("Failed to parse query");
        group.bench_with_input(BenchmarkId::new("composite", i), &query, |b, q| {
            b.iter(|| catalog.search(black_box(q), &SearchOptions::default()))
        });
        group.bench_with_input(BenchmarkId::new("atomic", i), &query, |b, q| {
            b.iter(|| catalog.search_atomic(black_box(q)))
        });
    }
    group.finish();
}

fn bench_fast_build(c: &mut Criterion) {
    let mut catalog = build_catalog(20_000);

    let mut group = c.benchmark_group("fast_build");
    group.sample_size(10);
    for threshold in [1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(threshold),
            &threshold,
            |b, &threshold| {
                b.iter(|| {
                    catalog
                        .fast_build("comp01", threshold, |_| {})
                        .expect("Failed to rebuild")
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_catalog_object,
    bench_interval_query,
    bench_composite_search,
    bench_fast_build
);
criterion_main!(benches);
