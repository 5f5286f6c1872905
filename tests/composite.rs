//! Integration tests for the composite index: query rewriting, equivalence
//! with atomic evaluation, component management and fast rebuilds.

use catdex::IndexError;
use catdex::index::{
    CatalogConfig, ComponentConfig, CompositeIndex, Document, DocumentId, PermutedKey,
    RewriteOptions,
};
use catdex::query::{Catalog, Query, SearchOptions};
use proptest::prelude::*;
use rstest::rstest;
use serde_json::{Value as JsonValue, json};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const CONFIG: &str = r#"{"indexes": [
    {"id": "portal_type", "kind": "field"},
    {"id": "review_state", "kind": "field"},
    {"id": "Subject", "kind": "keyword", "attributes": ["subject"]},
    {"id": "is_default_page", "kind": "boolean"},
    {"id": "comp01", "kind": "composite", "components": [
        {"id": "portal_type", "kind": "field"},
        {"id": "review_state", "kind": "field"},
        {"id": "Subject", "kind": "keyword", "attributes": ["subject"]},
        {"id": "is_default_page", "kind": "boolean"}
    ]}
]}"#;

const PORTAL_TYPES: &[&str] = &["Document", "News", "Event"];
const STATES: &[&str] = &["pending", "visible", "private"];
const SUBJECTS: &[&str] = &["a", "b", "c", "d"];

fn catalog() -> Catalog {
    Catalog::from_config(&CatalogConfig::from_json(CONFIG).unwrap()).unwrap()
}

fn page(portal_type: &str, state: &str, subjects: &[&str], default_page: bool) -> Document {
    Document::new()
        .with("portal_type", portal_type)
        .with("review_state", state)
        .with("subject", json!(subjects))
        .with("is_default_page", default_page)
}

fn populated() -> Catalog {
    let mut catalog = catalog();
    let mut n = 0;
    for pt in PORTAL_TYPES {
        for state in STATES {
            for (i, subject) in SUBJECTS.iter().enumerate() {
                let subjects = [*subject, SUBJECTS[(i + 1) % SUBJECTS.len()]];
                catalog
                    .catalog_object(&format!("/doc{}", n), page(pt, state, &subjects, n % 3 == 0))
                    .unwrap();
                n += 1;
            }
        }
    }
    catalog
}

fn composite(catalog: &Catalog) -> &CompositeIndex {
    catalog.composite("comp01").unwrap()
}

#[test]
fn test_two_field_query_is_rewritten_and_equivalent() {
    init_logger();
    let mut catalog = catalog();
    let doc_id = catalog
        .catalog_object("/front-page", page("Document", "pending", &["a"], true))
        .unwrap();
    catalog
        .catalog_object("/news", page("News", "visible", &["b"], false))
        .unwrap();

    let query = Query::new()
        .with("portal_type", json!("Document"))
        .with("review_state", json!("pending"));

    let rewritten = catalog.rewrite(&query, &RewriteOptions::default()).unwrap();
    assert!(!rewritten.contains("portal_type"));
    assert!(!rewritten.contains("review_state"));
    let expected_key: PermutedKey = [("portal_type", "Document"), ("review_state", "pending")]
        .into_iter()
        .collect();
    assert_eq!(
        rewritten.get("comp01"),
        Some(&json!({"query": [expected_key.to_json()]}))
    );

    let composed = catalog.search(&query, &SearchOptions::default()).unwrap();
    let atomic = catalog.search_atomic(&query).unwrap();
    assert_eq!(composed.to_vec(), vec![doc_id]);
    assert_eq!(composed, atomic);
}

#[test]
fn test_rewrite_preserves_component_and_value_order() {
    let catalog = populated();
    let query = Query::new()
        .with("review_state", json!(["visible", "pending"]))
        .with("portal_type", json!(["News", "Document"]));

    let rewritten = catalog.rewrite(&query, &RewriteOptions::default()).unwrap();
    let keys: Vec<PermutedKey> = rewritten.get("comp01").unwrap()["query"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| PermutedKey::from_json(k).unwrap())
        .collect();

    let expected: Vec<PermutedKey> = [
        ("News", "visible"),
        ("News", "pending"),
        ("Document", "visible"),
        ("Document", "pending"),
    ]
    .into_iter()
    .map(|(pt, state)| [("portal_type", pt), ("review_state", state)].into_iter().collect())
    .collect();
    assert_eq!(keys, expected);
}

#[rstest]
#[case::not_clause(json!({"query": "pending", "not": "visible"}))]
#[case::not_only(json!({"not": "visible"}))]
#[case::range(json!({"query": ["pending", "private"], "range": "min:max"}))]
fn test_unsupported_clause_is_left_alone(#[case] state_clause: JsonValue) {
    let catalog = populated();
    let query = Query::new()
        .with("portal_type", json!("News"))
        .with("review_state", state_clause);

    let rewritten = catalog.rewrite(&query, &RewriteOptions::default()).unwrap();
    assert_eq!(rewritten, query);
}

#[test]
fn test_and_operator_excludes_keyword_component() {
    let catalog = populated();
    let query = Query::new()
        .with("portal_type", json!("News"))
        .with("review_state", json!("visible"))
        .with("Subject", json!({"query": ["a", "b"], "operator": "and"}));

    let rewritten = catalog.rewrite(&query, &RewriteOptions::default()).unwrap();
    assert!(rewritten.contains("Subject"));
    assert!(rewritten.contains("comp01"));
    assert!(!rewritten.contains("portal_type"));

    assert_eq!(
        catalog.search(&query, &SearchOptions::default()).unwrap(),
        catalog.search_atomic(&query).unwrap()
    );
}

#[test]
fn test_skip_composite_flag() {
    let catalog = populated();
    let query = Query::new()
        .with("portal_type", json!("News"))
        .with("review_state", json!("visible"));
    let options = RewriteOptions {
        skip_composite: true,
    };
    assert_eq!(catalog.rewrite(&query, &options).unwrap(), query);
}

#[rstest]
#[case(json!({"portal_type": "News", "review_state": "visible"}))]
#[case(json!({"portal_type": ["News", "Event"], "Subject": "c"}))]
#[case(json!({"review_state": "private", "Subject": ["a", "d"], "is_default_page": true}))]
#[case(json!({"portal_type": "Document", "review_state": "pending", "Subject": "b", "is_default_page": 0}))]
#[case(json!({"portal_type": "Missing", "review_state": "pending"}))]
#[case(json!({"portal_type": "News", "Subject": {"query": "a", "operator": "or"}}))]
fn test_composite_matches_atomic(#[case] query: JsonValue) {
    let catalog = populated();
    let query = Query::from_json(&query.to_string()).unwrap();

    let rewritten = catalog.rewrite(&query, &RewriteOptions::default()).unwrap();
    assert!(rewritten.contains("comp01"));

    let composed = catalog.search(&query, &SearchOptions::default()).unwrap();
    let atomic = catalog.search_atomic(&query).unwrap();
    assert_eq!(composed, atomic);
}

#[test]
fn test_add_duplicate_component_keeps_registry() {
    let mut catalog = populated();
    let before = composite(&catalog).components().clone();
    let objects = composite(&catalog).num_objects();

    let result = catalog
        .composite_mut("comp01")
        .unwrap()
        .add_component(&ComponentConfig::new("portal_type", "keyword", &[]));

    assert!(matches!(result, Err(IndexError::DuplicateComponent(id)) if id == "portal_type"));
    assert_eq!(composite(&catalog).components(), &before);
    assert_eq!(composite(&catalog).num_objects(), objects);
}

#[test]
fn test_fast_build_matches_incremental_build() {
    let mut catalog = populated();
    let expected: Vec<(DocumentId, Vec<PermutedKey>)> = (0..catalog.len() as DocumentId)
        .map(|id| {
            let mut keys = composite(&catalog).get_entry(id).unwrap().to_vec();
            keys.sort();
            (id, keys)
        })
        .collect();

    catalog
        .composite_mut("comp01")
        .unwrap()
        .del_component("is_default_page")
        .unwrap();
    assert_eq!(composite(&catalog).num_objects(), 0);
    catalog
        .composite_mut("comp01")
        .unwrap()
        .add_component(&ComponentConfig::new("is_default_page", "boolean", &[]))
        .unwrap();

    let mut checkpoints = Vec::new();
    let processed = catalog
        .fast_build("comp01", 10, |done| checkpoints.push(done))
        .unwrap();

    assert_eq!(processed, catalog.len());
    assert_eq!(checkpoints, vec![10, 20, 30]);
    for (id, keys) in expected {
        let mut rebuilt = composite(&catalog).get_entry(id).unwrap().to_vec();
        rebuilt.sort();
        assert_eq!(rebuilt, keys, "document {}", id);
    }
}

#[test]
fn test_fast_build_rejects_non_composite() {
    let mut catalog = populated();
    assert!(matches!(
        catalog.fast_build("portal_type", 10, |_| {}),
        Err(IndexError::WrongIndexKind { .. })
    ));
}

fn clause(values: &'static [&'static str]) -> impl Strategy<Value = JsonValue> {
    prop::sample::subsequence(values, 1..=values.len()).prop_map(|picked| {
        if picked.len() == 1 {
            json!(picked[0])
        } else {
            json!(picked)
        }
    })
}

fn documents() -> impl Strategy<Value = Vec<Document>> {
    let doc = (
        prop::sample::select(PORTAL_TYPES),
        prop::sample::select(STATES),
        prop::sample::subsequence(SUBJECTS, 0..=SUBJECTS.len()),
        any::<bool>(),
    )
        .prop_map(|(pt, state, subjects, flag)| page(pt, state, &subjects, flag));
    prop::collection::vec(doc, 1..30)
}

proptest! {
    #[test]
    fn prop_composite_equals_atomic(
        docs in documents(),
        portal_type in prop::option::of(clause(PORTAL_TYPES)),
        review_state in prop::option::of(clause(STATES)),
        subject in prop::option::of(clause(SUBJECTS)),
        default_page in prop::option::of(any::<bool>()),
    ) {
        let mut catalog = catalog();
        for (i, doc) in docs.into_iter().enumerate() {
            catalog.catalog_object(&format!("/doc{}", i), doc).unwrap();
        }

        let mut query = Query::new();
        if let Some(clause) = portal_type {
            query.insert("portal_type", clause);
        }
        if let Some(clause) = review_state {
            query.insert("review_state", clause);
        }
        if let Some(clause) = subject {
            query.insert("Subject", clause);
        }
        if let Some(flag) = default_page {
            query.insert("is_default_page", json!(flag));
        }

        let composed = catalog.search(&query, &SearchOptions::default()).unwrap();
        let atomic = catalog.search_atomic(&query).unwrap();
        prop_assert_eq!(composed, atomic);
    }

    #[test]
    fn prop_reindex_same_document_is_noop(docs in documents()) {
        let mut catalog = catalog();
        for (i, doc) in docs.iter().enumerate() {
            catalog.catalog_object(&format!("/doc{}", i), doc.clone()).unwrap();
        }
        let generation = composite(&catalog).generation();

        for (i, doc) in docs.into_iter().enumerate() {
            catalog.catalog_object(&format!("/doc{}", i), doc).unwrap();
        }
        prop_assert_eq!(composite(&catalog).generation(), generation);
    }
}
