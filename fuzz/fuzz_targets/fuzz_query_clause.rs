#![no_main]

use catdex::index::{AttributeIndex, AttributeKind, CompositeIndex, ComponentConfig, Document};
use catdex::query::Query;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary JSON queries must parse or fail cleanly, never panic
    let Ok(query) = Query::from_json(data) else {
        return;
    };

    let mut subject = AttributeIndex::new("Subject", AttributeKind::Keyword, &["subject".to_string()]);
    subject.index_object(1, &Document::new().with("subject", serde_json::json!(["a", "b"])));
    let _ = subject.apply_query(&query, None, None);

    let mut composite = CompositeIndex::new(
        "comp01",
        &[
            ComponentConfig::new("portal_type", "field", &[]),
            ComponentConfig::new("Subject", "keyword", &["subject"]),
        ],
    )
    .expect("valid components");
    composite.index_object(
        1,
        &Document::new()
            .with("portal_type", "News")
            .with("subject", serde_json::json!(["a"])),
    );
    if let Ok(rewritten) = composite.rewrite(&query, &Default::default()) {
        let _ = composite.apply_query(&rewritten, None, None);
    }
});
