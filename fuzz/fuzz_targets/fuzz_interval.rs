#![no_main]

use arbitrary::Arbitrary;
use catdex::index::interval::quantize;
use catdex::index::{Document, IntervalConfig, IntervalIndex};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    since: Option<i64>,
    until: Option<i64>,
    precision: u8,
    point: i64,
}

fuzz_target!(|input: Input| {
    let precision = i64::from(input.precision.max(1));
    let _ = quantize(input.since.unwrap_or(0), precision);

    let mut config = IntervalConfig::new("start", "end");
    config.precision_value = precision;
    let Ok(mut index) = IntervalIndex::new("effective", config) else {
        return;
    };

    let doc = Document::new()
        .with("start", input.since)
        .with("end", input.until);
    // Overflowing endpoints are rejected and must leave the index empty
    if index.index_object(1, &doc).is_err() {
        assert_eq!(index.num_objects(), 0);
        return;
    }

    if let Ok(point) = quantize(input.point, precision) {
        let _ = index.query_point(point, None, None);
    }
});
