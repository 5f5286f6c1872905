//! Date-range index.
//!
//! Each document carries an interval `(since, until)` in minutes, either end
//! optionally unbounded. Documents are partitioned into four buckets so that
//! a containment query ("which documents are effective at `t`?") becomes a
//! handful of range scans:
//!
//! | bucket      | since | until | stored under           |
//! |-------------|-------|-------|------------------------|
//! | always      | none  | none  | one flat set           |
//! | since only  | set   | none  | `since -> docs`        |
//! | until only  | none  | set   | `until -> docs`        |
//! | bounded     | set   | set   | both `since` and `until` maps |

use crate::error::{IndexError, QueryError, Result};
use crate::index::cache::{CacheKey, RequestCache};
use crate::index::postings::{
    PostingSet, difference, insert_posting, intersection, multiunion, remove_posting,
};
use crate::index::types::{Document, DocumentId, IntervalConfig, MAX32, entries};
use crate::query::record::{IndexQuery, Query};
use log::{debug, error};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::ops::Bound;

const KIND: &str = "IntervalIndex";

/// Bucket a document's interval falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Always,
    SinceOnly,
    UntilOnly,
    Bounded,
}

/// A quantized interval; `None` marks an unbounded end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Interval {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

impl Interval {
    pub fn new(since: Option<i64>, until: Option<i64>) -> Self {
        Self { since, until }
    }

    pub fn bucket(&self) -> Bucket {
        match (self.since, self.until) {
            (None, None) => Bucket::Always,
            (Some(_), None) => Bucket::SinceOnly,
            (None, Some(_)) => Bucket::UntilOnly,
            (Some(_), Some(_)) => Bucket::Bounded,
        }
    }

    /// Whether the interval covers the point `t`
    pub fn contains(&self, t: i64) -> bool {
        self.since.is_none_or(|s| s <= t) && self.until.is_none_or(|u| u >= t)
    }
}

/// Round `value` down to a multiple of `precision`, rejecting results that
/// do not fit the signed 32-bit minute range.
pub fn quantize(value: i64, precision: i64) -> Result<i64> {
    if !(-MAX32..=MAX32).contains(&value) {
        return Err(IndexError::Overflow { value });
    }
    let quantized = if precision > 1 {
        value - value.rem_euclid(precision)
    } else {
        value
    };
    if quantized < -MAX32 {
        return Err(IndexError::Overflow { value: quantized });
    }
    Ok(quantized)
}

/// Read a raw endpoint as whole minutes.
///
/// Null or absent is unbounded; floats are floored.
fn endpoint_minutes(field: &str, raw: Option<&JsonValue>) -> Result<Option<i64>> {
    let number = match raw {
        None | Some(JsonValue::Null) => return Ok(None),
        Some(JsonValue::Number(n)) => n,
        Some(other) => {
            return Err(IndexError::InvalidEndpoint {
                field: field.to_string(),
                found: other.to_string(),
            });
        }
    };

    if let Some(minutes) = number.as_i64() {
        return Ok(Some(minutes));
    }
    if number.is_u64() {
        return Err(IndexError::Overflow { value: i64::MAX });
    }
    match number.as_f64() {
        Some(f) if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(Some(f.floor() as i64))
        }
        Some(f) if f < 0.0 => Err(IndexError::Overflow { value: i64::MIN }),
        _ => Err(IndexError::Overflow { value: i64::MAX }),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalIndex {
    id: String,
    config: IntervalConfig,
    always: PostingSet,
    #[serde(with = "entries")]
    since_only: BTreeMap<i64, PostingSet>,
    #[serde(with = "entries")]
    until_only: BTreeMap<i64, PostingSet>,
    #[serde(with = "entries")]
    since: BTreeMap<i64, PostingSet>,
    #[serde(with = "entries")]
    until: BTreeMap<i64, PostingSet>,
    unindex: FxHashMap<DocumentId, Interval>,
    generation: u64,
}

impl IntervalIndex {
    pub fn new(id: &str, config: IntervalConfig) -> Result<Self> {
        let invalid = |reason: &str| IndexError::InvalidConfig {
            index: id.to_string(),
            reason: reason.to_string(),
        };
        if config.since_field.trim().is_empty() || config.until_field.trim().is_empty() {
            return Err(invalid("since_field and until_field are required"));
        }
        if config.precision_value < 1 {
            return Err(invalid("precision_value must be at least 1"));
        }
        if config.floor_value > config.ceiling_value {
            return Err(invalid("floor_value is above ceiling_value"));
        }

        Ok(Self {
            id: id.to_string(),
            config,
            always: PostingSet::new(),
            since_only: BTreeMap::new(),
            until_only: BTreeMap::new(),
            since: BTreeMap::new(),
            until: BTreeMap::new(),
            unindex: FxHashMap::default(),
            generation: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &IntervalConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Quantize an endpoint; values outside `[floor, ceiling]` become unbounded
    pub fn convert(&self, minutes: Option<i64>) -> Result<Option<i64>> {
        let Some(minutes) = minutes else {
            return Ok(None);
        };
        let value = quantize(minutes, self.config.precision_value)?;
        if value > self.config.ceiling_value || value < self.config.floor_value {
            return Ok(None);
        }
        Ok(Some(value))
    }

    /// The interval a document would be indexed under
    pub fn extract(&self, doc: &Document) -> Result<Interval> {
        let since = endpoint_minutes(&self.config.since_field, doc.get(&self.config.since_field))?;
        let until = endpoint_minutes(&self.config.until_field, doc.get(&self.config.until_field))?;
        Ok(Interval::new(self.convert(since)?, self.convert(until)?))
    }

    /// Index a document; fails without side effects on malformed endpoints
    pub fn index_object(&mut self, doc_id: DocumentId, doc: &Document) -> Result<bool> {
        let interval = self.extract(doc)?;
        Ok(self.index_interval(doc_id, interval))
    }

    /// Store an already extracted interval; false when unchanged
    pub fn index_interval(&mut self, doc_id: DocumentId, interval: Interval) -> bool {
        let old = self.unindex.insert(doc_id, interval);
        if old == Some(interval) {
            return false;
        }

        self.generation += 1;
        if let Some(old) = old {
            self.remove_forward_entry(old, doc_id);
        }
        self.insert_forward_entry(interval, doc_id);
        true
    }

    pub fn unindex_object(&mut self, doc_id: DocumentId) -> bool {
        let Some(interval) = self.unindex.remove(&doc_id) else {
            debug!("{}: attempt to unindex nonexistent document {}", self.id, doc_id);
            return false;
        };
        self.generation += 1;
        self.remove_forward_entry(interval, doc_id);
        true
    }

    pub fn clear(&mut self) {
        self.always = PostingSet::new();
        self.since_only.clear();
        self.until_only.clear();
        self.since.clear();
        self.until.clear();
        self.unindex.clear();
        self.generation += 1;
    }

    fn insert_forward_entry(&mut self, interval: Interval, doc_id: DocumentId) {
        match (interval.since, interval.until) {
            (None, None) => {
                self.always.insert(doc_id);
            }
            (Some(since), None) => insert_posting(&mut self.since_only, since, doc_id),
            (None, Some(until)) => insert_posting(&mut self.until_only, until, doc_id),
            (Some(since), Some(until)) => {
                insert_posting(&mut self.since, since, doc_id);
                insert_posting(&mut self.until, until, doc_id);
            }
        }
    }

    fn remove_forward_entry(&mut self, interval: Interval, doc_id: DocumentId) {
        let found = match (interval.since, interval.until) {
            (None, None) => self.always.remove(doc_id),
            (Some(since), None) => remove_posting(&mut self.since_only, &since, doc_id),
            (None, Some(until)) => remove_posting(&mut self.until_only, &until, doc_id),
            (Some(since), Some(until)) => {
                let since = remove_posting(&mut self.since, &since, doc_id);
                remove_posting(&mut self.until, &until, doc_id) && since
            }
        };
        if !found {
            error!(
                "{}: document {} missing from the {:?} bucket of {:?}. This should not happen.",
                self.id,
                doc_id,
                interval.bucket(),
                interval
            );
        }
    }

    pub fn get_entry(&self, doc_id: DocumentId) -> Option<Interval> {
        self.unindex.get(&doc_id).copied()
    }

    pub fn num_objects(&self) -> usize {
        self.unindex.len()
    }

    /// Number of distinct endpoint keys over all buckets
    pub fn index_size(&self) -> usize {
        self.since_only.len() + self.until_only.len() + self.since.len() + self.until.len()
    }

    /// Document count per bucket
    pub fn bucket_sizes(&self) -> BTreeMap<&'static str, u64> {
        let count = |map: &BTreeMap<i64, PostingSet>| map.values().map(PostingSet::len).sum::<u64>();
        BTreeMap::from([
            ("always", self.always.len()),
            ("since_only", count(&self.since_only)),
            ("until_only", count(&self.until_only)),
            ("bounded", count(&self.since)),
        ])
    }

    /// Distinct endpoint values of the since or until field with their
    /// document counts; `None` for any other name.
    pub fn unique_values(&self, field: &str) -> Option<Vec<(i64, u64)>> {
        let (bounded, open) = if field == self.config.since_field {
            (&self.since, &self.since_only)
        } else if field == self.config.until_field {
            (&self.until, &self.until_only)
        } else {
            return None;
        };
        Some(
            bounded
                .iter()
                .chain(open.iter())
                .map(|(key, set)| (*key, set.len()))
                .collect(),
        )
    }

    /// Documents whose interval contains the (already quantized) point `t`.
    ///
    /// With a `resultset`, the documents that do not match are computed
    /// instead and subtracted from the indexed part of it.
    pub fn query_point(
        &self,
        t: i64,
        resultset: Option<&PostingSet>,
        cache: Option<&mut RequestCache>,
    ) -> PostingSet {
        let record = match resultset {
            None => format!("_{}", t),
            Some(_) => format!("_inverse_{}", t),
        };
        let key = CacheKey::new(KIND, &self.id, self.generation, record);

        let mut cache = cache;
        if let Some(cached) = cache.as_deref_mut().and_then(|c| c.get(&key)) {
            return match resultset {
                None => cached,
                Some(r) => difference(&self.indexed_part(r), &cached),
            };
        }

        let computed = match resultset {
            None => self.matching(t),
            Some(_) => self.not_matching(t),
        };
        if let Some(cache) = cache {
            cache.insert(key, computed.clone());
        }

        match resultset {
            None => computed,
            Some(r) => difference(&self.indexed_part(r), &computed),
        }
    }

    /// Documents currently held by the index
    pub fn referenced_objects(&self) -> PostingSet {
        self.unindex.keys().copied().collect()
    }

    fn indexed_part(&self, resultset: &PostingSet) -> PostingSet {
        intersection(resultset, &self.referenced_objects())
    }

    fn matching(&self, t: i64) -> PostingSet {
        let up_to = (Bound::Unbounded, Bound::Included(t));
        let from = (Bound::Included(t), Bound::Unbounded);

        let until_only = multiunion(self.until_only.range(from).map(|(_, s)| s));
        let since_only = multiunion(self.since_only.range(up_to).map(|(_, s)| s));
        let until = multiunion(self.until.range(from).map(|(_, s)| s));
        let since = multiunion(self.since.range(up_to).map(|(_, s)| s));
        let bounded = intersection(&until, &since);

        multiunion([&bounded, &until_only, &since_only, &self.always])
    }

    fn not_matching(&self, t: i64) -> PostingSet {
        let before = (Bound::Unbounded, Bound::Excluded(t));
        let after = (Bound::Excluded(t), Bound::Unbounded);

        let until_only = multiunion(self.until_only.range(before).map(|(_, s)| s));
        let since_only = multiunion(self.since_only.range(after).map(|(_, s)| s));
        let until = multiunion(self.until.range(before).map(|(_, s)| s));
        let since = multiunion(self.since.range(after).map(|(_, s)| s));

        multiunion([&since, &since_only, &until_only, &until])
    }

    /// Quantized query point of this index's clause, if the query has one
    pub fn parse_query(&self, query: &Query) -> Result<Option<i64>> {
        let Some(record) = IndexQuery::parse(query, &self.id, &[], |raw| Some(raw.clone()))? else {
            return Ok(None);
        };
        let invalid = || QueryError::InvalidClause {
            index: self.id.clone(),
            found: query.get(&self.id).map(|c| c.to_string()).unwrap_or_default(),
        };

        let first = record.keys.first().ok_or_else(invalid)?;
        let minutes = match endpoint_minutes(&self.id, Some(first)) {
            Ok(Some(minutes)) => minutes,
            Ok(None) | Err(IndexError::InvalidEndpoint { .. }) => return Err(invalid().into()),
            Err(e) => return Err(e),
        };
        Ok(Some(quantize(minutes, self.config.precision_value)?))
    }

    pub fn apply_query(
        &self,
        query: &Query,
        resultset: Option<&PostingSet>,
        cache: Option<&mut RequestCache>,
    ) -> Result<Option<PostingSet>> {
        let Some(t) = self.parse_query(query)? else {
            return Ok(None);
        };
        Ok(Some(self.query_point(t, resultset, cache)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn index() -> IntervalIndex {
        IntervalIndex::new("effective", IntervalConfig::new("start", "end")).unwrap()
    }

    fn doc(since: Option<i64>, until: Option<i64>) -> Document {
        Document::new().with("start", since).with("end", until)
    }

    #[test]
    fn test_bucket_and_contains() {
        assert_eq!(Interval::new(None, None).bucket(), Bucket::Always);
        assert_eq!(Interval::new(Some(1), None).bucket(), Bucket::SinceOnly);
        assert_eq!(Interval::new(None, Some(1)).bucket(), Bucket::UntilOnly);
        assert_eq!(Interval::new(Some(1), Some(2)).bucket(), Bucket::Bounded);

        let interval = Interval::new(Some(2), Some(9));
        assert!(interval.contains(2));
        assert!(interval.contains(9));
        assert!(!interval.contains(10));
        assert!(Interval::default().contains(i64::MIN));
    }

    #[test]
    fn test_quantize() {
        assert_eq!(quantize(17, 1).unwrap(), 17);
        assert_eq!(quantize(17, 5).unwrap(), 15);
        assert_eq!(quantize(-17, 5).unwrap(), -20);
        assert_eq!(quantize(MAX32, 1).unwrap(), MAX32);
        assert_eq!(
            quantize(MAX32 + 1, 1),
            Err(IndexError::Overflow { value: MAX32 + 1 })
        );
        assert!(quantize(-MAX32 - 1, 1).is_err());
    }

    #[test]
    fn test_new_validates_config() {
        let mut config = IntervalConfig::new("start", "");
        assert!(matches!(
            IntervalIndex::new("effective", config.clone()),
            Err(IndexError::InvalidConfig { .. })
        ));

        config.until_field = "end".into();
        config.precision_value = 0;
        assert!(IntervalIndex::new("effective", config).is_err());
    }

    #[test]
    fn test_endpoint_shapes() {
        let index = index();
        let interval = index
            .extract(&Document::new().with("start", 10.9).with("end", json!(null)))
            .unwrap();
        assert_eq!(interval, Interval::new(Some(10), None));

        let err = index
            .extract(&Document::new().with("start", "2024-01-01"))
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidEndpoint { .. }));

        let err = index
            .extract(&Document::new().with("start", u64::MAX))
            .unwrap_err();
        assert!(matches!(err, IndexError::Overflow { .. }));
    }

    #[test]
    fn test_reindex_moves_bucket() {
        let mut index = index();
        assert!(index.index_object(1, &doc(Some(5), None)).unwrap());
        assert!(index.index_object(1, &doc(Some(5), Some(8))).unwrap());

        assert!(index.since_only.is_empty());
        assert_eq!(index.since[&5].to_vec(), vec![1]);
        assert_eq!(index.until[&8].to_vec(), vec![1]);
        assert_eq!(index.get_entry(1), Some(Interval::new(Some(5), Some(8))));
    }

    #[test]
    fn test_failed_index_leaves_state_untouched() {
        let mut index = index();
        index.index_object(1, &doc(Some(5), None)).unwrap();
        let generation = index.generation();

        let result = index.index_object(1, &doc(Some(1 << 31), None));
        assert!(matches!(result, Err(IndexError::Overflow { .. })));
        assert_eq!(index.generation(), generation);
        assert_eq!(index.get_entry(1), Some(Interval::new(Some(5), None)));
    }

    #[test]
    fn test_precision_quantizes_stored_and_queried_values() {
        let mut config = IntervalConfig::new("start", "end");
        config.precision_value = 5;
        let mut index = IntervalIndex::new("effective", config).unwrap();
        index.index_object(1, &doc(Some(12), Some(18))).unwrap();

        assert_eq!(index.get_entry(1), Some(Interval::new(Some(10), Some(15))));
        let query = Query::new().with("effective", json!(19));
        assert_eq!(index.apply_query(&query, None, None).unwrap().unwrap().to_vec(), vec![1]);
    }

    #[test]
    fn test_query_clause_forms() {
        let mut index = index();
        index.index_object(1, &doc(Some(0), Some(10))).unwrap();

        let bare = Query::new().with("effective", json!(5));
        let object = Query::new().with("effective", json!({"query": [5, 100]}));
        assert_eq!(index.apply_query(&bare, None, None).unwrap().unwrap().to_vec(), vec![1]);
        assert_eq!(index.apply_query(&object, None, None).unwrap().unwrap().to_vec(), vec![1]);

        let empty = Query::new().with("effective", json!({"query": []}));
        assert!(matches!(
            index.apply_query(&empty, None, None),
            Err(IndexError::Query(QueryError::InvalidClause { .. }))
        ));
        let text = Query::new().with("effective", json!("now"));
        assert!(index.apply_query(&text, None, None).is_err());
    }

    #[test]
    fn test_cache_reuses_results_until_mutation() {
        let mut index = index();
        index.index_object(1, &doc(Some(0), None)).unwrap();
        let mut cache = RequestCache::new();

        let first = index.query_point(5, None, Some(&mut cache));
        let second = index.query_point(5, None, Some(&mut cache));
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 1);

        index.index_object(2, &doc(None, None)).unwrap();
        let third = index.query_point(5, None, Some(&mut cache));
        assert_eq!(third.to_vec(), vec![1, 2]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_cached_complement_is_reused_against_new_resultset() {
        let mut index = index();
        index.index_object(1, &doc(Some(0), Some(3))).unwrap();
        index.index_object(2, &doc(Some(0), Some(9))).unwrap();
        index.index_object(3, &doc(Some(0), None)).unwrap();
        let mut cache = RequestCache::new();

        let r1: PostingSet = [1, 2].into_iter().collect();
        let r2: PostingSet = [2, 3].into_iter().collect();
        assert_eq!(index.query_point(5, Some(&r1), Some(&mut cache)).to_vec(), vec![2]);
        assert_eq!(index.query_point(5, Some(&r2), Some(&mut cache)).to_vec(), vec![2, 3]);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_unique_values() {
        let mut index = index();
        index.index_object(1, &doc(Some(1), Some(4))).unwrap();
        index.index_object(2, &doc(Some(1), None)).unwrap();

        assert_eq!(index.unique_values("start"), Some(vec![(1, 1), (1, 1)]));
        assert_eq!(index.unique_values("end"), Some(vec![(4, 1)]));
        assert_eq!(index.unique_values("other"), None);
    }
}
