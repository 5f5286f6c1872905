//! Forward and reverse index shared by the term-based index kinds.
//!
//! The forward map holds `term -> documents`; the reverse map holds the term
//! set last indexed for each document, so a document can be re-indexed or
//! removed without knowing its previous values. Every structural mutation
//! bumps the generation counter, which request-cache keys embed.

use crate::index::cache::{CacheKey, RequestCache};
use crate::index::postings::{
    PostingSet, difference, insert_posting, multiintersection, multiunion, remove_posting,
    restrict,
};
use crate::index::types::{DocumentId, entries};
use crate::query::record::{IndexQuery, Operator};
use log::{debug, error};
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Bound;

/// Bounds every forward-map term satisfies
pub trait Term: Clone + Ord + Hash + Debug + Serialize + DeserializeOwned + Send + Sync {}

impl<T> Term for T where T: Clone + Ord + Hash + Debug + Serialize + DeserializeOwned + Send + Sync {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(serialize = "T: Term", deserialize = "T: Term"))]
pub struct UnIndex<T: Term> {
    id: String,
    #[serde(with = "entries")]
    forward: BTreeMap<T, PostingSet>,
    /// Sorted, de-duplicated terms per document
    reverse: FxHashMap<DocumentId, Vec<T>>,
    generation: u64,
}

impl<T: Term> UnIndex<T> {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            forward: BTreeMap::new(),
            reverse: FxHashMap::default(),
            generation: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Mutation counter; changes whenever the index content changes
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the terms indexed for `doc_id`.
    ///
    /// Returns false, touching nothing, when the new term set equals the
    /// stored one. Otherwise only the postings that differ are updated. An
    /// empty term set removes the document.
    pub fn index_terms(&mut self, doc_id: DocumentId, mut terms: Vec<T>) -> bool {
        terms.sort();
        terms.dedup();

        let old = self.reverse.get(&doc_id);
        match old {
            Some(old) if *old == terms => return false,
            None if terms.is_empty() => return false,
            _ => {}
        }

        let old = self.reverse.remove(&doc_id).unwrap_or_default();
        for term in old.iter().filter(|t| terms.binary_search(t).is_err()) {
            self.remove_forward_entry(term, doc_id);
        }
        for term in terms.iter().filter(|t| old.binary_search(t).is_err()) {
            insert_posting(&mut self.forward, term.clone(), doc_id);
        }
        if !terms.is_empty() {
            self.reverse.insert(doc_id, terms);
        }

        self.generation += 1;
        true
    }

    /// Remove a document; a never-indexed id is a no-op returning false
    pub fn unindex(&mut self, doc_id: DocumentId) -> bool {
        let Some(terms) = self.reverse.remove(&doc_id) else {
            debug!(
                "{}: attempt to unindex nonexistent document {}",
                self.id, doc_id
            );
            return false;
        };

        for term in &terms {
            self.remove_forward_entry(term, doc_id);
        }
        self.generation += 1;
        true
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.reverse.clear();
        self.generation += 1;
    }

    fn remove_forward_entry(&mut self, term: &T, doc_id: DocumentId) {
        if !remove_posting(&mut self.forward, term, doc_id) {
            error!(
                "{}: unindex tried to retrieve set {:?} for document {} but couldn't. \
                 This should not happen.",
                self.id, term, doc_id
            );
        }
    }

    /// Terms last indexed for a document
    pub fn get_entry(&self, doc_id: DocumentId) -> Option<&[T]> {
        self.reverse.get(&doc_id).map(Vec::as_slice)
    }

    pub fn postings(&self, term: &T) -> Option<&PostingSet> {
        self.forward.get(term)
    }

    pub fn num_objects(&self) -> usize {
        self.reverse.len()
    }

    /// Number of distinct terms
    pub fn index_size(&self) -> usize {
        self.forward.len()
    }

    /// Distinct terms with their document counts, in term order
    pub fn unique_values(&self) -> impl Iterator<Item = (&T, u64)> {
        self.forward.iter().map(|(term, set)| (term, set.len()))
    }

    /// Number of terms per posting-set size
    pub fn histogram(&self) -> BTreeMap<u64, usize> {
        let mut histogram = BTreeMap::new();
        for set in self.forward.values() {
            *histogram.entry(set.len()).or_insert(0) += 1;
        }
        histogram
    }

    /// Evaluate a parsed clause.
    ///
    /// The unrestricted result is memoized in `cache` under
    /// `(kind, id, generation, record)`; `resultset`, when given, bounds the
    /// returned set.
    pub fn query_index(
        &self,
        kind: &str,
        record: &IndexQuery<T>,
        resultset: Option<&PostingSet>,
        mut cache: Option<&mut RequestCache>,
    ) -> PostingSet {
        let key = CacheKey::new(kind, &self.id, self.generation, record.cache_record());
        if let Some(cache) = cache.as_deref_mut() {
            if let Some(cached) = cache.get(&key) {
                debug!("{}: request cache hit for {}", self.id, key.record);
                return restrict(cached, resultset);
            }
        }

        let result = self.evaluate(record);
        if let Some(cache) = cache {
            cache.insert(key, result.clone());
        }
        restrict(result, resultset)
    }

    fn evaluate(&self, record: &IndexQuery<T>) -> PostingSet {
        let not = record.not.as_deref().unwrap_or(&[]);

        // A clause with only `not` selects every term except the excluded ones.
        let keys: Vec<T> = if record.keys.is_empty() && !not.is_empty() {
            self.forward
                .keys()
                .filter(|k| !not.contains(k))
                .cloned()
                .collect()
        } else {
            record.keys.clone()
        };

        let result = match record.range {
            Some(range) => {
                if keys.is_empty() {
                    return PostingSet::new();
                }
                let lo = match keys.iter().min() {
                    Some(min) if range.min => Bound::Included(min),
                    _ => Bound::Unbounded,
                };
                let hi = match keys.iter().max() {
                    Some(max) if range.max => Bound::Included(max),
                    _ => Bound::Unbounded,
                };
                let sets: Vec<&PostingSet> =
                    self.forward.range::<T, _>((lo, hi)).map(|(_, s)| s).collect();
                combine(record.operator, sets)
            }
            None => {
                let mut sets = Vec::with_capacity(keys.len());
                for key in &keys {
                    match self.forward.get(key) {
                        Some(set) => sets.push(set),
                        // Intersection with a missing term can only be empty.
                        None if record.operator == Operator::And => return PostingSet::new(),
                        None => {}
                    }
                }
                combine(record.operator, sets)
            }
        };

        if not.is_empty() {
            let excluded = multiunion(not.iter().filter_map(|k| self.forward.get(k)));
            difference(&result, &excluded)
        } else {
            result
        }
    }
}

fn combine(operator: Operator, sets: Vec<&PostingSet>) -> PostingSet {
    match operator {
        Operator::Or => multiunion(sets),
        Operator::And => multiintersection(sets),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::Value;
    use crate::query::record::{Query, QueryOption};
    use serde_json::json;

    const OPTIONS: &[QueryOption] = &[QueryOption::Range, QueryOption::Not, QueryOption::Operator];

    fn v(s: &str) -> Value {
        Value::from(s)
    }

    fn sample() -> UnIndex<Value> {
        let mut index = UnIndex::new("subject");
        index.index_terms(1, vec![v("a"), v("b")]);
        index.index_terms(2, vec![v("b"), v("c")]);
        index.index_terms(3, vec![v("c")]);
        index.index_terms(4, vec![v("d")]);
        index
    }

    fn run(index: &UnIndex<Value>, clause: serde_json::Value) -> Vec<DocumentId> {
        let query = Query::new().with("subject", clause);
        let record = IndexQuery::parse(&query, "subject", OPTIONS, Value::from_json)
            .unwrap()
            .unwrap();
        index.query_index("KeywordIndex", &record, None, None).to_vec()
    }

    #[test]
    fn test_index_terms_is_idempotent() {
        let mut index = UnIndex::new("x");
        assert!(index.index_terms(1, vec![v("a")]));
        let generation = index.generation();

        assert!(!index.index_terms(1, vec![v("a"), v("a")]));
        assert_eq!(index.generation(), generation);
    }

    #[test]
    fn test_reindex_touches_only_changed_terms() {
        let mut index = sample();
        assert!(index.index_terms(1, vec![v("b"), v("z")]));

        assert!(index.postings(&v("a")).is_none());
        assert_eq!(index.postings(&v("b")).unwrap().to_vec(), vec![1, 2]);
        assert_eq!(index.postings(&v("z")).unwrap().to_vec(), vec![1]);
        assert_eq!(index.get_entry(1), Some(&[v("b"), v("z")][..]));
    }

    #[test]
    fn test_empty_terms_remove_document() {
        let mut index = sample();
        assert!(index.index_terms(4, Vec::new()));
        assert!(index.get_entry(4).is_none());
        assert!(index.postings(&v("d")).is_none());

        // Still absent: nothing changes.
        assert!(!index.index_terms(4, Vec::new()));
    }

    #[test]
    fn test_unindex_absent_is_noop() {
        let mut index = sample();
        let generation = index.generation();
        assert!(!index.unindex(99));
        assert_eq!(index.generation(), generation);

        assert!(index.unindex(3));
        assert_eq!(index.num_objects(), 3);
        assert_eq!(index.postings(&v("c")).unwrap().to_vec(), vec![2]);
    }

    #[test]
    fn test_clear_bumps_generation() {
        let mut index = sample();
        let generation = index.generation();
        index.clear();
        assert_eq!(index.num_objects(), 0);
        assert_eq!(index.index_size(), 0);
        assert!(index.generation() > generation);
    }

    #[test]
    fn test_or_and_queries() {
        let index = sample();
        assert_eq!(run(&index, json!(["a", "c"])), vec![1, 2, 3]);
        assert_eq!(run(&index, json!({"query": ["b", "c"], "operator": "and"})), vec![2]);
        assert_eq!(run(&index, json!({"query": ["b", "nope"], "operator": "and"})), Vec::<u32>::new());
        assert_eq!(run(&index, json!(["nope"])), Vec::<u32>::new());
    }

    #[test]
    fn test_range_queries() {
        let index = sample();
        assert_eq!(run(&index, json!({"query": ["b", "c"], "range": "min:max"})), vec![1, 2, 3]);
        assert_eq!(run(&index, json!({"query": "c", "range": "min"})), vec![2, 3, 4]);
        assert_eq!(run(&index, json!({"query": "a", "range": "max"})), vec![1]);
    }

    #[test]
    fn test_not_queries() {
        let index = sample();
        assert_eq!(run(&index, json!({"not": "c"})), vec![1, 4]);
        assert_eq!(run(&index, json!({"query": ["b", "d"], "not": ["a"]})), vec![2, 4]);
    }

    #[test]
    fn test_query_cache() {
        let index = sample();
        let mut cache = RequestCache::new();
        let query = Query::new().with("subject", json!("b"));
        let record = IndexQuery::parse(&query, "subject", OPTIONS, Value::from_json)
            .unwrap()
            .unwrap();

        let first = index.query_index("KeywordIndex", &record, None, Some(&mut cache));
        let restricted: PostingSet = [2, 3].into_iter().collect();
        let second = index.query_index("KeywordIndex", &record, Some(&restricted), Some(&mut cache));

        assert_eq!(first.to_vec(), vec![1, 2]);
        assert_eq!(second.to_vec(), vec![2]);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().sets, 1);
    }

    #[test]
    fn test_histogram_and_unique_values() {
        let index = sample();
        let values: Vec<(Value, u64)> = index.unique_values().map(|(t, n)| (t.clone(), n)).collect();
        assert_eq!(values, vec![(v("a"), 1), (v("b"), 2), (v("c"), 2), (v("d"), 1)]);

        let histogram = index.histogram();
        assert_eq!(histogram[&1], 2);
        assert_eq!(histogram[&2], 2);
    }

    #[test]
    fn test_serde_roundtrip_keeps_typed_terms() {
        let mut index = UnIndex::new("mixed");
        index.index_terms(1, vec![Value::Int(5), v("5"), Value::Bool(true)]);

        let json = serde_json::to_string(&index).unwrap();
        let back: UnIndex<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_entry(1), index.get_entry(1));
        assert_eq!(back.postings(&Value::Int(5)).unwrap().to_vec(), vec![1]);
        assert_eq!(back.generation(), index.generation());
    }
}
