//! Posting sets and the set algebra every index combines results with.
//!
//! All operations are pure; multi-way merges process the smallest inputs
//! first to keep intermediate results small.

use crate::index::types::DocumentId;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The set of documents associated with one index term
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<DocumentId>", into = "Vec<DocumentId>")]
pub struct PostingSet(RoaringBitmap);

impl PostingSet {
    pub fn new() -> Self {
        Self(RoaringBitmap::new())
    }

    /// Insert a document; returns false if it was already present
    pub fn insert(&mut self, doc_id: DocumentId) -> bool {
        self.0.insert(doc_id)
    }

    /// Remove a document; returns false if it was not present
    pub fn remove(&mut self, doc_id: DocumentId) -> bool {
        self.0.remove(doc_id)
    }

    pub fn contains(&self, doc_id: DocumentId) -> bool {
        self.0.contains(doc_id)
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.0.iter()
    }

    pub fn to_vec(&self) -> Vec<DocumentId> {
        self.0.iter().collect()
    }
}

impl From<RoaringBitmap> for PostingSet {
    fn from(bitmap: RoaringBitmap) -> Self {
        Self(bitmap)
    }
}

impl From<Vec<DocumentId>> for PostingSet {
    fn from(ids: Vec<DocumentId>) -> Self {
        ids.into_iter().collect()
    }
}

impl From<PostingSet> for Vec<DocumentId> {
    fn from(set: PostingSet) -> Self {
        set.to_vec()
    }
}

impl FromIterator<DocumentId> for PostingSet {
    fn from_iter<I: IntoIterator<Item = DocumentId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<DocumentId> for PostingSet {
    fn extend<I: IntoIterator<Item = DocumentId>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

pub fn union(a: &PostingSet, b: &PostingSet) -> PostingSet {
    PostingSet(&a.0 | &b.0)
}

pub fn intersection(a: &PostingSet, b: &PostingSet) -> PostingSet {
    PostingSet(&a.0 & &b.0)
}

/// Documents in `a` that are not in `b`
pub fn difference(a: &PostingSet, b: &PostingSet) -> PostingSet {
    PostingSet(&a.0 - &b.0)
}

/// Union of any number of sets, merged smallest first
pub fn multiunion<'a, I>(sets: I) -> PostingSet
where
    I: IntoIterator<Item = &'a PostingSet>,
{
    let mut sets: Vec<&PostingSet> = sets.into_iter().collect();
    sets.sort_by_key(|s| s.len());

    let mut result = RoaringBitmap::new();
    for set in sets {
        result |= &set.0;
    }
    PostingSet(result)
}

/// Intersection of any number of sets, smallest first.
///
/// Stops as soon as the running result is empty. An empty input yields an
/// empty set (there is nothing to bound the result by).
pub fn multiintersection<'a, I>(sets: I) -> PostingSet
where
    I: IntoIterator<Item = &'a PostingSet>,
{
    let mut sets: Vec<&PostingSet> = sets.into_iter().collect();
    sets.sort_by_key(|s| s.len());

    let mut iter = sets.into_iter();
    let Some(first) = iter.next() else {
        return PostingSet::new();
    };

    let mut result = first.0.clone();
    for set in iter {
        if result.is_empty() {
            break;
        }
        result &= &set.0;
    }
    PostingSet(result)
}

/// Bound `set` by an optional restricting result set
pub fn restrict(set: PostingSet, resultset: Option<&PostingSet>) -> PostingSet {
    match resultset {
        Some(r) => intersection(&set, r),
        None => set,
    }
}

/// Add `doc_id` under `key`, creating the posting set on first use
pub(crate) fn insert_posting<K: Ord>(
    map: &mut BTreeMap<K, PostingSet>,
    key: K,
    doc_id: DocumentId,
) {
    map.entry(key).or_default().insert(doc_id);
}

/// Remove `doc_id` from `key`, dropping the entry once it is empty.
///
/// Returns false when the key was not present.
pub(crate) fn remove_posting<K: Ord>(
    map: &mut BTreeMap<K, PostingSet>,
    key: &K,
    doc_id: DocumentId,
) -> bool {
    let Some(set) = map.get_mut(key) else {
        return false;
    };
    set.remove(doc_id);
    if set.is_empty() {
        map.remove(key);
    }
    true
}
