//! Composite index over several attribute components.
//!
//! A document is indexed under every ordered sub-combination (of at least
//! [`MIN_COMPONENTS`] members) of its component values, so a query that
//! constrains several components at once can be answered with one lookup
//! instead of one per component followed by an intersection.
//!
//! ```text
//! components: portal_type, review_state, Subject
//! document:   Document,    pending,      [a, b]
//!
//! keys: (portal_type=Document, review_state=pending)
//!       (portal_type=Document, Subject=a)
//!       (review_state=pending, Subject=a)
//!       (portal_type=Document, review_state=pending, Subject=a)
//!       ... and likewise for Subject=b
//! ```
//!
//! [`CompositeIndex::rewrite`] turns the matching per-component clauses of a
//! query into a single clause for this index.

use crate::error::{IndexError, QueryError, Result};
use crate::index::attribute::AttributeKind;
use crate::index::cache::RequestCache;
use crate::index::postings::PostingSet;
use crate::index::types::{
    ComponentConfig, Document, DocumentId, PermutedKey, Value, normalize_attributes,
};
use crate::index::unindex::UnIndex;
use crate::query::record::{IndexQuery, Operator, Query, QueryOption};
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Fewest components a composite key combines
pub const MIN_COMPONENTS: usize = 2;

const KIND: &str = "CompositeIndex";
const QUERY_OPTIONS: &[QueryOption] = &[QueryOption::Operator];

pub type ComponentKind = AttributeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    id: String,
    kind: ComponentKind,
    attributes: Vec<String>,
}

impl Component {
    pub fn new(id: &str, kind: &str, attributes: &[String]) -> Result<Self> {
        if id.trim().is_empty() {
            return Err(IndexError::InvalidComponent(
                "length of component id too short".to_string(),
            ));
        }
        Ok(Self {
            id: id.to_string(),
            kind: kind.parse()?,
            attributes: normalize_attributes(id, attributes),
        })
    }

    pub fn from_config(config: &ComponentConfig) -> Result<Self> {
        Self::new(&config.id, &config.kind, &config.attributes)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Component-tagged values a document contributes
    fn keywords(&self, doc: &Document) -> Vec<(String, Value)> {
        self.tag(self.kind.extract(&self.attributes, doc))
    }

    fn tag(&self, values: Vec<Value>) -> Vec<(String, Value)> {
        values.into_iter().map(|v| (self.id.clone(), v)).collect()
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<id: {}; kind: {}; attributes: {}>",
            self.id,
            self.kind,
            self.attributes.join(",")
        )
    }
}

/// Replacement of one component by a new definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentEdit {
    pub old_id: String,
    #[serde(flatten)]
    pub component: ComponentConfig,
}

/// Components in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRegistry(Vec<Component>);

impl ComponentRegistry {
    pub fn get(&self, id: &str) -> Option<&Component> {
        self.0.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn insert(&mut self, component: Component) -> Result<()> {
        if self.contains(&component.id) {
            return Err(IndexError::DuplicateComponent(component.id));
        }
        self.0.push(component);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Component> {
        let pos = self
            .0
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| IndexError::UnknownComponent(id.to_string()))?;
        Ok(self.0.remove(pos))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.0.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Read access to the entries other indexes hold for a document
pub trait EntrySource {
    /// Stored values of the index named `index_id` for `doc_id`
    fn entry(&self, index_id: &str, doc_id: DocumentId) -> Option<Vec<Value>>;
}

/// Caller-supplied switches for [`CompositeIndex::rewrite`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Leave every query untouched
    pub skip_composite: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeIndex {
    components: ComponentRegistry,
    index: UnIndex<PermutedKey>,
}

impl CompositeIndex {
    pub fn new(id: &str, components: &[ComponentConfig]) -> Result<Self> {
        let mut registry = ComponentRegistry::default();
        for config in components {
            registry.insert(Component::from_config(config)?)?;
        }
        Ok(Self {
            components: registry,
            index: UnIndex::new(id),
        })
    }

    pub fn id(&self) -> &str {
        self.index.id()
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn generation(&self) -> u64 {
        self.index.generation()
    }

    /// Register a component; the index is cleared
    pub fn add_component(&mut self, config: &ComponentConfig) -> Result<()> {
        self.components.insert(Component::from_config(config)?)?;
        self.clear();
        Ok(())
    }

    /// Remove a component; the index is cleared
    pub fn del_component(&mut self, id: &str) -> Result<()> {
        self.components.remove(id)?;
        self.clear();
        Ok(())
    }

    /// Apply several edits at once; nothing changes unless all succeed
    pub fn save_components(&mut self, edits: &[ComponentEdit]) -> Result<()> {
        let mut registry = self.components.clone();
        for edit in edits {
            registry.remove(&edit.old_id)?;
            registry.insert(Component::from_config(&edit.component)?)?;
        }
        self.components = registry;
        self.clear();
        Ok(())
    }

    /// Every composite key a document is indexed under
    pub fn permuted_keywords(&self, doc: &Document) -> Vec<PermutedKey> {
        let lists: Vec<Vec<(String, Value)>> = self
            .components
            .iter()
            .map(|c| c.keywords(doc))
            .filter(|kw| !kw.is_empty())
            .collect();
        permute(&lists)
    }

    pub fn index_object(&mut self, doc_id: DocumentId, doc: &Document) -> bool {
        let keys = self.permuted_keywords(doc);
        self.index.index_terms(doc_id, keys)
    }

    pub fn unindex_object(&mut self, doc_id: DocumentId) -> bool {
        self.index.unindex(doc_id)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn get_entry(&self, doc_id: DocumentId) -> Option<&[PermutedKey]> {
        self.index.get_entry(doc_id)
    }

    pub fn num_objects(&self) -> usize {
        self.index.num_objects()
    }

    pub fn index_size(&self) -> usize {
        self.index.index_size()
    }

    pub fn unique_values(&self) -> impl Iterator<Item = (&PermutedKey, u64)> {
        self.index.unique_values()
    }

    pub fn histogram(&self) -> BTreeMap<u64, usize> {
        self.index.histogram()
    }

    /// Replace the component clauses of `query` with one composite clause.
    ///
    /// A component clause takes part only when it has keys and uses neither
    /// `not`, `range` nor the `and` operator. With fewer than
    /// [`MIN_COMPONENTS`] such clauses the query is returned unchanged.
    pub fn rewrite(&self, query: &Query, options: &RewriteOptions) -> Result<Query, QueryError> {
        if options.skip_composite {
            debug!("{}: skip composite query build", self.id());
            return Ok(query.clone());
        }
        if self.index.num_objects() == 0 {
            return Ok(query.clone());
        }

        let mut records = Vec::new();
        for component in self.components.iter() {
            let kind = component.kind;
            let Some(record) = IndexQuery::parse(query, &component.id, kind.query_options(), |raw| {
                kind.convert_key(raw)
            })?
            else {
                continue;
            };

            if record.has_not() || record.operator == Operator::And || record.range.is_some() {
                debug!(
                    "{}: clause for {} cannot be composed",
                    self.id(),
                    component.id
                );
                continue;
            }
            if record.keys.is_empty() {
                continue;
            }
            records.push(record);
        }

        if records.len() < MIN_COMPONENTS {
            return Ok(query.clone());
        }

        let lists: Vec<Vec<(String, Value)>> = records
            .iter()
            .map(|r| r.keys.iter().map(|k| (r.id.clone(), k.clone())).collect())
            .collect();
        let keys: Vec<serde_json::Value> = product(&lists)
            .into_iter()
            .map(|pairs| PermutedKey::new(pairs).to_json())
            .collect();

        let mut rewritten = query.clone();
        for record in &records {
            rewritten.remove(&record.id);
        }
        rewritten.insert(self.id(), json!({ "query": keys }));

        debug!(
            "{}: rewrote {} clauses into {} composite keys",
            self.id(),
            records.len(),
            keys.len()
        );
        Ok(rewritten)
    }

    pub fn apply_query(
        &self,
        query: &Query,
        resultset: Option<&PostingSet>,
        cache: Option<&mut RequestCache>,
    ) -> Result<Option<PostingSet>, QueryError> {
        let Some(record) = IndexQuery::parse(query, self.id(), QUERY_OPTIONS, PermutedKey::from_json)? else {
            return Ok(None);
        };
        Ok(Some(self.index.query_index(KIND, &record, resultset, cache)))
    }

    /// Rebuild from the entries sibling indexes already hold.
    ///
    /// Documents are processed in batches of `threshold`; the keys of a batch
    /// are derived in parallel and applied in order, and `checkpoint` is
    /// called with the running total after every full batch. Returns the
    /// number of documents processed.
    pub fn fast_build<S, F>(
        &mut self,
        source: &S,
        doc_ids: &[DocumentId],
        threshold: usize,
        mut checkpoint: F,
    ) -> usize
    where
        S: EntrySource + Sync,
        F: FnMut(usize),
    {
        self.clear();
        let threshold = threshold.max(1);
        let mut processed = 0;

        for batch in doc_ids.chunks(threshold) {
            let components = &self.components;
            let keyed: Vec<(DocumentId, Vec<PermutedKey>)> = batch
                .par_iter()
                .map(|&doc_id| (doc_id, keywords_from_entries(components, source, doc_id)))
                .collect();

            for (doc_id, keys) in keyed {
                self.index.index_terms(doc_id, keys);
            }

            processed += batch.len();
            if batch.len() == threshold {
                info!("{}: fast build checkpoint at {} documents", self.id(), processed);
                checkpoint(processed);
            }
        }

        info!(
            "{}: fast build indexed {} of {} documents",
            self.id(),
            self.num_objects(),
            processed
        );
        processed
    }
}

fn keywords_from_entries<S: EntrySource>(
    components: &ComponentRegistry,
    source: &S,
    doc_id: DocumentId,
) -> Vec<PermutedKey> {
    let lists: Vec<Vec<(String, Value)>> = components
        .iter()
        .filter_map(|c| {
            let entry = source.entry(&c.id, doc_id)?;
            let keywords = c.tag(c.kind.from_entry(&entry));
            (!keywords.is_empty()).then_some(keywords)
        })
        .collect();
    permute(&lists)
}

/// Ordered sub-combinations of length `MIN_COMPONENTS..=n` of every tuple in
/// the product of `lists`, without duplicates.
pub fn permute(lists: &[Vec<(String, Value)>]) -> Vec<PermutedKey> {
    let mut seen = FxHashSet::default();
    let mut keys = Vec::new();

    for tuple in product(lists) {
        for r in MIN_COMPONENTS..=tuple.len() {
            for combination in combinations(&tuple, r) {
                let key = PermutedKey::new(combination);
                if seen.insert(key.clone()) {
                    keys.push(key);
                }
            }
        }
    }
    keys
}

/// Cartesian product, last list varying fastest
fn product<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut next = prefix.clone();
                    next.push(item.clone());
                    next
                })
            })
            .collect()
    })
}

/// `r`-length combinations in lexicographic position order
fn combinations<T: Clone>(items: &[T], r: usize) -> Vec<Vec<T>> {
    if r == 0 {
        return vec![Vec::new()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        if items.len() - i < r {
            break;
        }
        for rest in combinations(&items[i + 1..], r - 1) {
            let mut combination = Vec::with_capacity(r);
            combination.push(items[i].clone());
            combination.extend(rest);
            out.push(combination);
        }
    }
    out
}
