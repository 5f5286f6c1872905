//! The catalog: named indexes over a shared document store.
//!
//! Searching rewrites the query through every composite index, then evaluates
//! each named index in registration order, feeding the running intersection
//! to the next index as its result set.

use crate::error::{IndexError, Result};
use crate::index::attribute::{AttributeIndex, AttributeKind};
use crate::index::cache::RequestCache;
use crate::index::composite::{CompositeIndex, EntrySource, RewriteOptions};
use crate::index::interval::IntervalIndex;
use crate::index::postings::PostingSet;
use crate::index::types::{
    CatalogConfig, DEFAULT_CACHE_CAPACITY, Document, DocumentId, IndexConfig, IndexKind, Value,
};
use crate::query::record::Query;
use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Any index a catalog can hold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogIndex {
    Attribute(AttributeIndex),
    Interval(IntervalIndex),
    Composite(CompositeIndex),
}

impl CatalogIndex {
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        let id = config.id.as_str();
        if id.trim().is_empty() {
            return Err(IndexError::InvalidConfig {
                index: id.to_string(),
                reason: "index id is empty".to_string(),
            });
        }
        Ok(match &config.kind {
            IndexKind::Field { attributes } => {
                CatalogIndex::Attribute(AttributeIndex::new(id, AttributeKind::Field, attributes))
            }
            IndexKind::Keyword { attributes } => {
                CatalogIndex::Attribute(AttributeIndex::new(id, AttributeKind::Keyword, attributes))
            }
            IndexKind::Boolean { attributes } => {
                CatalogIndex::Attribute(AttributeIndex::new(id, AttributeKind::Boolean, attributes))
            }
            IndexKind::Interval(interval) => {
                CatalogIndex::Interval(IntervalIndex::new(id, interval.clone())?)
            }
            IndexKind::Composite { components } => {
                CatalogIndex::Composite(CompositeIndex::new(id, components)?)
            }
        })
    }

    pub fn id(&self) -> &str {
        match self {
            CatalogIndex::Attribute(index) => index.id(),
            CatalogIndex::Interval(index) => index.id(),
            CatalogIndex::Composite(index) => index.id(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CatalogIndex::Attribute(index) => index.kind().name(),
            CatalogIndex::Interval(_) => "IntervalIndex",
            CatalogIndex::Composite(_) => "CompositeIndex",
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            CatalogIndex::Attribute(index) => index.generation(),
            CatalogIndex::Interval(index) => index.generation(),
            CatalogIndex::Composite(index) => index.generation(),
        }
    }

    pub fn num_objects(&self) -> usize {
        match self {
            CatalogIndex::Attribute(index) => index.num_objects(),
            CatalogIndex::Interval(index) => index.num_objects(),
            CatalogIndex::Composite(index) => index.num_objects(),
        }
    }

    pub fn index_size(&self) -> usize {
        match self {
            CatalogIndex::Attribute(index) => index.index_size(),
            CatalogIndex::Interval(index) => index.index_size(),
            CatalogIndex::Composite(index) => index.index_size(),
        }
    }

    pub fn unindex_object(&mut self, doc_id: DocumentId) -> bool {
        match self {
            CatalogIndex::Attribute(index) => index.unindex_object(doc_id),
            CatalogIndex::Interval(index) => index.unindex_object(doc_id),
            CatalogIndex::Composite(index) => index.unindex_object(doc_id),
        }
    }

    pub fn clear(&mut self) {
        match self {
            CatalogIndex::Attribute(index) => index.clear(),
            CatalogIndex::Interval(index) => index.clear(),
            CatalogIndex::Composite(index) => index.clear(),
        }
    }

    pub fn apply_query(
        &self,
        query: &Query,
        resultset: Option<&PostingSet>,
        cache: Option<&mut RequestCache>,
    ) -> Result<Option<PostingSet>> {
        Ok(match self {
            CatalogIndex::Attribute(index) => index.apply_query(query, resultset, cache)?,
            CatalogIndex::Interval(index) => index.apply_query(query, resultset, cache)?,
            CatalogIndex::Composite(index) => index.apply_query(query, resultset, cache)?,
        })
    }
}

/// Read-only view of the indexes next to the one being rebuilt
struct Siblings<'a> {
    before: &'a [CatalogIndex],
    after: &'a [CatalogIndex],
}

impl EntrySource for Siblings<'_> {
    fn entry(&self, index_id: &str, doc_id: DocumentId) -> Option<Vec<Value>> {
        self.before
            .iter()
            .chain(self.after)
            .find_map(|index| match index {
                CatalogIndex::Attribute(attr) if attr.id() == index_id => {
                    Some(attr.get_entry(doc_id).map(<[Value]>::to_vec))
                }
                _ => None,
            })
            .flatten()
    }
}

/// Switches for [`Catalog::search`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Evaluate every clause on its own index, never through a composite
    pub atomic: bool,
    pub skip_composite: bool,
    pub cache_capacity: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            atomic: false,
            skip_composite: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// A catalogued document and the key it was registered under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub key: String,
    pub document: Document,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    indexes: Vec<CatalogIndex>,
    records: BTreeMap<DocumentId, Record>,
    paths: BTreeMap<String, DocumentId>,
    next_id: DocumentId,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for index in &config.indexes {
            catalog.add_index(index)?;
        }
        Ok(catalog)
    }

    /// Create an index and fill it from the documents already catalogued
    pub fn add_index(&mut self, config: &IndexConfig) -> Result<()> {
        if self.index(&config.id).is_some() {
            return Err(IndexError::DuplicateIndex(config.id.clone()));
        }
        let mut index = CatalogIndex::from_config(config)?;

        match &mut index {
            CatalogIndex::Attribute(attr) => {
                for (doc_id, record) in &self.records {
                    attr.index_object(*doc_id, &record.document);
                }
            }
            CatalogIndex::Interval(interval) => {
                for (doc_id, record) in &self.records {
                    interval.index_object(*doc_id, &record.document)?;
                }
            }
            CatalogIndex::Composite(composite) => {
                for (doc_id, record) in &self.records {
                    composite.index_object(*doc_id, &record.document);
                }
            }
        }

        self.indexes.push(index);
        Ok(())
    }

    pub fn del_index(&mut self, id: &str) -> Result<CatalogIndex> {
        let pos = self.position(id)?;
        Ok(self.indexes.remove(pos))
    }

    pub fn index(&self, id: &str) -> Option<&CatalogIndex> {
        self.indexes.iter().find(|index| index.id() == id)
    }

    pub fn indexes(&self) -> &[CatalogIndex] {
        &self.indexes
    }

    pub fn composite(&self, id: &str) -> Result<&CompositeIndex> {
        match self.index(id) {
            Some(CatalogIndex::Composite(composite)) => Ok(composite),
            Some(other) => Err(IndexError::WrongIndexKind {
                index: id.to_string(),
                expected: "CompositeIndex",
                found: other.kind_name(),
            }),
            None => Err(IndexError::UnknownIndex(id.to_string())),
        }
    }

    pub fn composite_mut(&mut self, id: &str) -> Result<&mut CompositeIndex> {
        let pos = self.position(id)?;
        match &mut self.indexes[pos] {
            CatalogIndex::Composite(composite) => Ok(composite),
            other => Err(IndexError::WrongIndexKind {
                index: id.to_string(),
                expected: "CompositeIndex",
                found: other.kind_name(),
            }),
        }
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.indexes
            .iter()
            .position(|index| index.id() == id)
            .ok_or_else(|| IndexError::UnknownIndex(id.to_string()))
    }

    /// Add or update a document under `key`.
    ///
    /// Interval endpoints are validated first, so a rejected document leaves
    /// every index untouched.
    pub fn catalog_object(&mut self, key: &str, document: Document) -> Result<DocumentId> {
        let intervals = self
            .indexes
            .iter()
            .filter_map(|index| match index {
                CatalogIndex::Interval(interval) => Some(interval.extract(&document)),
                _ => None,
            })
            .collect::<Result<Vec<_>>>()?;

        let doc_id = match self.paths.get(key) {
            Some(doc_id) => *doc_id,
            None => {
                let doc_id = self.next_id;
                self.next_id += 1;
                self.paths.insert(key.to_string(), doc_id);
                doc_id
            }
        };

        let mut intervals = intervals.into_iter();
        for index in &mut self.indexes {
            match index {
                CatalogIndex::Attribute(attr) => {
                    attr.index_object(doc_id, &document);
                }
                CatalogIndex::Interval(interval) => {
                    if let Some(extracted) = intervals.next() {
                        interval.index_interval(doc_id, extracted);
                    }
                }
                CatalogIndex::Composite(composite) => {
                    composite.index_object(doc_id, &document);
                }
            }
        }

        self.records.insert(
            doc_id,
            Record {
                key: key.to_string(),
                document,
            },
        );
        Ok(doc_id)
    }

    /// Remove a document; false when the key is unknown
    pub fn uncatalog_object(&mut self, key: &str) -> bool {
        let Some(doc_id) = self.paths.remove(key) else {
            debug!("uncatalog of unknown key {}", key);
            return false;
        };
        for index in &mut self.indexes {
            index.unindex_object(doc_id);
        }
        self.records.remove(&doc_id);
        true
    }

    pub fn document_id(&self, key: &str) -> Option<DocumentId> {
        self.paths.get(key).copied()
    }

    pub fn record(&self, doc_id: DocumentId) -> Option<&Record> {
        self.records.get(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn all_documents(&self) -> PostingSet {
        self.records.keys().copied().collect()
    }

    /// Rewrite `query` through every composite index
    pub fn rewrite(&self, query: &Query, options: &RewriteOptions) -> Result<Query> {
        let mut query = query.clone();
        for index in &self.indexes {
            if let CatalogIndex::Composite(composite) = index {
                query = composite.rewrite(&query, options)?;
            }
        }
        Ok(query)
    }

    pub fn search(&self, query: &Query, options: &SearchOptions) -> Result<PostingSet> {
        let mut cache = RequestCache::with_capacity(options.cache_capacity);
        self.search_cached(query, options, &mut cache)
    }

    /// Evaluate without composite rewriting
    pub fn search_atomic(&self, query: &Query) -> Result<PostingSet> {
        let options = SearchOptions {
            atomic: true,
            ..SearchOptions::default()
        };
        self.search(query, &options)
    }

    /// Search with a caller-owned request cache
    pub fn search_cached(
        &self,
        query: &Query,
        options: &SearchOptions,
        cache: &mut RequestCache,
    ) -> Result<PostingSet> {
        let query = if options.atomic {
            query.clone()
        } else {
            self.rewrite(
                query,
                &RewriteOptions {
                    skip_composite: options.skip_composite,
                },
            )?
        };

        let mut result: Option<PostingSet> = None;
        for index in &self.indexes {
            let Some(set) = index.apply_query(&query, result.as_ref(), Some(&mut *cache))? else {
                continue;
            };
            if set.is_empty() {
                debug!("{}: empty result, stopping", index.id());
                return Ok(set);
            }
            result = Some(set);
        }

        Ok(result.unwrap_or_else(|| self.all_documents()))
    }

    /// Clear one index, or every index when `id` is `None`
    pub fn clear_index(&mut self, id: Option<&str>) -> Result<()> {
        match id {
            Some(id) => {
                let pos = self.position(id)?;
                self.indexes[pos].clear();
            }
            None => self.indexes.iter_mut().for_each(CatalogIndex::clear),
        }
        Ok(())
    }

    /// Rebuild a composite index from its siblings' stored entries
    pub fn fast_build<F>(&mut self, id: &str, threshold: usize, checkpoint: F) -> Result<usize>
    where
        F: FnMut(usize),
    {
        let pos = self.position(id)?;
        let doc_ids: Vec<DocumentId> = self.records.keys().copied().collect();

        let (before, rest) = self.indexes.split_at_mut(pos);
        let Some((target, after)) = rest.split_first_mut() else {
            return Err(IndexError::UnknownIndex(id.to_string()));
        };
        let composite = match target {
            CatalogIndex::Composite(composite) => composite,
            other => {
                return Err(IndexError::WrongIndexKind {
                    index: id.to_string(),
                    expected: "CompositeIndex",
                    found: other.kind_name(),
                });
            }
        };

        let siblings = Siblings { before, after };
        Ok(composite.fast_build(&siblings, &doc_ids, threshold, checkpoint))
    }

    /// Write the whole catalog as a JSON snapshot
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create snapshot {}", path.display()))?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)
            .context("Failed to serialize catalog")?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open snapshot {}", path.display()))?;
        let catalog = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
        Ok(catalog)
    }
}
