//! Single-attribute indexes: field, keyword and boolean.
//!
//! The three kinds share storage and query evaluation ([`UnIndex`]) and differ
//! only in how a document's attributes become terms:
//!
//! - **Field**: the last listed attribute that is present and convertible
//! - **Keyword**: every convertible value of the last listed attribute
//! - **Boolean**: the last listed attribute coerced to `0` / `1`

use crate::error::{IndexError, QueryError};
use crate::index::cache::RequestCache;
use crate::index::postings::PostingSet;
use crate::index::types::{Document, DocumentId, Value, json_truthy, normalize_attributes};
use crate::index::unindex::UnIndex;
use crate::query::record::{IndexQuery, Query, QueryOption};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const SCALAR_OPTIONS: &[QueryOption] = &[QueryOption::Range, QueryOption::Not];
const KEYWORD_OPTIONS: &[QueryOption] = &[QueryOption::Range, QueryOption::Not, QueryOption::Operator];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Field,
    Keyword,
    Boolean,
}

impl AttributeKind {
    /// Kind name used in cache keys and listings
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Field => "FieldIndex",
            AttributeKind::Keyword => "KeywordIndex",
            AttributeKind::Boolean => "BooleanIndex",
        }
    }

    /// Clause options this kind honors
    pub fn query_options(self) -> &'static [QueryOption] {
        match self {
            AttributeKind::Field | AttributeKind::Boolean => SCALAR_OPTIONS,
            AttributeKind::Keyword => KEYWORD_OPTIONS,
        }
    }

    /// Convert one query key into a term of this kind
    pub fn convert_key(self, raw: &JsonValue) -> Option<Value> {
        match self {
            AttributeKind::Boolean => Some(Value::coerce_bool(json_truthy(raw))),
            AttributeKind::Field | AttributeKind::Keyword => Value::from_json(raw),
        }
    }

    /// Terms a document contributes under `attributes`.
    ///
    /// An empty result means the document is not indexed.
    pub fn extract(self, attributes: &[String], doc: &Document) -> Vec<Value> {
        match self {
            AttributeKind::Field => attributes
                .iter()
                .rev()
                .filter_map(|attr| doc.get(attr))
                .find_map(Value::from_json)
                .into_iter()
                .collect(),
            AttributeKind::Keyword => {
                let Some(raw) = attributes.last().and_then(|attr| doc.get(attr)) else {
                    return Vec::new();
                };
                let mut values: Vec<Value> = match raw {
                    JsonValue::Array(items) => items.iter().filter_map(Value::from_json).collect(),
                    single => Value::from_json(single).into_iter().collect(),
                };
                values.sort();
                values.dedup();
                values
            }
            AttributeKind::Boolean => attributes
                .last()
                .and_then(|attr| doc.get(attr))
                .map(|raw| vec![Value::coerce_bool(json_truthy(raw))])
                .unwrap_or_default(),
        }
    }

    /// Terms derived from another index's stored entry for the same document
    pub fn from_entry(self, entry: &[Value]) -> Vec<Value> {
        match self {
            AttributeKind::Field => entry.last().cloned().into_iter().collect(),
            AttributeKind::Keyword => entry.to_vec(),
            AttributeKind::Boolean => entry
                .last()
                .map(|value| vec![Value::coerce_bool(value.is_truthy())])
                .unwrap_or_default(),
        }
    }
}

impl FromStr for AttributeKind {
    type Err = IndexError;

    /// Accepts `field` / `FieldIndex` and likewise for the other kinds
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.strip_suffix("index").unwrap_or(lower.as_str()) {
            "field" => Ok(AttributeKind::Field),
            "keyword" => Ok(AttributeKind::Keyword),
            "boolean" => Ok(AttributeKind::Boolean),
            "" => Err(IndexError::InvalidComponent("no component type set".to_string())),
            _ => Err(IndexError::InvalidComponent(format!("unknown component type {:?}", s))),
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named index over one or more document attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeIndex {
    kind: AttributeKind,
    attributes: Vec<String>,
    index: UnIndex<Value>,
}

impl AttributeIndex {
    pub fn new(id: &str, kind: AttributeKind, attributes: &[String]) -> Self {
        Self {
            kind,
            attributes: normalize_attributes(id, attributes),
            index: UnIndex::new(id),
        }
    }

    pub fn id(&self) -> &str {
        self.index.id()
    }

    pub fn kind(&self) -> AttributeKind {
        self.kind
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn generation(&self) -> u64 {
        self.index.generation()
    }

    /// Index or re-index a document; false when nothing changed
    pub fn index_object(&mut self, doc_id: DocumentId, doc: &Document) -> bool {
        let terms = self.kind.extract(&self.attributes, doc);
        self.index.index_terms(doc_id, terms)
    }

    pub fn unindex_object(&mut self, doc_id: DocumentId) -> bool {
        self.index.unindex(doc_id)
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn get_entry(&self, doc_id: DocumentId) -> Option<&[Value]> {
        self.index.get_entry(doc_id)
    }

    pub fn num_objects(&self) -> usize {
        self.index.num_objects()
    }

    pub fn index_size(&self) -> usize {
        self.index.index_size()
    }

    pub fn unique_values(&self) -> impl Iterator<Item = (&Value, u64)> {
        self.index.unique_values()
    }

    pub fn histogram(&self) -> BTreeMap<u64, usize> {
        self.index.histogram()
    }

    pub fn parse_query(&self, query: &Query) -> Result<Option<IndexQuery<Value>>, QueryError> {
        let kind = self.kind;
        IndexQuery::parse(query, self.id(), kind.query_options(), |raw| kind.convert_key(raw))
    }

    /// Evaluate this index's clause of `query`, if it has one
    pub fn apply_query(
        &self,
        query: &Query,
        resultset: Option<&PostingSet>,
        cache: Option<&mut RequestCache>,
    ) -> Result<Option<PostingSet>, QueryError> {
        let Some(record) = self.parse_query(query)? else {
            return Ok(None);
        };
        Ok(Some(self.index.query_index(
            self.kind.name(),
            &record,
            resultset,
            cache,
        )))
    }
}
