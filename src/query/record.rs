//! Query clauses as exchanged between the catalog and its indexes.
//!
//! A query maps index names to clauses. A clause is either a bare value, a
//! list of values, or an object:
//!
//! ```text
//! { "<index>": { "query": <value|[values]>,
//!                "range": "min" | "max" | "min:max",
//!                "not": <value|[values]>,
//!                "operator": "and" | "or" } }
//! ```
//!
//! Each index parses the clause that names it into an [`IndexQuery`] of its
//! own term type, honoring only the options it supports.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A catalog query: index name to clause
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(serde_json::Map<String, JsonValue>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style clause setter
    pub fn with(mut self, index: &str, clause: JsonValue) -> Self {
        self.insert(index, clause);
        self
    }

    pub fn insert(&mut self, index: &str, clause: JsonValue) {
        self.0.insert(index.to_string(), clause);
    }

    pub fn get(&self, index: &str) -> Option<&JsonValue> {
        self.0.get(index)
    }

    pub fn remove(&mut self, index: &str) -> Option<JsonValue> {
        self.0.remove(index)
    }

    pub fn contains(&self, index: &str) -> bool {
        self.0.contains_key(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl From<serde_json::Map<String, JsonValue>> for Query {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

/// How the postings of several keys are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    #[default]
    Or,
    And,
}

impl Operator {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        match raw.to_lowercase().as_str() {
            "or" => Ok(Operator::Or),
            "and" => Ok(Operator::And),
            _ => Err(QueryError::InvalidOperator(raw.to_string())),
        }
    }
}

/// Which ends of a range query are bounded by the given keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub min: bool,
    pub max: bool,
}

impl RangeSpec {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let spec = Self {
            min: raw.contains("min"),
            max: raw.contains("max"),
        };
        if !spec.min && !spec.max {
            return Err(QueryError::InvalidRange(raw.to_string()));
        }
        Ok(spec)
    }
}

/// Clause options beyond `query`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOption {
    Range,
    Not,
    Operator,
}

/// A parsed clause for one index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery<T> {
    pub id: String,
    /// Converted query keys; unconvertible keys are dropped
    pub keys: Vec<T>,
    pub operator: Operator,
    pub range: Option<RangeSpec>,
    pub not: Option<Vec<T>>,
}

impl<T> IndexQuery<T> {
    /// Parse the clause named `id` out of `query`.
    ///
    /// Returns `Ok(None)` when the query does not mention the index. Options
    /// not listed in `options` are ignored; keys for which `convert` returns
    /// `None` are skipped.
    pub fn parse<F>(
        query: &Query,
        id: &str,
        options: &[QueryOption],
        convert: F,
    ) -> Result<Option<Self>, QueryError>
    where
        F: Fn(&JsonValue) -> Option<T>,
    {
        let Some(param) = query.get(id) else {
            return Ok(None);
        };

        let mut record = Self {
            id: id.to_string(),
            keys: Vec::new(),
            operator: Operator::default(),
            range: None,
            not: None,
        };

        match param {
            JsonValue::Object(clause) => {
                if let Some(keys) = clause.get("query") {
                    record.keys = convert_list(keys, &convert);
                }
                for option in options {
                    match option {
                        QueryOption::Range => {
                            if let Some(raw) = clause.get("range") {
                                record.range = Some(RangeSpec::parse(&option_str(id, raw)?)?);
                            }
                        }
                        QueryOption::Not => {
                            if let Some(raw) = clause.get("not") {
                                record.not = Some(convert_list(raw, &convert));
                            }
                        }
                        QueryOption::Operator => {
                            if let Some(raw) = clause.get("operator") {
                                record.operator = Operator::parse(&option_str(id, raw)?)?;
                            }
                        }
                    }
                }
            }
            other => record.keys = convert_list(other, &convert),
        }

        Ok(Some(record))
    }

    /// Whether the clause carries a non-empty `not`
    pub fn has_not(&self) -> bool {
        self.not.as_ref().is_some_and(|n| !n.is_empty())
    }
}

impl<T: Ord + std::fmt::Debug + Clone> IndexQuery<T> {
    /// Stable textual form used as a cache record key.
    ///
    /// Keys and `not` values are sorted and de-duplicated so that clauses
    /// that differ only in key order share an entry.
    pub fn cache_record(&self) -> String {
        let mut keys = self.keys.clone();
        keys.sort();
        keys.dedup();
        let not = self.not.as_ref().map(|n| {
            let mut n = n.clone();
            n.sort();
            n.dedup();
            n
        });
        format!(
            "operator={:?};not={:?};range={:?};keys={:?}",
            self.operator, not, self.range, keys
        )
    }
}

fn convert_list<T, F>(raw: &JsonValue, convert: &F) -> Vec<T>
where
    F: Fn(&JsonValue) -> Option<T>,
{
    match raw {
        JsonValue::Array(items) => items.iter().filter_map(convert).collect(),
        single => convert(single).into_iter().collect(),
    }
}

fn option_str(id: &str, raw: &JsonValue) -> Result<String, QueryError> {
    raw.as_str()
        .map(str::to_string)
        .ok_or_else(|| QueryError::InvalidClause {
            index: id.to_string(),
            found: raw.to_string(),
        })
}
