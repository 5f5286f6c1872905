use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque document handle handed out by the catalog
pub type DocumentId = u32;

/// Largest magnitude an interval endpoint may have, in minutes (32-bit)
pub const MAX32: i64 = (1 << 31) - 1;

/// Default lower bound of the date-range window (1000-01-01, in minutes)
pub const DEFAULT_FLOOR_VALUE: i64 = -510_162_480;

/// Default upper bound of the date-range window (2499-12-31, in minutes)
pub const DEFAULT_CEILING_VALUE: i64 = 278_751_600;

/// Default endpoint precision, in minutes
pub const DEFAULT_PRECISION_VALUE: i64 = 1;

/// Documents processed between two checkpoints of a composite fast build
pub const DEFAULT_FAST_BUILD_THRESHOLD: usize = 10_000;

/// Entries a request cache holds before evicting the least recently used
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// An indexable scalar.
///
/// The variant order is part of the ordering: every boolean sorts before every
/// integer, which sorts before every string. Range queries over a forward map
/// rely on this total order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Value {
    /// Convert a JSON attribute into a term.
    ///
    /// Floats, nulls, arrays and objects have no term representation and
    /// yield `None`; callers treat that as "no contribution".
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Int),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            _ => None,
        }
    }

    /// Boolean coercion to `Int(0)` / `Int(1)`
    pub fn coerce_bool(truthy: bool) -> Self {
        Value::Int(truthy as i64)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Text(s) => !s.is_empty(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Python-style truthiness of a raw JSON attribute
pub fn json_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}

/// A catalogued object: named attributes with arbitrary JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    attributes: BTreeMap<String, serde_json::Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter
    pub fn with(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<serde_json::Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => Some(Self {
                attributes: map.into_iter().collect(),
            }),
            _ => None,
        }
    }
}

/// Composite-index term: component-tagged values in component order.
///
/// Serialized as a list of `[component_id, value]` pairs. Equality is
/// order-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermutedKey(Vec<(String, Value)>);

impl PermutedKey {
    pub fn new(pairs: Vec<(String, Value)>) -> Self {
        Self(pairs)
    }

    pub fn pairs(&self) -> &[(String, Value)] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Query-clause form: `[[component_id, value], ...]`
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.0
                .iter()
                .map(|(component, value)| {
                    serde_json::Value::Array(vec![
                        serde_json::Value::String(component.clone()),
                        value.to_json(),
                    ])
                })
                .collect(),
        )
    }

    /// Inverse of [`PermutedKey::to_json`]; any other shape yields `None`
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let pairs = value.as_array()?;
        let mut key = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match pair.as_array().map(Vec::as_slice) {
                Some([serde_json::Value::String(component), value]) => {
                    key.push((component.clone(), Value::from_json(value)?));
                }
                _ => return None,
            }
        }
        Some(Self(key))
    }
}

impl<S: Into<String>, V: Into<Value>> FromIterator<(S, V)> for PermutedKey {
    fn from_iter<I: IntoIterator<Item = (S, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(c, v)| (c.into(), v.into())).collect())
    }
}

impl fmt::Display for PermutedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (component, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", component, value)?;
        }
        write!(f, ")")
    }
}

/// Split, trim and default an attribute list.
///
/// Entries may themselves be comma-separated (`"keyword,subject"`); an empty
/// result falls back to `[id]`.
pub fn normalize_attributes(id: &str, raw: &[String]) -> Vec<String> {
    let attributes: Vec<String> = raw
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();

    if attributes.is_empty() {
        vec![id.to_string()]
    } else {
        attributes
    }
}

/// Configuration for a date-range index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    pub since_field: String,
    pub until_field: String,
    #[serde(default = "default_floor_value")]
    pub floor_value: i64,
    #[serde(default = "default_ceiling_value")]
    pub ceiling_value: i64,
    /// Endpoint granularity in minutes
    #[serde(default = "default_precision_value")]
    pub precision_value: i64,
}

fn default_floor_value() -> i64 {
    DEFAULT_FLOOR_VALUE
}

fn default_ceiling_value() -> i64 {
    DEFAULT_CEILING_VALUE
}

fn default_precision_value() -> i64 {
    DEFAULT_PRECISION_VALUE
}

impl IntervalConfig {
    pub fn new(since_field: &str, until_field: &str) -> Self {
        Self {
            since_field: since_field.to_string(),
            until_field: until_field.to_string(),
            floor_value: DEFAULT_FLOOR_VALUE,
            ceiling_value: DEFAULT_CEILING_VALUE,
            precision_value: DEFAULT_PRECISION_VALUE,
        }
    }
}

/// One component of a composite index, as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub id: String,
    /// `field`, `keyword` or `boolean`
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl ComponentConfig {
    pub fn new(id: &str, kind: &str, attributes: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            kind: kind.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Index kind plus its kind-specific settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexKind {
    Field {
        #[serde(default)]
        attributes: Vec<String>,
    },
    Keyword {
        #[serde(default)]
        attributes: Vec<String>,
    },
    Boolean {
        #[serde(default)]
        attributes: Vec<String>,
    },
    Interval(IntervalConfig),
    Composite {
        #[serde(default)]
        components: Vec<ComponentConfig>,
    },
}

/// Configuration of a single named index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: IndexKind,
}

/// Catalog layout: the indexes to create, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub indexes: Vec<IndexConfig>,
}

impl CatalogConfig {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Serialize an ordered map as a list of `[key, value]` pairs.
///
/// JSON object keys must be strings, which would lose the type of `Value`
/// and cannot hold a `PermutedKey` at all.
pub(crate) mod entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
