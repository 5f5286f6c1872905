//! Error types for index mutation, management and query parsing.

use thiserror::Error;

/// Errors raised by index mutation and component management.
///
/// Data-shape problems inside a document are not errors (the offending
/// attribute simply contributes nothing); these variants cover the places
/// where malformed input or configuration must stop the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// An interval endpoint does not fit the 32-bit minute representation.
    #[error("{value} is not within the range of dates allowed")]
    Overflow { value: i64 },

    /// An interval endpoint is neither a number of minutes nor null.
    #[error("interval endpoint for '{field}' is not a number of minutes: {found}")]
    InvalidEndpoint { field: String, found: String },

    #[error("a component with this name already exists: {0}")]
    DuplicateComponent(String),

    #[error("no such component: {0}")]
    UnknownComponent(String),

    /// Rejected component definition (empty id, unknown kind, ...).
    #[error("invalid component: {0}")]
    InvalidComponent(String),

    /// Rejected index configuration.
    #[error("invalid configuration for index '{index}': {reason}")]
    InvalidConfig { index: String, reason: String },

    #[error("no such index: {0}")]
    UnknownIndex(String),

    #[error("an index with this name already exists: {0}")]
    DuplicateIndex(String),

    #[error("index '{index}' is a {found} index, expected {expected}")]
    WrongIndexKind {
        index: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Errors raised while parsing a query clause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("operator not valid: {0:?}")]
    InvalidOperator(String),

    #[error("range not valid: {0:?}")]
    InvalidRange(String),

    #[error("query clause for '{index}' has an unsupported shape: {found}")]
    InvalidClause { index: String, found: String },
}

pub type Result<T, E = IndexError> = std::result::Result<T, E>;
