//! # catdex - Content Catalog Index Engine
//!
//! catdex maps document attribute values to sets of document ids and answers
//! exact-match and date-containment queries over them. Results are
//! [roaring](https://docs.rs/roaring) bitmaps combined with a small set
//! algebra.
//!
//! ## Architecture
//!
//! - [`index`] - Index kinds, posting sets, request cache
//! - [`query`] - Query clauses and the [`Catalog`](query::Catalog) that
//!   evaluates them across indexes
//! - [`output`] - Result formatting for the CLI
//! - [`utils`] - App data directory, config and progress bars
//!
//! ## Quick Start
//!
//! ```
//! use catdex::index::{CatalogConfig, Document};
//! use catdex::query::{Catalog, Query, SearchOptions};
//! use serde_json::json;
//!
//! let config = CatalogConfig::from_json(r#"{"indexes": [
//!     {"id": "portal_type", "kind": "field"},
//!     {"id": "effective", "kind": "interval", "since_field": "start", "until_field": "end"}
//! ]}"#).unwrap();
//! let mut catalog = Catalog::from_config(&config).unwrap();
//!
//! catalog.catalog_object("/news/1", Document::new().with("portal_type", "News").with("start", 0)).unwrap();
//! catalog.catalog_object("/news/2", Document::new().with("portal_type", "News").with("start", 100)).unwrap();
//!
//! let query = Query::new()
//!     .with("portal_type", json!("News"))
//!     .with("effective", json!(50));
//! let results = catalog.search(&query, &SearchOptions::default()).unwrap();
//! assert_eq!(results.len(), 1);
//! ```
//!
//! ## Index kinds
//!
//! 1. **Field / Keyword / Boolean** - one attribute, single- or multi-valued
//! 2. **Interval** - `(since, until)` pairs split into four buckets so that a
//!    containment query is a few range scans
//! 3. **Composite** - several components indexed together under permuted
//!    keys; queries constraining two or more of them are rewritten into a
//!    single lookup

pub mod error;
pub mod index;
pub mod output;
pub mod query;
pub mod utils;

pub use error::{IndexError, QueryError};
