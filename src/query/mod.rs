pub mod catalog;
pub mod record;

pub use catalog::{Catalog, CatalogIndex, Record, SearchOptions};
pub use record::{IndexQuery, Operator, Query, QueryOption, RangeSpec};
