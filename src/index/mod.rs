pub mod attribute;
pub mod cache;
pub mod composite;
pub mod interval;
pub mod postings;
pub mod stats;
pub mod types;
pub mod unindex;

pub use attribute::{AttributeIndex, AttributeKind};
pub use cache::{CacheKey, CacheStats, RequestCache};
pub use composite::{
    Component, ComponentEdit, ComponentKind, ComponentRegistry, CompositeIndex, EntrySource,
    MIN_COMPONENTS, RewriteOptions,
};
pub use interval::{Bucket, Interval, IntervalIndex};
pub use postings::PostingSet;
pub use types::*;
pub use unindex::UnIndex;
