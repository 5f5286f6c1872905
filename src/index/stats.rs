use crate::query::catalog::{Catalog, CatalogIndex};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Summary of one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub id: String,
    pub kind: &'static str,
    pub objects: usize,
    pub terms: usize,
    pub generation: u64,
}

impl IndexStats {
    pub fn of(index: &CatalogIndex) -> Self {
        Self {
            id: index.id().to_string(),
            kind: index.kind_name(),
            objects: index.num_objects(),
            terms: index.index_size(),
            generation: index.generation(),
        }
    }
}

pub fn collect_stats(catalog: &Catalog) -> Vec<IndexStats> {
    catalog.indexes().iter().map(IndexStats::of).collect()
}

/// Display catalog statistics
pub fn show_stats(catalog: &Catalog, snapshot: &Path) -> Result<()> {
    println!("Catalog Statistics");
    println!("==================");
    println!();
    println!("Snapshot:         {}", snapshot.display());
    println!("Document count:   {}", catalog.len());
    println!("Index count:      {}", catalog.indexes().len());

    if let Ok(meta) = std::fs::metadata(snapshot) {
        println!("Snapshot size:    {}", format_size(meta.len()));
    }

    println!();
    println!("Indexes:");
    for stats in collect_stats(catalog) {
        println!(
            "  {:20} {:15} {:>8} docs {:>8} terms  (generation {})",
            stats.id, stats.kind, stats.objects, stats.terms, stats.generation
        );
    }

    for index in catalog.indexes() {
        match index {
            CatalogIndex::Interval(interval) => {
                println!();
                println!("{} buckets:", interval.id());
                for (bucket, count) in interval.bucket_sizes() {
                    println!("  {:15} {}", bucket, count);
                }
            }
            CatalogIndex::Composite(composite) => {
                println!();
                println!("{} components:", composite.id());
                for component in composite.components().iter() {
                    println!("  {}", component);
                }
                let histogram = composite.histogram();
                if !histogram.is_empty() {
                    println!("  keys by posting size:");
                    for (size, keys) in histogram.iter().take(10) {
                        println!("    {:>6} docs: {}", size, keys);
                    }
                    if histogram.len() > 10 {
                        println!("    ... and {} more", histogram.len() - 10);
                    }
                }
            }
            CatalogIndex::Attribute(_) => {}
        }
    }

    Ok(())
}

/// Format byte size to human readable
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{CatalogConfig, Document};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_collect_stats() {
        let config = CatalogConfig::from_json(
            r#"{"indexes": [{"id": "Subject", "kind": "keyword", "attributes": ["subject"]}]}"#,
        )
        .unwrap();
        let mut catalog = Catalog::from_config(&config).unwrap();
        catalog
            .catalog_object("/a", Document::new().with("subject", serde_json::json!(["x", "y"])))
            .unwrap();

        let stats = collect_stats(&catalog);
        assert_eq!(
            stats,
            vec![IndexStats {
                id: "Subject".into(),
                kind: "KeywordIndex",
                objects: 1,
                terms: 2,
                generation: 1,
            }]
        );
    }
}
