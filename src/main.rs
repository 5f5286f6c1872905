use anyhow::{Context, Result, bail};
use catdex::index::composite::ComponentEdit;
use catdex::index::stats::show_stats;
use catdex::index::{CatalogConfig, ComponentConfig, Document, RequestCache};
use catdex::output::{print_components, print_results, print_summary};
use catdex::query::{Catalog, Query, SearchOptions};
use catdex::utils::AppConfig;
use catdex::utils::progress::document_bar;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "catdex")]
#[command(about = "Content catalog index engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Catalog snapshot to operate on (defaults to the app data directory)
    #[arg(short, long, global = true)]
    catalog: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty catalog from an index configuration file
    Init {
        /// JSON file with an `indexes` list
        config: PathBuf,

        /// Overwrite an existing snapshot
        #[arg(short, long)]
        force: bool,
    },
    /// Add or update documents from a JSON-lines file
    Catalog {
        /// One JSON object per line
        documents: PathBuf,

        /// Attribute holding each document's unique key
        #[arg(short, long, default_value = "path")]
        key: String,
    },
    /// Remove documents by key
    Uncatalog {
        keys: Vec<String>,
    },
    /// Search the catalog with a JSON query
    Search {
        /// e.g. '{"portal_type": "News", "effective": 28000000}'
        query: String,

        /// Evaluate every clause on its own index
        #[arg(long)]
        atomic: bool,

        /// Print each document's attributes
        #[arg(short, long)]
        documents: bool,
    },
    /// Show catalog statistics
    Stats,
    /// Manage the components of a composite index
    Component {
        #[command(subcommand)]
        action: ComponentAction,
    },
    /// Rebuild a composite index from its sibling indexes
    Rebuild {
        /// Composite index id
        index: String,

        /// Documents between checkpoints
        #[arg(short, long)]
        threshold: Option<usize>,
    },
    /// Clear one index, or all of them
    Clear {
        index: Option<String>,
    },
}

#[derive(Subcommand)]
enum ComponentAction {
    /// Add a component
    Add {
        /// Composite index id
        index: String,
        id: String,
        /// field, keyword or boolean
        kind: String,
        /// Source attributes (defaults to the component id)
        #[arg(short, long, value_delimiter = ',')]
        attributes: Vec<String>,
    },
    /// Delete a component
    Del {
        index: String,
        id: String,
    },
    /// Replace components from a JSON list of `{old_id, id, kind, attributes}`
    Save {
        index: String,
        edits: PathBuf,
    },
    /// List components
    List {
        index: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!("Using default configuration: {:#}", e);
        AppConfig::default()
    });
    let snapshot = config.resolve_snapshot_path(cli.catalog.as_deref())?;
    let color = !cli.no_color;

    match cli.command {
        Commands::Init { config: path, force } => {
            if snapshot.exists() && !force {
                bail!(
                    "Catalog already exists at {} (use --force to overwrite)",
                    snapshot.display()
                );
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let catalog_config = CatalogConfig::from_json(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            let catalog = Catalog::from_config(&catalog_config)?;
            catalog.save(&snapshot)?;
            println!(
                "Created catalog with {} indexes at {}",
                catalog.indexes().len(),
                snapshot.display()
            );
        }
        Commands::Catalog { documents, key } => {
            let mut catalog = Catalog::load(&snapshot)?;
            let count = catalog_documents(&mut catalog, &documents, &key)?;
            catalog.save(&snapshot)?;
            println!("Catalogued {} documents", count);
        }
        Commands::Uncatalog { keys } => {
            let mut catalog = Catalog::load(&snapshot)?;
            let removed = keys.iter().filter(|k| catalog.uncatalog_object(k)).count();
            catalog.save(&snapshot)?;
            println!("Removed {} of {} documents", removed, keys.len());
        }
        Commands::Search {
            query,
            atomic,
            documents,
        } => {
            let catalog = Catalog::load(&snapshot)?;
            let query = Query::from_json(&query).context("Query must be a JSON object")?;
            let options = SearchOptions {
                atomic,
                skip_composite: config.skip_composite,
                cache_capacity: config.cache_capacity,
            };
            let mut cache = RequestCache::with_capacity(options.cache_capacity);
            let results = catalog.search_cached(&query, &options, &mut cache)?;
            print_results(&catalog, &results, color, documents)?;
            print_summary(results.len(), &cache.stats(), color)?;
        }
        Commands::Stats => {
            let catalog = Catalog::load(&snapshot)?;
            show_stats(&catalog, &snapshot)?;
        }
        Commands::Component { action } => {
            handle_component_command(action, &snapshot, color)?;
        }
        Commands::Rebuild { index, threshold } => {
            let mut catalog = Catalog::load(&snapshot)?;
            let threshold = threshold.unwrap_or(config.fast_build_threshold);
            let bar = document_bar(catalog.len() as u64, "Rebuilding...", false);
            let processed = catalog.fast_build(&index, threshold, |done| {
                bar.set_position(done as u64);
            })?;
            bar.finish_with_message("Done");
            catalog.save(&snapshot)?;
            println!("Rebuilt {} from {} documents", index, processed);
        }
        Commands::Clear { index } => {
            let mut catalog = Catalog::load(&snapshot)?;
            catalog.clear_index(index.as_deref())?;
            catalog.save(&snapshot)?;
            match index {
                Some(id) => println!("Cleared {}", id),
                None => println!("Cleared all indexes"),
            }
        }
    }

    Ok(())
}

/// Catalog every line of a JSON-lines file; returns the number catalogued
fn catalog_documents(catalog: &mut Catalog, path: &Path, key_attr: &str) -> Result<usize> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .collect::<std::io::Result<_>>()
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let bar = document_bar(lines.len() as u64, "Cataloguing...", false);
    let mut count = 0;

    for (line_no, line) in lines.iter().enumerate() {
        bar.inc(1);
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid JSON", path.display(), line_no + 1))?;
        let Some(document) = Document::from_json(value) else {
            bail!("{}:{}: expected a JSON object", path.display(), line_no + 1);
        };
        let Some(key) = document.get(key_attr).and_then(|k| k.as_str()).map(str::to_string) else {
            warn!("{}:{}: no '{}' attribute, skipped", path.display(), line_no + 1, key_attr);
            continue;
        };

        catalog
            .catalog_object(&key, document)
            .with_context(|| format!("{}:{}: failed to catalog {}", path.display(), line_no + 1, key))?;
        count += 1;
    }

    bar.finish_with_message("Done");
    info!("catalogued {} documents from {}", count, path.display());
    Ok(count)
}

fn handle_component_command(action: ComponentAction, snapshot: &Path, color: bool) -> Result<()> {
    let mut catalog = Catalog::load(snapshot)?;

    match action {
        ComponentAction::Add {
            index,
            id,
            kind,
            attributes,
        } => {
            let component = ComponentConfig {
                id: id.clone(),
                kind,
                attributes,
            };
            catalog.composite_mut(&index)?.add_component(&component)?;
            println!("Added component {} to {} (index cleared, run rebuild)", id, index);
        }
        ComponentAction::Del { index, id } => {
            catalog.composite_mut(&index)?.del_component(&id)?;
            println!("Deleted component {} from {} (index cleared, run rebuild)", id, index);
        }
        ComponentAction::Save { index, edits } => {
            let content = fs::read_to_string(&edits)
                .with_context(|| format!("Failed to read {}", edits.display()))?;
            let edits: Vec<ComponentEdit> =
                serde_json::from_str(&content).context("Failed to parse component edits")?;
            catalog.composite_mut(&index)?.save_components(&edits)?;
            println!("Saved {} components of {} (index cleared, run rebuild)", edits.len(), index);
        }
        ComponentAction::List { index } => {
            print_components(catalog.composite(&index)?, color)?;
            return Ok(());
        }
    }

    catalog.save(snapshot)?;
    Ok(())
}
