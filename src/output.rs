//! Colored terminal output for search results and catalog listings

use crate::index::cache::CacheStats;
use crate::index::composite::CompositeIndex;
use crate::index::postings::PostingSet;
use crate::query::catalog::Catalog;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print matching documents as `id:key`, optionally with their attributes
pub fn print_results(
    catalog: &Catalog,
    results: &PostingSet,
    color: bool,
    show_documents: bool,
) -> io::Result<()> {
    let mut stdout = stdout(color);

    for doc_id in results.iter() {
        let Some(record) = catalog.record(doc_id) else {
            continue;
        };

        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{}", doc_id)?;
        stdout.reset()?;
        write!(stdout, ":")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
        writeln!(stdout, "{}", record.key)?;
        stdout.reset()?;

        if show_documents {
            for (name, value) in record.document.attributes() {
                stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
                write!(stdout, "    {}", name)?;
                stdout.reset()?;
                writeln!(stdout, " = {}", value)?;
            }
        }
    }

    Ok(())
}

/// Print the match count and request cache counters
pub fn print_summary(count: u64, stats: &CacheStats, color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);

    stdout.set_color(ColorSpec::new().set_bold(true))?;
    write!(stdout, "{} documents", count)?;
    stdout.reset()?;
    writeln!(
        stdout,
        " (cache hits: {}, misses: {}, sets: {})",
        stats.hits, stats.misses, stats.sets
    )?;

    Ok(())
}

/// Print the component registry of a composite index
pub fn print_components(composite: &CompositeIndex, color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);

    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    writeln!(stdout, "{}", composite.id())?;
    stdout.reset()?;

    if composite.components().is_empty() {
        writeln!(stdout, "  (no components)")?;
        return Ok(());
    }

    for component in composite.components().iter() {
        write!(stdout, "  ")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(stdout, "{:20}", component.id())?;
        stdout.reset()?;
        write!(stdout, " {:14}", component.kind().name())?;
        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        writeln!(stdout, " {}", component.attributes().join(","))?;
        stdout.reset()?;
    }

    Ok(())
}
