//! Local note commands - stats, list, add, delete

use anyhow::Result;
use colored::*;

use super::fit_width;
use neural_memory::core::note::preview;
use neural_memory::{App, Config};

const LIST_PREVIEW_WIDTH: usize = 60;

pub fn stats(config: Config, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let stats = app.store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Neural Memory Statistics".bold());
    println!("{}", "=".repeat(50));
    println!();
    println!("   {:<16} {:>6}", "Total notes", stats.total);
    println!();

    println!("{}", "By category".cyan());
    println!("{}", "-".repeat(30));
    for (category, count) in &stats.by_category {
        let pct = if stats.total > 0 {
            (*count as f64 / stats.total as f64) * 100.0
        } else {
            0.0
        };
        println!("   {:<16} {:>6} ({:.0}%)", category, count, pct);
    }

    if stats.without_embedding > 0 {
        println!();
        println!(
            "{} {} notes are not searchable; run `neural-memory reembed`",
            "⚠".yellow(),
            stats.without_embedding
        );
    }
    Ok(())
}

pub fn list(config: Config, limit: Option<usize>, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let mut notes = app.store.list_all()?;
    if let Some(limit) = limit {
        notes.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("{} No notes stored", "→".dimmed());
        return Ok(());
    }

    for note in &notes {
        let marker = if note.has_embedding() {
            " ".normal()
        } else {
            "!".yellow()
        };
        println!(
            "{}{:>5}  {:<12} {}  {}",
            marker,
            note.id.to_string().bold(),
            note.category.cyan(),
            note.created_at.format("%Y-%m-%d").to_string().dimmed(),
            fit_width(&note.content, LIST_PREVIEW_WIDTH)
        );
    }
    Ok(())
}

pub fn add(config: Config, content: &str, category: Option<&str>) -> Result<()> {
    let app = App::open(config)?;
    let id = app.store.create(content, category)?;
    let note = app.store.get(id)?;

    println!("{} Added note #{} [{}]", "✓".green(), note.id, note.category.cyan());
    Ok(())
}

pub fn delete(config: Config, id: i64) -> Result<()> {
    let app = App::open(config)?;
    let removed = app.store.delete(id)?;

    println!(
        "{} Deleted note #{} [{}] {}",
        "✓".green(),
        removed.id,
        removed.category.cyan(),
        preview(&removed.content, 100).dimmed()
    );
    Ok(())
}
