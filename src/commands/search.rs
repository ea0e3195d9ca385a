//! Search command - semantic search from the terminal

use anyhow::Result;
use colored::Colorize;

use neural_memory::{App, Config};

pub fn run(config: Config, query: &str, limit: i64, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let outcome = app.engine().search(query, limit)?;

    if json {
        let results: Vec<_> = outcome
            .results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.note_id,
                    "category": r.category,
                    "similarity": r.similarity,
                    "content": r.content,
                })
            })
            .collect();
        let payload = serde_json::json!({
            "total_matches": outcome.total_matches,
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    if outcome.results.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return Ok(());
    }

    println!(
        "{} {} of {} matches for: {}",
        "→".dimmed(),
        outcome.results.len(),
        outcome.total_matches,
        query.cyan()
    );
    println!();

    for (i, result) in outcome.results.iter().enumerate() {
        let score_str = format!("{:.4}", result.similarity);
        let score_colored = if result.similarity > 0.8 {
            score_str.green()
        } else if result.similarity > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] #{} {}",
            (i + 1).to_string().bold(),
            score_colored,
            result.note_id,
            result.category.cyan()
        );
        println!("   {}", result.content);
        println!();
    }

    Ok(())
}
