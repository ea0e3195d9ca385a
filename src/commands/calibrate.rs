//! Embedding maintenance commands

use anyhow::{Context, Result};
use colored::Colorize;
use neural_memory::search::calibration::{ConsistencyReport, ConsistencyStatus, CALIBRATION_PHRASES};
use neural_memory::{App, Config};

/// Run the consistency check. Exits 1 on drift.
pub fn check(config: Config, json: bool) -> Result<()> {
    let app = App::open(config)?;
    let report = app
        .monitor
        .check()
        .context("embedding consistency check failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &app);
    }

    if report.is_drift() {
        std::process::exit(1);
    }
    Ok(())
}

pub fn recalibrate(config: Config) -> Result<()> {
    let app = App::open(config)?;
    let baseline = app.monitor.recalibrate().context("recalibration failed")?;

    println!(
        "{} Baseline written to {} ({} phrases, model {})",
        "✓".green(),
        app.monitor.path().display(),
        baseline.phrases.len(),
        baseline.model.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// Recompute every stored embedding with the current model, then recalibrate
pub fn reembed(config: Config) -> Result<()> {
    let app = App::open(config)?;

    println!("{} Re-embedding notes with {}", "→".dimmed(), app.embedder.model_id().cyan());
    let count = app.store.reembed_all().context("re-embedding failed")?;
    app.monitor.recalibrate().context("recalibration failed")?;

    println!("{} Re-embedded {} notes, baseline refreshed", "✓".green(), count);
    Ok(())
}

fn print_report(report: &ConsistencyReport, app: &App) {
    println!("{}", "Embedding Consistency".bold());
    println!("{}", "=".repeat(50));
    println!("Model:     {}", app.embedder.model_id());
    println!("Baseline:  {}", app.monitor.path().display());
    println!();

    match report.status {
        ConsistencyStatus::Initialized => {
            println!("{} No baseline found; created a new one.", "✓".green());
            return;
        }
        ConsistencyStatus::Consistent => println!("{} Model is consistent", "✓".green()),
        ConsistencyStatus::DriftDetected => println!("{} Model drift detected", "✗".red().bold()),
    }
    println!();

    for (phrase, similarity) in CALIBRATION_PHRASES.iter().zip(&report.similarities) {
        let score = format!("{:.4}", similarity);
        let score = if *similarity >= report.threshold {
            score.green()
        } else {
            score.red()
        };
        println!("   {}  {}", score, phrase.dimmed());
    }

    if let (Some(min), Some(mean)) = (report.min_similarity, report.mean_similarity) {
        println!();
        println!("   min {:.4}  mean {:.4}  threshold {}", min, mean, report.threshold);
    }

    if report.is_drift() {
        println!();
        println!(
            "{}",
            "Search results may be inaccurate. Run `neural-memory reembed` to fix.".yellow()
        );
    }
}
