//! List command - show entries of the published index

use crate::cli::args::{ListArgs, OutputFormat};
use crate::config::Config;
use crate::error::IndexResult;
use crate::indexer::Indexer;
use crate::manifest::ManifestEntry;
use crate::ui::{self, Tone, UiContext};
use console::style;

/// Execute the list command
pub async fn execute(args: ListArgs, config: &Config) -> IndexResult<()> {
    let manifest = Indexer::from_config(config.clone()).manifest().await?;
    let entries: Vec<&ManifestEntry> = manifest
        .as_ref()
        .map(|m| m.entries.iter().collect())
        .unwrap_or_default();

    let filtered: Vec<&ManifestEntry> = entries
        .into_iter()
        .filter(|e| args.tag.as_ref().map_or(true, |t| e.tags.contains(t)))
        .filter(|e| !args.failed || e.failure.is_some())
        .collect();

    if filtered.is_empty() {
        match args.format {
            OutputFormat::Json => println!("[]"),
            OutputFormat::Plain => {}
            OutputFormat::Table => {
                let ctx = UiContext::detect();
                ui::step(&ctx, Tone::Info, "No matching entries");
            }
        }
        return Ok(());
    }

    match args.format {
        OutputFormat::Table => print_table(&filtered),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&filtered)?),
        OutputFormat::Plain => {
            for entry in &filtered {
                println!("{}", entry.id);
            }
        }
    }
    Ok(())
}

fn print_table(entries: &[&ManifestEntry]) {
    println!(
        "{:<36} {:<12} {:<16} {:<9} {:<8}",
        style("ENTRY").bold(),
        style("TAGS").bold(),
        style("LATEST").bold(),
        style("RELEASES").bold(),
        style("STATE").bold()
    );
    println!("{}", "-".repeat(85));

    for entry in entries {
        let document = entry.record.as_ref().and_then(|r| r.document());
        let latest = document
            .and_then(|d| d.latest.clone())
            .unwrap_or_else(|| "-".to_string());
        let releases = document.map_or(0, |d| d.releases.len());
        let tone = Tone::of_entry(entry);
        let state = tone.style().apply_to(match tone {
            Tone::Warn => "stale",
            Tone::Fail => "absent",
            Tone::Ok | Tone::Info => "ok",
        });

        println!(
            "{:<36} {:<12} {:<16} {:<9} {:<8}",
            entry.id.to_string(),
            entry.tags.join(","),
            latest,
            releases,
            state
        );
    }

    println!();
    println!("Total: {} entries", entries.len());
}
