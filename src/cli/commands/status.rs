//! Status command - show index, cache and journal state

use crate::cli::args::{OutputFormat, StatusArgs};
use crate::config::Config;
use crate::error::IndexResult;
use crate::indexer::{Indexer, Status};
use crate::journal::JournalEvent;
use crate::ui::{self, Tone, UiContext};
use serde::Serialize;

/// Execute the status command
pub async fn execute(args: StatusArgs, config: &Config) -> IndexResult<()> {
    let status = Indexer::from_config(config.clone()).status().await?;

    match args.format {
        OutputFormat::Table => print_table(&status),
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Plain => print_plain(&status),
    }
    Ok(())
}

fn print_table(status: &Status) {
    let ctx = UiContext::detect();
    ui::intro(&ctx, "apidex status");

    ui::section(&ctx, "Paths");
    ui::key_value(&ctx, "Cache", &status.paths.cache_dir.display().to_string());
    ui::key_value(&ctx, "Output", &status.paths.dist_dir.display().to_string());

    ui::section(&ctx, "Registry");
    ui::key_value(&ctx, "Entries", &status.registry_entries.to_string());
    ui::key_value(&ctx, "Cached records", &status.cache_entries.to_string());

    ui::section(&ctx, "Index");
    match &status.manifest {
        Some(manifest) => {
            let h = &manifest.header;
            ui::key_value(
                &ctx,
                "Generated",
                &h.generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            );
            ui::key_value(&ctx, "Indexer", &h.indexer_version);
            ui::build_summary(&ctx, h);
        }
        None => ui::step(&ctx, Tone::Info, "Nothing published yet. Run: apidex run"),
    }

    if !status.recent.is_empty() {
        ui::section(&ctx, "Recent activity");
        for line in &status.recent {
            ui::remark(
                &ctx,
                &format!(
                    "{}  {}",
                    line.timestamp.format("%Y-%m-%d %H:%M"),
                    describe(&line.event)
                ),
            );
        }
    }
}

fn describe(event: &JournalEvent) -> String {
    match event {
        JournalEvent::RunStarted { entries, .. } => format!("run started ({} entries)", entries),
        JournalEvent::RunCommitted { header, .. } => format!(
            "run committed ({} ok, {} failed)",
            header.ok, header.failed
        ),
        JournalEvent::RunFailed { error, .. } => format!("run failed: {}", error),
        JournalEvent::InvalidateFull { removed_manifest } => {
            if *removed_manifest {
                "manifest discarded".to_string()
            } else {
                "full invalidation (nothing to discard)".to_string()
            }
        }
        JournalEvent::InvalidateSubset {
            tag,
            cache_entries,
            records,
        } => format!(
            "tag {} invalidated ({} cache entries, {} records)",
            tag, cache_entries, records
        ),
    }
}

fn print_json(status: &Status) -> IndexResult<()> {
    #[derive(Serialize)]
    struct StatusJson<'a> {
        cache_dir: String,
        dist_dir: String,
        registry_entries: usize,
        cache_entries: usize,
        header: Option<&'a crate::manifest::BuildHeader>,
        recent: &'a [crate::journal::JournalLine],
    }

    let json = StatusJson {
        cache_dir: status.paths.cache_dir.display().to_string(),
        dist_dir: status.paths.dist_dir.display().to_string(),
        registry_entries: status.registry_entries,
        cache_entries: status.cache_entries,
        header: status.manifest.as_ref().map(|m| &m.header),
        recent: &status.recent,
    };
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn print_plain(status: &Status) {
    println!("entries {}", status.registry_entries);
    println!("cached {}", status.cache_entries);
    if let Some(manifest) = &status.manifest {
        let h = &manifest.header;
        println!("ok {}", h.ok);
        println!("failed {}", h.failed);
        println!("stale {}", h.stale);
    }
}
