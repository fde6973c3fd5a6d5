//! Invalidate command - force reprocessing on the next run

use crate::cli::args::InvalidateArgs;
use crate::config::Config;
use crate::error::IndexResult;
use crate::indexer::Indexer;
use crate::invalidate::InvalidationPlan;
use crate::ui::{self, TaskSpinner, Tone, UiContext};

/// Execute the invalidate command
pub async fn execute(args: InvalidateArgs, config: &Config) -> IndexResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let indexer = Indexer::from_config(config.clone());

    let tagged = !args.tags.is_empty();
    let mut plan = InvalidationPlan::new().full(args.all);
    for tag in args.tags {
        plan = plan.subset(tag);
    }

    ui::intro(&ctx, "apidex invalidate");

    if !plan.is_empty() {
        let report = indexer.invalidate(&plan).await?;
        if args.all {
            if report.manifest_removed {
                ui::step(&ctx, Tone::Ok, "Manifest discarded; next run rebuilds from cache");
            } else {
                ui::step(&ctx, Tone::Info, "No manifest to discard");
            }
        }
        if tagged {
            ui::step_detail(
                &ctx,
                Tone::Ok,
                "Tagged entries invalidated",
                &format!(
                    "{} cache entries, {} manifest records",
                    report.cache_entries, report.records
                ),
            );
        }
    }

    if args.cache {
        let confirmed = ui::confirm(
            &ctx,
            "Drop the whole content cache? Every entry will be refetched.",
            false,
        )
        .await?;
        if !confirmed {
            ui::outro(&ctx, Tone::Warn, "Cache kept (pass --yes to skip this prompt)");
            return Ok(());
        }

        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Purging content cache...");
        match indexer.purge_cache().await {
            Ok(removed) => spinner.stop(&format!("Removed {} cache entries", removed)),
            Err(e) => {
                spinner.stop_error("Failed to purge cache");
                return Err(e);
            }
        }
    }

    ui::outro(&ctx, Tone::Ok, "Done");
    Ok(())
}
