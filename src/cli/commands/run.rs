//! Run command - resolve every entry and publish the index

use crate::cli::args::RunArgs;
use crate::config::Config;
use crate::error::IndexResult;
use crate::indexer::Indexer;
use crate::invalidate::InvalidationPlan;
use crate::registry::SourceRegistry;
use crate::ui::{self, RunProgress, Tone, UiContext};

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config) -> IndexResult<()> {
    let ctx = UiContext::detect();

    let mut config = config.clone();
    if let Some(concurrency) = args.concurrency {
        config.run.concurrency = concurrency;
    }
    let total = SourceRegistry::load(&config)?.len();

    let mut plan = InvalidationPlan::new().full(args.force);
    for tag in args.force_tags {
        plan = plan.subset(tag);
    }

    ui::intro(&ctx, "apidex run");
    if !plan.is_empty() {
        let requested: Vec<String> = plan.ordered().iter().map(|r| r.to_string()).collect();
        ui::step(&ctx, Tone::Info, &format!("Invalidating: {}", requested.join(", ")));
    }

    let indexer = Indexer::from_config(config);
    let progress = RunProgress::new(&ctx, total);
    let result = indexer
        .run_with_progress(&plan, |outcome| progress.on_outcome(outcome))
        .await;
    progress.finish();
    let report = result?;

    if report.invalidation.cache_entries > 0 || report.invalidation.records > 0 {
        ui::remark(
            &ctx,
            &format!(
                "Purged {} cache entries and {} manifest records",
                report.invalidation.cache_entries, report.invalidation.records
            ),
        );
    }

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| !o.resolution.record.is_ok())
        .collect();
    if !failures.is_empty() {
        ui::section(&ctx, "Failures");
        for outcome in &failures {
            ui::step_detail(
                &ctx,
                Tone::Fail,
                &outcome.entry.id.to_string(),
                outcome.resolution.record.failure().unwrap_or("unknown error"),
            );
        }
    }

    let h = &report.header;
    ui::section(&ctx, "Summary");
    ui::build_summary(&ctx, h);
    ui::key_value(&ctx, "Site", &report.site.display().to_string());

    if h.failed == 0 {
        ui::outro(&ctx, Tone::Ok, "Index published");
    } else {
        ui::outro(
            &ctx,
            Tone::Warn,
            &format!("Index published with {} failed entries", h.failed),
        );
    }
    Ok(())
}
