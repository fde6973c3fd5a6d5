//! Progress display with CI fallback

use super::context::UiContext;
use super::theme::Tone;
use crate::scheduler::Outcome;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Spinner for short single steps
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", Tone::Ok.tag(), message);
        }
    }

    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", Tone::Fail.tag(), message);
        }
    }
}

/// Per-entry progress for a run.
///
/// An indicatif bar on terminals; one line per finished entry otherwise.
pub struct RunProgress {
    bar: Option<ProgressBar>,
}

impl RunProgress {
    pub fn new(ctx: &UiContext, total: usize) -> Self {
        let bar = ctx.use_fancy_output().then(|| {
            let bar = ProgressBar::new(total as u64);
            if let Ok(template) = ProgressStyle::default_bar().template(
                "  {spinner:.blue} Resolving  {bar:24.blue/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}",
            ) {
                bar.set_style(
                    template
                        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                        .progress_chars("━╸─"),
                );
            }
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            bar
        });
        Self { bar }
    }

    pub fn on_outcome(&self, outcome: &Outcome) {
        let id = outcome.entry.id.to_string();
        let resolution = &outcome.resolution;
        match &self.bar {
            Some(bar) => {
                bar.inc(1);
                bar.set_message(id);
            }
            None => {
                let tone = Tone::of_source(resolution.source);
                match resolution.record.failure() {
                    Some(reason) => println!("  {} {}: {}", tone.tag(), id, reason),
                    None => println!("  {} {} ({})", tone.tag(), id, resolution.source),
                }
            }
        }
    }

    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::{failed, ok};
    use crate::registry::{Entry, EntryKind};
    use crate::resolve::Source;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Purging cache...");
        spinner.stop("Done");
    }

    #[test]
    fn run_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let progress = RunProgress::new(&ctx, 2);
        progress.on_outcome(&ok(
            &Entry::new(EntryKind::Package, "six"),
            &["1.16.0"],
            Source::Cache,
        ));
        progress.on_outcome(&failed(&Entry::new(EntryKind::Image, "redis"), "404"));
        progress.finish();
        assert!(progress.bar.is_none());
    }
}
