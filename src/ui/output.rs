//! Line output with cliclack framing on terminals

use super::context::UiContext;
use super::theme::Tone;
use crate::manifest::BuildHeader;
use console::style;

/// Command banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(Tone::Info.style().bold().apply_to(title)).ok();
    } else {
        println!("{}", Tone::Info.style().bold().apply_to(title));
    }
}

/// Closing line of a command
pub fn outro(ctx: &UiContext, tone: Tone, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(tone.style().bold().apply_to(message)).ok();
    } else {
        println!("{} {}", tone.tag(), message);
    }
}

pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

pub fn step(ctx: &UiContext, tone: Tone, message: &str) {
    if !ctx.use_fancy_output() {
        println!("  {} {}", tone.tag(), message);
        return;
    }
    let written = match tone {
        Tone::Ok => cliclack::log::success(message),
        Tone::Info => cliclack::log::info(message),
        Tone::Warn => cliclack::log::warning(message),
        Tone::Fail => cliclack::log::error(message),
    };
    written.ok();
}

/// A step with a dimmed detail after it
pub fn step_detail(ctx: &UiContext, tone: Tone, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        step(ctx, tone, &format!("{} ({})", message, style(detail).dim()));
    } else {
        println!("  {} {} ({})", tone.tag(), message, detail);
    }
}

/// Dimmed follow-up text
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// A counter colored by `tone`
pub fn tally(ctx: &UiContext, label: &str, count: usize, tone: Tone) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(label).dim(), tone.style().apply_to(count));
    } else {
        println!("  {} {}: {}", tone.tag(), label, count);
    }
}

/// Counters of a build header, as shown after a run and by `status`
pub fn build_summary(ctx: &UiContext, header: &BuildHeader) {
    key_value(ctx, "Entries", &header.total.to_string());
    tally(ctx, "Resolved", header.ok, Tone::Ok);
    tally(ctx, "From cache", header.skipped, Tone::Info);
    tally(ctx, "Failed", header.failed, Tone::for_count(header.failed, Tone::Fail));
    if header.stale > 0 {
        tally(ctx, "Kept previous", header.stale, Tone::Warn);
    }
}
