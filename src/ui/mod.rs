//! Terminal output
//!
//! Uses `cliclack` and `indicatif` on interactive terminals and falls back
//! to plain prefixed lines in CI and when piped.

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    build_summary, intro, key_value, outro, remark, section, step, step_detail, tally,
};
pub use progress::{RunProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, ApidexTheme, Tone};
