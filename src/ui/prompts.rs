//! Confirmation prompt with non-interactive fallback

use super::context::UiContext;
use crate::error::{IndexError, IndexResult};

/// Ask a yes/no question.
///
/// Auto-yes answers yes; a non-interactive context answers `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> IndexResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| IndexError::Internal(format!("prompt task failed: {}", e)))?
    .map_err(|e| IndexError::io("reading confirmation", e))
}
