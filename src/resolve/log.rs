//! Per-entry resolution log
//!
//! Advisory text written next to each entry's data artifact. Lines are
//! mirrored to `tracing` at debug level.

use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Diagnostic output for one resolution attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveLog {
    lines: Vec<LogLine>,
}

impl ResolveLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warn, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Error, message.into());
    }

    fn push(&mut self, level: LogLevel, message: String) {
        debug!("{}", message);
        self.lines.push(LogLine {
            at: Utc::now(),
            level,
            message,
        });
    }

    /// Append another log's lines after this one's
    pub fn extend(&mut self, other: &ResolveLog) {
        self.lines.extend(other.lines.iter().cloned());
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Render as `<rfc3339> <LEVEL> <message>` lines
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&format!(
                "{} {:<5} {}\n",
                line.at.to_rfc3339(),
                line.level,
                line.message
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_lines() {
        let mut log = ResolveLog::new();
        log.info("fetching");
        log.error("boom");

        let rendered = log.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO  fetching"));
        assert!(lines[1].contains("ERROR boom"));
    }

    #[test]
    fn extend_appends() {
        let mut a = ResolveLog::new();
        a.info("one");
        let mut b = ResolveLog::new();
        b.warn("two");
        a.extend(&b);
        assert_eq!(a.lines().len(), 2);
        assert_eq!(a.lines()[1].level, LogLevel::Warn);
    }
}
