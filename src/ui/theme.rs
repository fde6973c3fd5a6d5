//! Colors and status tags shared by every output path

use crate::manifest::ManifestEntry;
use crate::resolve::Source;
use cliclack::ThemeState;
use console::{Style, StyledObject};

/// How a line reads: the result of a step or the state of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Ok,
    Info,
    Warn,
    Fail,
}

impl Tone {
    pub fn style(self) -> Style {
        match self {
            Self::Ok => Style::new().green(),
            Self::Info => Style::new().blue(),
            Self::Warn => Style::new().yellow(),
            Self::Fail => Style::new().red(),
        }
    }

    /// Bracketed prefix for plain output
    pub fn tag(self) -> StyledObject<&'static str> {
        let label = match self {
            Self::Ok => "[OK]",
            Self::Info => "[INFO]",
            Self::Warn => "[WARN]",
            Self::Fail => "[FAIL]",
        };
        self.style().apply_to(label)
    }

    pub fn of_source(source: Source) -> Self {
        match source {
            Source::Failed => Self::Fail,
            Source::Upstream | Source::Cache | Source::Shared => Self::Ok,
        }
    }

    /// Stale entries warn, absent ones fail
    pub fn of_entry(entry: &ManifestEntry) -> Self {
        if entry.is_absent() {
            Self::Fail
        } else if entry.is_stale() {
            Self::Warn
        } else {
            Self::Ok
        }
    }

    /// `Ok` for a zero count, `nonzero` otherwise
    pub fn for_count(count: usize, nonzero: Tone) -> Self {
        if count == 0 {
            Self::Ok
        } else {
            nonzero
        }
    }
}

/// cliclack frame in the info color, outcome colors on completion
#[derive(Debug, Clone, Default)]
pub struct ApidexTheme;

impl cliclack::Theme for ApidexTheme {
    fn bar_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Tone::Info.style(),
            ThemeState::Error(_) => Tone::Fail.style(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Tone::Info.style().dim(),
        }
    }

    fn state_symbol_color(&self, state: &ThemeState) -> Style {
        match state {
            ThemeState::Active => Tone::Info.style(),
            ThemeState::Error(_) => Tone::Fail.style(),
            ThemeState::Cancel => Style::new().dim(),
            ThemeState::Submit => Tone::Ok.style(),
        }
    }
}

pub fn init_theme() {
    cliclack::set_theme(ApidexTheme);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tests::{failed, ok};
    use crate::manifest::Manifest;
    use crate::registry::{Entry, EntryKind};

    #[test]
    fn entry_tones() {
        let six = Entry::new(EntryKind::Package, "six");
        let redis = Entry::new(EntryKind::Image, "redis");
        let first = Manifest::build(None, &[ok(&six, &["1.0"], Source::Upstream)]);
        let second = Manifest::build(
            Some(&first),
            &[failed(&six, "timeout"), failed(&redis, "404")],
        );

        assert_eq!(Tone::of_entry(&first.entries[0]), Tone::Ok);
        assert_eq!(Tone::of_entry(&second.entries[0]), Tone::Warn);
        assert_eq!(Tone::of_entry(&second.entries[1]), Tone::Fail);
    }

    #[test]
    fn source_and_count_tones() {
        assert_eq!(Tone::of_source(Source::Shared), Tone::Ok);
        assert_eq!(Tone::of_source(Source::Failed), Tone::Fail);
        assert_eq!(Tone::for_count(0, Tone::Warn), Tone::Ok);
        assert_eq!(Tone::for_count(3, Tone::Warn), Tone::Warn);
    }
}
