use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString};

/// TUI-specific events (keyboard, resize, animation ticks)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw for the loading indicators
    Tick,
}

/// Which of the two front ends is rendered
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, EnumIter, AsRefStr,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Layout {
    /// Latest answer plus a separate history panel
    Single,
    /// Chat-style scrolling transcript of every exchange
    #[default]
    Transcript,
}

impl Layout {
    pub fn display_name(&self) -> &'static str {
        match self {
            Layout::Single => "Single response",
            Layout::Transcript => "Transcript",
        }
    }

    /// History page size each front end asks for
    pub fn default_page_size(&self) -> u32 {
        match self {
            Layout::Single => 10,
            Layout::Transcript => 100,
        }
    }
}

/// Panel shown in the single-response layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Ask,
    History,
}

impl ViewMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            ViewMode::Ask => "Ask Question",
            ViewMode::History => "History",
        }
    }

    pub fn toggled(&self) -> ViewMode {
        match self {
            ViewMode::Ask => ViewMode::History,
            ViewMode::History => ViewMode::Ask,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn layout_parses_case_insensitively() {
        assert_eq!(Layout::from_str("single").unwrap(), Layout::Single);
        assert_eq!(Layout::from_str("Transcript").unwrap(), Layout::Transcript);
        assert!(Layout::from_str("grid").is_err());
        assert_eq!(Layout::Single.as_ref(), "single");
    }

    #[test]
    fn view_mode_toggles_back_and_forth() {
        assert_eq!(ViewMode::Ask.toggled(), ViewMode::History);
        assert_eq!(ViewMode::Ask.toggled().toggled(), ViewMode::Ask);
    }
}
