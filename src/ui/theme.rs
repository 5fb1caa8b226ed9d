//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::data::Tier;
use crate::feed::ConnectionState;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Color for readings in the excellent tier.
    pub excellent: Color,
    /// Color for readings in the moderate tier.
    pub moderate: Color,
    /// Color for readings in the poor tier.
    pub poor: Color,
    /// Color for readings in the critical tier.
    pub critical: Color,
    /// Color for borders and separators.
    pub border: Color,
    /// Style for header rows in tables.
    pub header: Style,
    /// Style for selected/highlighted rows.
    pub selected: Style,
    /// Style for the active tab.
    pub tab_active: Style,
    /// Style for inactive tabs.
    pub tab_inactive: Style,
    /// Border style (rounded, plain, etc.).
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            excellent: Color::Green,
            moderate: Color::Yellow,
            poor: Color::LightRed,
            critical: Color::Red,
            border: Color::Gray,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::Gray),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            excellent: Color::Green,
            moderate: Color::Rgb(176, 128, 0),
            poor: Color::Magenta,
            critical: Color::Red,
            border: Color::DarkGray,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::LightBlue).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::DarkGray),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Get style for a reading tier
    pub fn tier_style(&self, tier: Tier) -> Style {
        match tier {
            Tier::Excellent => Style::default().fg(self.excellent),
            Tier::Moderate => Style::default().fg(self.moderate),
            Tier::Poor => Style::default().fg(self.poor),
            Tier::Critical => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
        }
    }

    /// Get style for the connection indicator
    pub fn connection_style(&self, state: ConnectionState) -> Style {
        match state {
            ConnectionState::Open => Style::default().fg(self.excellent),
            ConnectionState::Connecting => Style::default().fg(self.moderate),
            ConnectionState::Closed => Style::default().fg(self.critical),
            ConnectionState::Stopped => Style::default().add_modifier(Modifier::DIM),
        }
    }
}
