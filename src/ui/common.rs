//! Common UI components shared across views.
//!
//! This module contains the header bar, tab bar, status bar, and help overlay.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs},
    Frame,
};

use crate::app::{App, View};

/// Render the header bar.
///
/// Displays: connection indicator, location, readings received, uptime and
/// the time of the last reading.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled(" ● ", app.theme.connection_style(app.connection)),
        Span::styled("AGROWATCH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("│ "),
        Span::styled(app.connection.label(), app.theme.connection_style(app.connection)),
        Span::raw(" │ "),
        Span::raw(app.location_label()),
        Span::raw(" │ "),
        Span::styled(
            app.received.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" readings │ up "),
        Span::raw(app.uptime()),
    ];

    if let Some(at) = app.last_update_time {
        spans.push(Span::raw(format!(" │ last {}", at.format("%H:%M:%S"))));
    }

    // The tier summary only makes sense once something arrived.
    if let Some(tiers) = app.tiers {
        let worst = tiers.worst();
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(worst.label(), app.theme.tier_style(worst)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Render the tab bar showing available views.
pub fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = vec![Line::from(" 1:Live "), Line::from(" 2:History ")];

    let selected = match app.current_view {
        View::Live => 0,
        View::History => 1,
    };

    let tabs = Tabs::new(titles)
        .select(selected)
        .style(app.theme.tab_inactive)
        .highlight_style(app.theme.tab_active)
        .divider("|");

    frame.render_widget(tabs, area);
}

/// Render the status bar at the bottom.
///
/// Shows the feed endpoint, time since the last reading and the controls.
/// Temporary status messages take precedence.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let controls = match app.current_view {
        View::Live => "Tab:switch r:refresh e:export ?:help q:quit",
        View::History => "↑↓:scroll Tab:switch r:refresh e:export ?:help q:quit",
    };

    let status = match app.last_update {
        Some(at) => format!(
            " {} | Updated {:.1}s ago | {}",
            app.source_description(),
            at.elapsed().as_secs_f64(),
            controls
        ),
        None => format!(" {} | Waiting for data... | {}", app.source_description(), controls),
    };

    let paragraph = Paragraph::new(status).style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the current view.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let section = |title: &'static str| {
        Line::from(vec![Span::styled(
            title,
            Style::default().add_modifier(Modifier::BOLD),
        )])
    };

    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        section(" Navigation"),
        Line::from("  Tab/S-Tab   Switch views"),
        Line::from("  1/2         Live / History"),
        Line::from("  ↑/↓ j/k     Scroll history"),
        Line::from("  PgUp/PgDn   Jump 10 rows"),
        Line::from("  Home/End    Jump to first/last"),
        Line::from(""),
        section(" General"),
        Line::from("  r         Refresh history now"),
        Line::from("  e         Export to JSON"),
        Line::from("  ?         Toggle help"),
        Line::from("  q         Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    let help_width = 42u16.min(area.width.saturating_sub(4));
    let help_height = 19u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
