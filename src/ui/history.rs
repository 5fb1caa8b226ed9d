//! History view rendering.
//!
//! Recent records from the history providers, newest first, with the
//! provenance badge as the table title.

use chrono::{DateTime, NaiveDateTime};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame,
};

use crate::app::App;
use crate::data::HistoryView;

/// Render the History view.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let block = |title: String| {
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border))
    };

    let set = match &app.history {
        None => {
            let paragraph = Paragraph::new(" Loading history...")
                .style(Style::default().add_modifier(Modifier::DIM))
                .block(block(" History ".to_string()));
            frame.render_widget(paragraph, area);
            return;
        }
        Some(view @ HistoryView::NoData) => {
            let paragraph = Paragraph::new(format!(" {}", view.badge()))
                .style(Style::default().add_modifier(Modifier::DIM))
                .block(block(" History ".to_string()));
            frame.render_widget(paragraph, area);
            return;
        }
        Some(view @ HistoryView::Unavailable { reason }) => {
            let paragraph = Paragraph::new(format!(" {}", reason))
                .style(Style::default().fg(app.theme.critical))
                .block(block(format!(" History | {} ", view.badge())));
            frame.render_widget(paragraph, area);
            return;
        }
        Some(HistoryView::Loaded(set)) => set,
    };

    let header = Row::new(vec![
        "Time", "MQ-135", "Temp °C", "RH %", "PM2.5", "PM10", "Tank %", "TDS",
    ])
    .height(1)
    .style(app.theme.header);

    let rows: Vec<Row> = set
        .records
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(
                    r.timestamp
                        .as_deref()
                        .map(format_timestamp)
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::from(format!("{:.0}", r.mq135)),
                Cell::from(format!("{:.1}", r.temperature)),
                Cell::from(format!("{:.0}", r.humidity)),
                Cell::from(format!("{:.0}", r.pm25)),
                Cell::from(format!("{:.0}", r.pm10)),
                Cell::from(format!("{:.0}", r.fc28)),
                Cell::from(format!("{:.0}", r.tds)),
            ])
        })
        .collect();

    let widths = [
        Constraint::Min(19),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
        Constraint::Fill(1),
    ];

    let selected = app.history_scroll.min(set.len().saturating_sub(1));
    let position = if set.is_empty() {
        String::new()
    } else {
        format!(" [{}/{}]", selected + 1, set.len())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(block(format!(" History | {}{} ", set.provenance.badge(), position)))
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    state.select(Some(selected));

    frame.render_stateful_widget(table, area, &mut state);
}

/// Show a record timestamp as local-style date and time.
///
/// Accepts RFC 3339 and naive ISO timestamps; anything else is shown as is.
fn format_timestamp(raw: &str) -> String {
    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return t.format(FORMAT).to_string();
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return t.format(FORMAT).to_string();
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return t.format(FORMAT).to_string();
    }
    raw.to_string()
}
