//! Live view rendering.
//!
//! Shows the latest snapshot as a table of sensors with tiers, gauges and
//! sparkline trends, under a one-line quick-stats bar.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table},
    Frame,
};

use crate::app::App;
use crate::data::classify::{air_quality_gauge, tank_gauge};
use crate::data::{AirQualityLabel, SensorSnapshot, Series};

/// Sparkline characters (8 levels of height).
const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Width of the text gauges in cells.
const GAUGE_WIDTH: usize = 10;

/// Render the Live view.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let Some(ref snapshot) = app.snapshot else {
        let block = Block::default()
            .title(" Live ")
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border));
        let paragraph = Paragraph::new(format!(
            " Waiting for the first reading ({})...",
            app.connection
        ))
        .style(Style::default().add_modifier(Modifier::DIM))
        .block(block);
        frame.render_widget(paragraph, area);
        return;
    };

    let [stats_area, table_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(area);

    render_quick_stats(frame, app, snapshot, stats_area);
    render_table(frame, app, snapshot, table_area);
}

fn render_quick_stats(frame: &mut Frame, app: &App, snapshot: &SensorSnapshot, area: Rect) {
    let air = AirQualityLabel::from_reading(snapshot.air_quality);
    let air_style = match air {
        AirQualityLabel::Good => Style::default().fg(app.theme.excellent),
        AirQualityLabel::Moderate => Style::default().fg(app.theme.moderate),
        AirQualityLabel::Poor => Style::default().fg(app.theme.critical),
    };

    let line = Line::from(vec![
        Span::raw(" Air: "),
        Span::styled(air.label(), air_style.add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            " │ {:.1}°C │ {:.0}% RH │ Tank {:.0}% │ ",
            snapshot.temperature_c, snapshot.humidity_pct, snapshot.tank_level_pct
        )),
        Span::raw(
            snapshot
                .timestamp
                .map(|t| format!("taken {}", t.format("%H:%M:%S")))
                .unwrap_or_default(),
        ),
    ]);

    let block = Block::default()
        .title(" Quick stats ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.border));

    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn render_table(frame: &mut Frame, app: &App, snapshot: &SensorSnapshot, area: Rect) {
    let header = Row::new(vec!["Sensor", "Reading", "Δ", "Status", "Gauge", "Trend"])
        .height(1)
        .style(app.theme.header);

    let rows: Vec<Row> = Series::ALL
        .iter()
        .map(|&series| {
            let value = series.value(snapshot);
            let tier = app.tiers.as_ref().and_then(|tiers| series.tier(tiers));

            let (status, status_style) = match tier {
                Some(tier) => (tier.label(), app.theme.tier_style(tier)),
                None => ("-", Style::default().add_modifier(Modifier::DIM)),
            };

            let gauge = match series {
                Series::AirQuality => gauge_bar(air_quality_gauge(value)),
                Series::TankLevel => gauge_bar(tank_gauge(value)),
                _ => String::new(),
            };

            Row::new(vec![
                Cell::from(series.label()),
                Cell::from(format!("{:.1} {}", value, series.unit())),
                Cell::from(format_delta(app.trend.delta(series))),
                Cell::from(status).style(status_style),
                Cell::from(gauge).style(status_style),
                Cell::from(render_sparkline(&app.trend.sparkline(series))),
            ])
        })
        .collect();

    let widths = [
        Constraint::Fill(3),
        Constraint::Fill(2),
        Constraint::Min(7),
        Constraint::Min(9),
        Constraint::Min(GAUGE_WIDTH as u16 + 5),
        Constraint::Min(8),
    ];

    let table = Table::new(rows, widths).header(header).block(
        Block::default()
            .title(format!(" Sensors ({} readings) ", app.received))
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border)),
    );

    frame.render_widget(table, area);
}

/// Draw a percentage as a fixed-width bar followed by the number.
fn gauge_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * GAUGE_WIDTH as f64).round() as usize;
    let filled = filled.min(GAUGE_WIDTH);
    format!(
        "{}{} {:>3.0}%",
        "█".repeat(filled),
        "░".repeat(GAUGE_WIDTH - filled),
        percent
    )
}

fn format_delta(delta: Option<f64>) -> String {
    match delta {
        Some(d) if d > 0.05 => format!("↑{:.1}", d),
        Some(d) if d < -0.05 => format!("↓{:.1}", d.abs()),
        Some(_) => "→".to_string(),
        None => "-".to_string(),
    }
}

fn render_sparkline(data: &[u8]) -> String {
    if data.is_empty() {
        return "        ".to_string();
    }

    // Take last 8 values
    let values: Vec<u8> = data.iter().rev().take(8).rev().copied().collect();

    values.iter().map(|&v| SPARKLINE_CHARS[v.min(7) as usize]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_bar() {
        assert_eq!(gauge_bar(0.0), "░░░░░░░░░░   0%");
        assert_eq!(gauge_bar(50.0), "█████░░░░░  50%");
        assert_eq!(gauge_bar(100.0), "██████████ 100%");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(None), "-");
        assert_eq!(format_delta(Some(0.0)), "→");
        assert_eq!(format_delta(Some(2.5)), "↑2.5");
        assert_eq!(format_delta(Some(-10.0)), "↓10.0");
    }

    #[test]
    fn test_sparkline_keeps_last_eight() {
        assert_eq!(render_sparkline(&[]), "        ");
        assert_eq!(render_sparkline(&[0, 7]), "▁█");
        assert_eq!(
            render_sparkline(&[7, 7, 0, 1, 2, 3, 4, 5, 6, 7]),
            "▁▂▃▄▅▆▇█"
        );
    }
}
