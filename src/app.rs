//! Application state and navigation logic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use crate::binder::{DisplaySurface, DisplayUpdate};
use crate::data::{format_uptime, HistoryView, Location, SensorSnapshot, SensorTiers, Trend};
use crate::feed::ConnectionState;
use crate::ui::Theme;

/// Default file written by the export key.
pub const DEFAULT_EXPORT_FILE: &str = "agrowatch_export.json";

/// The current view/tab in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Latest reading of every sensor with tiers, gauges and trends.
    Live,
    /// Recent records from the history providers, newest first.
    History,
}

impl View {
    /// Cycle to the next view.
    pub fn next(self) -> Self {
        match self {
            View::Live => View::History,
            View::History => View::Live,
        }
    }

    /// Cycle to the previous view.
    pub fn prev(self) -> Self {
        // Two views: previous and next coincide.
        self.next()
    }

    /// Returns the display label for this view.
    pub fn label(&self) -> &'static str {
        match self {
            View::Live => "Live",
            View::History => "History",
        }
    }
}

/// Main application state.
pub struct App {
    pub running: bool,
    pub current_view: View,
    pub show_help: bool,

    // Updates from the binder task
    updates: Option<mpsc::UnboundedReceiver<DisplayUpdate>>,
    refresh: Option<Arc<Notify>>,
    description: String,

    // Latest data
    pub snapshot: Option<SensorSnapshot>,
    pub tiers: Option<SensorTiers>,
    pub received: u64,
    pub last_update: Option<Instant>,
    pub last_update_time: Option<DateTime<Local>>,
    pub connection: ConnectionState,
    pub location: Option<Location>,
    pub location_resolved: bool,
    pub history: Option<HistoryView>,
    pub trend: Trend,

    // Navigation state
    pub history_scroll: usize,

    // UI
    pub theme: Theme,
    pub started: Instant,
    pub export_path: PathBuf,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// Create a new App for a feed with the given description.
    pub fn new(description: &str, theme: Theme) -> Self {
        Self {
            running: true,
            current_view: View::Live,
            show_help: false,
            updates: None,
            refresh: None,
            description: description.to_string(),
            snapshot: None,
            tiers: None,
            received: 0,
            last_update: None,
            last_update_time: None,
            connection: ConnectionState::Connecting,
            location: None,
            location_resolved: false,
            history: None,
            trend: Trend::new(),
            history_scroll: 0,
            theme,
            started: Instant::now(),
            export_path: PathBuf::from(DEFAULT_EXPORT_FILE),
            status_message: None,
        }
    }

    /// Receive display updates from a binder running elsewhere.
    pub fn with_updates(mut self, updates: mpsc::UnboundedReceiver<DisplayUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Handle used to request an immediate history pull.
    pub fn with_refresh(mut self, refresh: Arc<Notify>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Returns a description of the feed endpoint.
    pub fn source_description(&self) -> &str {
        &self.description
    }

    /// Apply every pending update. Returns true if anything changed.
    pub fn poll_updates(&mut self) -> bool {
        let Some(mut updates) = self.updates.take() else {
            return false;
        };
        let mut changed = false;
        while let Ok(update) = updates.try_recv() {
            update.apply_to(self);
            changed = true;
        }
        self.updates = Some(updates);
        changed
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired (3 seconds).
    pub fn get_status_message(&self) -> Option<&str> {
        if let Some((msg, time)) = &self.status_message {
            if time.elapsed() < Duration::from_secs(3) {
                return Some(msg);
            }
        }
        None
    }

    /// Location to show: the snapshot's own, else the resolved one.
    pub fn location_label(&self) -> String {
        if let Some(location) = self.snapshot.as_ref().and_then(|s| s.location.as_ref()) {
            return location.label();
        }
        match (&self.location, self.location_resolved) {
            (Some(location), _) => location.label(),
            (None, true) => "Location unavailable".to_string(),
            (None, false) => "Locating...".to_string(),
        }
    }

    pub fn uptime(&self) -> String {
        format_uptime(self.started.elapsed())
    }

    /// Switch to the next view.
    pub fn next_view(&mut self) {
        self.current_view = self.current_view.next();
    }

    /// Switch to the previous view.
    pub fn prev_view(&mut self) {
        self.current_view = self.current_view.prev();
    }

    /// Switch to a specific view.
    pub fn set_view(&mut self, view: View) {
        self.current_view = view;
    }

    fn history_len(&self) -> usize {
        self.history.as_ref().map_or(0, |h| h.records().len())
    }

    /// Scroll the history table down by n rows.
    pub fn scroll_down(&mut self, n: usize) {
        let max = self.history_len().saturating_sub(1);
        self.history_scroll = (self.history_scroll + n).min(max);
    }

    /// Scroll the history table up by n rows.
    pub fn scroll_up(&mut self, n: usize) {
        self.history_scroll = self.history_scroll.saturating_sub(n);
    }

    pub fn scroll_first(&mut self) {
        self.history_scroll = 0;
    }

    pub fn scroll_last(&mut self) {
        self.history_scroll = self.history_len().saturating_sub(1);
    }

    /// Ask the binder for an immediate history pull.
    pub fn request_refresh(&mut self) {
        match &self.refresh {
            Some(refresh) => {
                refresh.notify_one();
                self.set_status_message("Refreshing history...".to_string());
            }
            None => self.set_status_message("History refresh unavailable".to_string()),
        }
    }

    /// Toggle the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Signal the application to quit.
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Export current state to a file.
    pub fn export_state(&self, path: &Path) -> Result<()> {
        if self.snapshot.is_none() && self.history.is_none() {
            bail!("No data to export");
        }
        let export = export_json(
            self.snapshot.as_ref(),
            self.tiers.as_ref(),
            self.history.as_ref(),
        );
        write_export(path, &export)
    }
}

impl DisplaySurface for App {
    fn show_snapshot(&mut self, snapshot: &SensorSnapshot, tiers: &SensorTiers, received: u64) {
        self.trend.record(snapshot);
        self.snapshot = Some(snapshot.clone());
        self.tiers = Some(*tiers);
        self.received = received;
        self.last_update = Some(Instant::now());
        self.last_update_time = Some(Local::now());
    }

    fn show_history(&mut self, history: &HistoryView) {
        self.history = Some(history.clone());
        let max = self.history_len().saturating_sub(1);
        self.history_scroll = self.history_scroll.min(max);
    }

    fn show_connection_state(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    fn show_location(&mut self, location: Option<&Location>) {
        self.location = location.cloned();
        self.location_resolved = true;
    }
}

/// Build the export document.
pub fn export_json(
    snapshot: Option<&SensorSnapshot>,
    tiers: Option<&SensorTiers>,
    history: Option<&HistoryView>,
) -> serde_json::Value {
    json!({
        "exported_at": Utc::now().to_rfc3339(),
        "snapshot": snapshot.map(SensorSnapshot::to_wire),
        "tiers": tiers,
        "history": history,
    })
}

/// Write an export document as pretty JSON.
pub fn write_export(path: &Path, export: &serde_json::Value) -> Result<()> {
    let json = serde_json::to_string_pretty(export)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}
