//! Headless display: every update becomes a log line.

use std::time::Instant;

use tracing::{info, warn};

use crate::binder::DisplaySurface;
use crate::data::{
    format_uptime, AirQualityLabel, HistoryView, Location, SensorSnapshot, SensorTiers, Tier,
};
use crate::feed::ConnectionState;

/// A display surface that reports through `tracing`.
#[derive(Debug)]
pub struct LogSurface {
    started: Instant,
    last_tiers: Option<SensorTiers>,
}

impl LogSurface {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            last_tiers: None,
        }
    }
}

impl Default for LogSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySurface for LogSurface {
    fn show_snapshot(&mut self, snapshot: &SensorSnapshot, tiers: &SensorTiers, received: u64) {
        let uptime = format_uptime(self.started.elapsed());
        info!(
            received,
            uptime = %uptime,
            air_quality = snapshot.air_quality,
            air = AirQualityLabel::from_reading(snapshot.air_quality).label(),
            temperature_c = snapshot.temperature_c,
            humidity_pct = snapshot.humidity_pct,
            pm25 = snapshot.particulate.pm25,
            pm10 = snapshot.particulate.pm10,
            tank_level_pct = snapshot.tank_level_pct,
            water_quality = snapshot.water_quality,
            "Reading: air {} | particulate {} | climate {} | tank {}",
            tiers.air_quality.label(),
            tiers.particulate.label(),
            tiers.climate.label(),
            tiers.tank_level.label(),
        );

        // Escalations are worth a warning; staying critical is not news.
        let worst = tiers.worst();
        let previous = self.last_tiers.map(|t| t.worst());
        if worst == Tier::Critical && previous != Some(Tier::Critical) {
            warn!("Critical reading: {:?}", tiers);
        }
        self.last_tiers = Some(*tiers);
    }

    fn show_history(&mut self, history: &HistoryView) {
        match history {
            HistoryView::Loaded(set) => {
                let latest = set.records.first().and_then(|r| r.timestamp.as_deref());
                info!(
                    provenance = %set.provenance,
                    records = set.len(),
                    latest = latest.unwrap_or("-"),
                    "{}",
                    history.badge()
                );
            }
            HistoryView::NoData => info!("{}", history.badge()),
            HistoryView::Unavailable { reason } => warn!("{}: {}", history.badge(), reason),
        }
    }

    fn show_connection_state(&mut self, state: ConnectionState) {
        info!(state = %state, "Feed {}", state);
    }

    fn show_location(&mut self, location: Option<&Location>) {
        match location {
            Some(location) => info!("Location: {}", location.label()),
            None => info!("Location unavailable"),
        }
    }
}
