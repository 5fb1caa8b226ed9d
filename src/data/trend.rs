//! Recent readings per sensor series, for sparklines.

use std::collections::{HashMap, VecDeque};

use super::classify::{SensorTiers, Tier};
use super::snapshot::SensorSnapshot;

/// Maximum number of readings kept per series.
const MAX_TREND_SIZE: usize = 60;

/// A single displayed sensor value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    AirQuality,
    Pm25,
    Pm10,
    Temperature,
    Humidity,
    TankLevel,
    WaterQuality,
}

impl Series {
    /// Display order of the live table.
    pub const ALL: [Series; 7] = [
        Series::AirQuality,
        Series::Pm25,
        Series::Pm10,
        Series::Temperature,
        Series::Humidity,
        Series::TankLevel,
        Series::WaterQuality,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Series::AirQuality => "Air quality (MQ-135)",
            Series::Pm25 => "PM2.5 (PMS5003)",
            Series::Pm10 => "PM10 (PMS5003)",
            Series::Temperature => "Temperature (DHT22)",
            Series::Humidity => "Humidity (DHT22)",
            Series::TankLevel => "Tank level (FC-28)",
            Series::WaterQuality => "Water quality (TDS)",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Series::AirQuality | Series::WaterQuality => "ppm",
            Series::Pm25 | Series::Pm10 => "µg/m³",
            Series::Temperature => "°C",
            Series::Humidity | Series::TankLevel => "%",
        }
    }

    pub fn value(&self, snapshot: &SensorSnapshot) -> f64 {
        match self {
            Series::AirQuality => snapshot.air_quality,
            Series::Pm25 => snapshot.particulate.pm25,
            Series::Pm10 => snapshot.particulate.pm10,
            Series::Temperature => snapshot.temperature_c,
            Series::Humidity => snapshot.humidity_pct,
            Series::TankLevel => snapshot.tank_level_pct,
            Series::WaterQuality => snapshot.water_quality,
        }
    }

    /// The tier that drives this series' status, if it is classified.
    pub fn tier(&self, tiers: &SensorTiers) -> Option<Tier> {
        match self {
            Series::AirQuality => Some(tiers.air_quality),
            Series::Pm25 => Some(tiers.particulate),
            Series::Humidity => Some(tiers.climate),
            Series::TankLevel => Some(tiers.tank_level),
            Series::Pm10 | Series::Temperature | Series::WaterQuality => None,
        }
    }
}

/// Tracks recent readings for trend indicators in the UI.
#[derive(Debug, Clone, Default)]
pub struct Trend {
    values: HashMap<Series, VecDeque<f64>>,
}

impl Trend {
    /// Create a new empty trend buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every series of a snapshot.
    pub fn record(&mut self, snapshot: &SensorSnapshot) {
        for series in Series::ALL {
            let values = self.values.entry(series).or_default();
            values.push_back(series.value(snapshot));
            if values.len() > MAX_TREND_SIZE {
                values.pop_front();
            }
        }
    }

    pub fn len(&self, series: Series) -> usize {
        self.values.get(&series).map_or(0, VecDeque::len)
    }

    /// Get sparkline data (normalized to 0-7 for 8 bar levels).
    ///
    /// Returns an empty Vec if there's not enough history.
    pub fn sparkline(&self, series: Series) -> Vec<u8> {
        let Some(values) = self.values.get(&series) else {
            return Vec::new();
        };

        if values.len() < 2 {
            return Vec::new();
        }

        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let range = max - min;

        values
            .iter()
            .map(|&v| {
                if range <= f64::EPSILON {
                    return 0;
                }
                let normalized = ((v - min) / range * 7.0) as u8;
                normalized.min(7)
            })
            .collect()
    }

    /// Difference between the two most recent readings.
    pub fn delta(&self, series: Series) -> Option<f64> {
        let values = self.values.get(&series)?;
        let current = *values.back()?;
        let previous = *values.get(values.len().checked_sub(2)?)?;
        Some(current - previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::Particulate;

    fn snapshot(air_quality: f64) -> SensorSnapshot {
        SensorSnapshot {
            air_quality,
            temperature_c: 22.0,
            humidity_pct: 55.0,
            particulate: Particulate { pm25: 10.0, pm10: 20.0 },
            tank_level_pct: 60.0,
            water_quality: 200.0,
            location: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_trend_is_bounded() {
        let mut trend = Trend::new();
        for i in 0..100 {
            trend.record(&snapshot(i as f64));
        }
        assert_eq!(trend.len(Series::AirQuality), MAX_TREND_SIZE);
        assert_eq!(trend.delta(Series::AirQuality), Some(1.0));
    }

    #[test]
    fn test_sparkline_needs_two_points() {
        let mut trend = Trend::new();
        assert!(trend.sparkline(Series::AirQuality).is_empty());
        trend.record(&snapshot(1.0));
        assert!(trend.sparkline(Series::AirQuality).is_empty());
        assert_eq!(trend.delta(Series::AirQuality), None);
    }

    #[test]
    fn test_sparkline_normalizes_range() {
        let mut trend = Trend::new();
        for v in [100.0, 200.0, 300.0] {
            trend.record(&snapshot(v));
        }
        assert_eq!(trend.sparkline(Series::AirQuality), vec![0, 3, 7]);
        // Flat series render at the baseline.
        assert_eq!(trend.sparkline(Series::Temperature), vec![0, 0, 0]);
    }
}
