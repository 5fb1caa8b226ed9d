//! Threshold classification of sensor readings.
//!
//! Each sensor group carries a four-point [`ThresholdTuple`]; a reading is
//! placed in one of four [`Tier`]s by comparing it against the upper three
//! breakpoints.

use serde::{Deserialize, Serialize};

use super::snapshot::SensorSnapshot;

/// Severity tier of a single reading, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tier {
    Excellent,
    Moderate,
    Poor,
    Critical,
}

impl Tier {
    /// Returns the label shown next to a reading.
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Excellent => "Excellent",
            Tier::Moderate => "Moderate",
            Tier::Poor => "Poor",
            Tier::Critical => "Critical",
        }
    }
}

/// Four ascending breakpoints `(good, moderate, poor, danger)`.
///
/// The caller is responsible for keeping `good <= moderate <= poor <= danger`.
/// Nothing checks this: a tuple out of order still classifies, it just
/// produces meaningless tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct ThresholdTuple {
    pub good: f64,
    pub moderate: f64,
    pub poor: f64,
    pub danger: f64,
}

impl ThresholdTuple {
    pub const fn new(good: f64, moderate: f64, poor: f64, danger: f64) -> Self {
        Self {
            good,
            moderate,
            poor,
            danger,
        }
    }
}

impl From<[f64; 4]> for ThresholdTuple {
    fn from([good, moderate, poor, danger]: [f64; 4]) -> Self {
        Self::new(good, moderate, poor, danger)
    }
}

impl From<ThresholdTuple> for [f64; 4] {
    fn from(t: ThresholdTuple) -> Self {
        [t.good, t.moderate, t.poor, t.danger]
    }
}

/// Classify a reading against a threshold tuple.
///
/// Values at or below `moderate` are `Excellent`: the `good` breakpoint does
/// not open a tier of its own, matching the thresholds the dashboards were
/// tuned with. Each breakpoint belongs to the lower tier. NaN fails every
/// comparison and lands in `Critical`.
pub fn classify(value: f64, thresholds: &ThresholdTuple) -> Tier {
    if value <= thresholds.moderate {
        Tier::Excellent
    } else if value <= thresholds.poor {
        Tier::Moderate
    } else if value <= thresholds.danger {
        Tier::Poor
    } else {
        Tier::Critical
    }
}

/// Threshold tuples for every classified sensor group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorThresholds {
    /// MQ-135 air quality.
    pub air_quality: ThresholdTuple,
    /// PMS5003, classified on PM2.5.
    pub particulate: ThresholdTuple,
    /// DHT22, classified on humidity.
    pub climate: ThresholdTuple,
    /// FC-28 tank level.
    pub tank_level: ThresholdTuple,
}

impl Default for SensorThresholds {
    fn default() -> Self {
        Self {
            air_quality: ThresholdTuple::new(0.0, 100.0, 200.0, 400.0),
            particulate: ThresholdTuple::new(0.0, 12.0, 35.0, 55.0),
            climate: ThresholdTuple::new(30.0, 60.0, 70.0, 80.0),
            tank_level: ThresholdTuple::new(0.0, 30.0, 60.0, 80.0),
        }
    }
}

impl SensorThresholds {
    /// Classify every sensor group of a snapshot.
    pub fn classify(&self, snapshot: &SensorSnapshot) -> SensorTiers {
        SensorTiers {
            air_quality: classify(snapshot.air_quality, &self.air_quality),
            particulate: classify(snapshot.particulate.pm25, &self.particulate),
            climate: classify(snapshot.humidity_pct, &self.climate),
            tank_level: classify(snapshot.tank_level_pct, &self.tank_level),
        }
    }
}

/// The tier of each sensor group for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorTiers {
    pub air_quality: Tier,
    pub particulate: Tier,
    pub climate: Tier,
    pub tank_level: Tier,
}

impl SensorTiers {
    /// The worst tier across all groups.
    pub fn worst(&self) -> Tier {
        self.air_quality
            .max(self.particulate)
            .max(self.climate)
            .max(self.tank_level)
    }
}

/// Coarse air quality wording used in the quick-stats line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AirQualityLabel {
    Good,
    Moderate,
    Poor,
}

impl AirQualityLabel {
    pub fn from_reading(air_quality: f64) -> Self {
        if air_quality < 100.0 {
            AirQualityLabel::Good
        } else if air_quality < 200.0 {
            AirQualityLabel::Moderate
        } else {
            AirQualityLabel::Poor
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AirQualityLabel::Good => "Good",
            AirQualityLabel::Moderate => "Moderate",
            AirQualityLabel::Poor => "Poor",
        }
    }
}

/// Full-scale value of the air quality gauge.
const AIR_QUALITY_GAUGE_MAX: f64 = 500.0;

/// Air quality gauge fill in percent, capped at 100.
pub fn air_quality_gauge(value: f64) -> f64 {
    (value / AIR_QUALITY_GAUGE_MAX * 100.0).clamp(0.0, 100.0)
}

/// Tank fill in percent for drawing; the reading itself is left untouched.
pub fn tank_gauge(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::snapshot::parse_snapshot;

    const AIR: ThresholdTuple = ThresholdTuple::new(0.0, 100.0, 200.0, 400.0);

    #[test]
    fn test_breakpoints_go_to_lower_tier() {
        assert_eq!(classify(100.0, &AIR), Tier::Excellent);
        assert_eq!(classify(200.0, &AIR), Tier::Moderate);
        assert_eq!(classify(400.0, &AIR), Tier::Poor);
        assert_eq!(classify(400.0001, &AIR), Tier::Critical);
    }

    #[test]
    fn test_good_and_moderate_share_a_tier() {
        let climate = SensorThresholds::default().climate;
        assert_eq!(classify(climate.good, &climate), Tier::Excellent);
        assert_eq!(classify(climate.moderate, &climate), Tier::Excellent);
        assert_eq!(classify(45.0, &climate), Tier::Excellent);
        assert_eq!(classify(-1_000.0, &climate), Tier::Excellent);
    }

    #[test]
    fn test_bands() {
        assert_eq!(classify(150.0, &AIR), Tier::Moderate);
        assert_eq!(classify(250.0, &AIR), Tier::Poor);
        assert_eq!(classify(1e9, &AIR), Tier::Critical);
        assert_eq!(classify(f64::INFINITY, &AIR), Tier::Critical);
        assert_eq!(classify(f64::NEG_INFINITY, &AIR), Tier::Excellent);
    }

    #[test]
    fn test_nan_is_critical() {
        assert_eq!(classify(f64::NAN, &AIR), Tier::Critical);
    }

    #[test]
    fn test_unordered_tuple_still_classifies() {
        let backwards = ThresholdTuple::new(400.0, 200.0, 100.0, 0.0);
        assert_eq!(classify(150.0, &backwards), Tier::Excellent);
        assert_eq!(classify(250.0, &backwards), Tier::Critical);
    }

    #[test]
    fn test_reference_payload_tiers() {
        let raw = serde_json::json!({
            "mq135": { "value": 250 },
            "dht22": { "temperature": 22, "humidity": 55 },
            "tds": { "value": 200 },
            "fc28": { "value": 60 },
            "pms5003": { "pm25": 10, "pm10": 20 }
        });
        let snapshot = parse_snapshot(&raw).unwrap();
        let tiers = SensorThresholds::default().classify(&snapshot);

        assert_eq!(tiers.air_quality, Tier::Poor);
        assert_eq!(tiers.particulate, Tier::Excellent);
        assert_eq!(tiers.climate, Tier::Excellent);
        assert_eq!(tiers.tank_level, Tier::Moderate);
        assert_eq!(tiers.worst(), Tier::Poor);
    }

    #[test]
    fn test_tuple_deserializes_from_array() {
        let t: ThresholdTuple = serde_json::from_str("[1, 2, 3, 4]").unwrap();
        assert_eq!(t, ThresholdTuple::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(serde_json::to_string(&t).unwrap(), "[1.0,2.0,3.0,4.0]");
    }

    #[test]
    fn test_air_quality_label() {
        assert_eq!(AirQualityLabel::from_reading(99.9), AirQualityLabel::Good);
        assert_eq!(AirQualityLabel::from_reading(100.0), AirQualityLabel::Moderate);
        assert_eq!(AirQualityLabel::from_reading(200.0), AirQualityLabel::Poor);
    }

    #[test]
    fn test_gauges() {
        assert_eq!(air_quality_gauge(250.0), 50.0);
        assert_eq!(air_quality_gauge(900.0), 100.0);
        assert_eq!(tank_gauge(120.0), 100.0);
        assert_eq!(tank_gauge(-5.0), 0.0);
    }
}
