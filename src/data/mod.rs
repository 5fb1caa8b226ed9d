//! Data models and processing for sensor telemetry.
//!
//! This module holds the pure parts of the pipeline: validating raw payloads
//! into snapshots, classifying readings against thresholds, and shaping
//! history records for display.
//!
//! ## Submodules
//!
//! - [`snapshot`]: The [`SensorSnapshot`] model and payload validation
//! - [`classify`]: Threshold tuples and the four-tier classifier
//! - [`history`]: Historical records, provenance and newest-first truncation
//! - [`trend`]: Bounded per-series buffers for sparklines
//! - [`duration`]: Interval parsing and uptime formatting
//!
//! ## Data Flow
//!
//! ```text
//! JSON frame / HTTP body
//!        │
//!        ▼
//! parse_snapshot()  ──▶ ValidationError (dropped)
//!        │
//!        ▼
//! SensorSnapshot ──▶ SensorThresholds::classify() ──▶ SensorTiers
//!        │
//!        └──▶ Trend::record() (for sparklines)
//! ```

pub mod classify;
pub mod duration;
pub mod history;
pub mod snapshot;
pub mod trend;

pub use classify::{classify, AirQualityLabel, SensorThresholds, SensorTiers, ThresholdTuple, Tier};
pub use duration::{format_uptime, parse_duration};
pub use history::{HistoryRecord, HistorySet, HistoryView, Provenance, DEFAULT_HISTORY_LIMIT};
pub use snapshot::{parse_snapshot, parse_snapshot_bytes, Location, Particulate, SensorSnapshot};
pub use trend::{Series, Trend};
