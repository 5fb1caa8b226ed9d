//! Historical records pulled from the backend's history providers.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Default number of records kept for display.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// One flattened historical reading.
///
/// History endpoints return flat rows rather than the nested snapshot
/// shape. Missing or null readings are shown as zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryRecord {
    pub timestamp: Option<String>,
    #[serde(deserialize_with = "zero_if_null")]
    pub mq135: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub temperature: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub humidity: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub pm25: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub pm10: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub fc28: f64,
    #[serde(deserialize_with = "zero_if_null")]
    pub tds: f64,
}

fn zero_if_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// Which backend source a set of history records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The cloud spreadsheet mirror.
    Sheets,
    /// The backend's local history file.
    Local,
}

impl Provenance {
    /// Badge text shown above the history table.
    pub fn badge(&self) -> &'static str {
        match self {
            Provenance::Sheets => "Data from Google Sheets",
            Provenance::Local => "Data from Local Storage",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Sheets => write!(f, "sheets"),
            Provenance::Local => write!(f, "local"),
        }
    }
}

/// A provenance-tagged set of records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySet {
    pub provenance: Provenance,
    pub records: Vec<HistoryRecord>,
}

impl HistorySet {
    /// Build a display set from records in arrival order (oldest first).
    ///
    /// Keeps the most recent `limit` records and reverses them so the newest
    /// comes first.
    pub fn from_records(records: Vec<HistoryRecord>, provenance: Provenance, limit: usize) -> Self {
        let skip = records.len().saturating_sub(limit);
        let mut records: Vec<HistoryRecord> = records.into_iter().skip(skip).collect();
        records.reverse();
        Self {
            provenance,
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Outcome of one history pull, as handed to the display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryView {
    /// A provider returned records.
    Loaded(HistorySet),
    /// Every provider answered, none had records.
    NoData,
    /// Every provider failed.
    Unavailable { reason: String },
}

impl HistoryView {
    /// Badge text summarising the pull.
    pub fn badge(&self) -> &str {
        match self {
            HistoryView::Loaded(set) => set.provenance.badge(),
            HistoryView::NoData => "No data yet - start the simulator",
            HistoryView::Unavailable { .. } => "Error loading data",
        }
    }

    pub fn records(&self) -> &[HistoryRecord] {
        match self {
            HistoryView::Loaded(set) => &set.records,
            _ => &[],
        }
    }
}
