use std::time::Duration;

use anyhow::{bail, Result};

/// Suffix to milliseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ms", 1.0),
    ("s", 1_000.0),
    ("m", 60_000.0),
    ("h", 3_600_000.0),
];

/// Parse interval strings like "10s", "1.5m", "250ms"; a bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            return from_millis(val_str.trim(), *multiplier, s);
        }
    }

    from_millis(s, 1_000.0, s)
}

fn from_millis(val_str: &str, multiplier: f64, original: &str) -> Result<Duration> {
    let val: f64 = match val_str.parse() {
        Ok(val) => val,
        Err(_) => bail!("Unknown duration format: {}", original),
    };
    if !val.is_finite() || val < 0.0 {
        bail!("Duration must be a non-negative number: {}", original);
    }
    Ok(Duration::from_millis((val * multiplier) as u64))
}

/// Format an uptime as `Hh Mm Ss`.
pub fn format_uptime(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
