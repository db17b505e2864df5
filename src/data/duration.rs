use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Deserializer};

/// Suffix to nanoseconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, f64)] = &[
    ("ns", 1.0),
    ("µs", 1_000.0),
    ("us", 1_000.0),
    ("ms", 1_000_000.0),
    ("s", 1_000_000_000.0),
    ("m", 60_000_000_000.0),
    ("h", 3_600_000_000_000.0),
];

/// Poll interval assumed when a core's interval string cannot be read.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Parse duration strings like "1s", "500ms", "2m", "1.5h", "16.958µs"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    for (suffix, multiplier) in UNITS {
        if let Some(val_str) = s.strip_suffix(suffix) {
            let val: f64 = val_str.trim().parse()?;
            if !val.is_finite() || val < 0.0 {
                bail!("Duration out of range: {}", s);
            }
            return Ok(Duration::from_nanos((val * multiplier) as u64));
        }
    }

    bail!("Unknown duration format: {}", s)
}

/// Parse a core's reporting interval, falling back to one second.
///
/// Units are case-insensitive. A bare number, or a whole number followed by
/// an unrecognized unit ("5sec"), is read as seconds, matching how cores
/// are configured.
pub fn parse_poll_interval(s: &str) -> Duration {
    let s = s.trim().to_lowercase();

    let parsed = match parse_duration(&s) {
        Ok(d) => Some(d),
        Err(_) => whole_seconds(&s),
    };

    match parsed {
        Some(d) if !d.is_zero() => d,
        _ => {
            tracing::warn!("Unreadable poll interval {:?}, assuming 1s", s);
            DEFAULT_POLL_INTERVAL
        }
    }
}

/// "3" or "5sec": leading digits, then nothing or a word.
fn whole_seconds(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() || !unit.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    digits.parse::<u64>().ok().map(Duration::from_secs)
}

/// Format a duration for display
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0ns".to_string()
    } else if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}µs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}

/// Serde adapter for duration strings in configuration files.
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}
