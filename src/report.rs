//! Plain-text status report printed by the console.
//!
//! Shows the connection state, then one row per core with health,
//! liveness, thread usage, throughput and a working-threads trend.

use std::fmt::Write;

use crate::data::duration::format_duration;
use crate::data::{HealthStatus, LogEntry, SourceSummary};
use crate::session::{ConnectionState, StatusReport};

/// Placeholder for values a core has not reported yet.
const MISSING: &str = "-";

/// One-line description of the connection.
pub fn connection_line(endpoint: &str, status: &StatusReport) -> String {
    let state = if status.is_connected {
        "connected".to_string()
    } else if status.is_reconnecting {
        format!("reconnecting (attempt {})", status.reconnect_attempts)
    } else if status.state == ConnectionState::Connecting {
        "connecting".to_string()
    } else {
        "disconnected".to_string()
    };
    format!("{}  {}", endpoint, state)
}

/// Render the full report.
pub fn render(endpoint: &str, status: &StatusReport, summaries: &[SourceSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", connection_line(endpoint, status));

    let live = summaries.iter().filter(|s| s.live).count();
    let critical = summaries
        .iter()
        .filter(|s| s.health == Some(HealthStatus::Critical))
        .count();
    let warning = summaries
        .iter()
        .filter(|s| s.health == Some(HealthStatus::Warning))
        .count();
    let _ = writeln!(
        out,
        "{} cores, {} live, {} warning, {} critical",
        summaries.len(),
        live,
        warning,
        critical
    );

    if summaries.is_empty() {
        return out;
    }

    let _ = writeln!(
        out,
        "{:<16} {:<6} {:<5} {:>8} {:>6} {:>10} {:>10} {:>10} {:>9}  {}",
        "CORE", "STATUS", "LIVE", "THREADS", "USAGE", "SPEED", "RESULTS", "RATE", "AGE", "TREND"
    );
    for summary in summaries {
        let _ = writeln!(out, "{}", render_row(summary));
    }
    out
}

fn render_row(s: &SourceSummary) -> String {
    let status = s.health.map(|h| h.symbol()).unwrap_or(MISSING);
    let live = if s.live { "yes" } else { "no" };
    let threads = match (s.working, s.threads) {
        (Some(working), Some(threads)) => format!("{}/{}", working, threads),
        _ => MISSING.to_string(),
    };
    let usage = s
        .usage_rate
        .map(|rate| format!("{:.0}%", rate * 100.0))
        .unwrap_or_else(|| MISSING.to_string());
    let speed = s
        .speed
        .map(|speed| format!("{:.2}/s", speed))
        .unwrap_or_else(|| MISSING.to_string());
    let results = s
        .total_result
        .map(|total| total.to_string())
        .unwrap_or_else(|| MISSING.to_string());
    let rate = s
        .result_rate
        .map(|rate| format!("{:.2}/s", rate))
        .unwrap_or_else(|| MISSING.to_string());
    let age = s
        .age
        .map(format_duration)
        .unwrap_or_else(|| MISSING.to_string());

    format!(
        "{:<16} {:<6} {:<5} {:>8} {:>6} {:>10} {:>10} {:>10} {:>9}  {}",
        s.name, status, live, threads, usage, speed, results, rate, age, s.sparkline
    )
    .trim_end()
    .to_string()
}

/// Render log entries, one per line, indented under their core.
pub fn render_logs(name: &str, entries: &[LogEntry]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        return out;
    }
    let _ = writeln!(out, "  {} logs:", name);
    for entry in entries {
        let thread = entry
            .thread_id
            .map(|id| format!("[{}] ", id))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "    {} {:<5} {}{}",
            entry.time, entry.level, thread, entry.message
        );
    }
    out
}
