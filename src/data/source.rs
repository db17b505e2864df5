//! Core registrations as produced by the inventory.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::duration::parse_poll_interval;

/// A core the console is told to watch.
///
/// Registrations come from the configuration file or from the `/api/cores`
/// inventory listing. A core that reports before it is listed gets a
/// [`SourceRegistration::discovered`] placeholder until the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistration {
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Reporting interval as configured, e.g. "1s" or "500ms".
    #[serde(default = "default_interval")]
    pub interval: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

fn default_interval() -> String {
    "1s".to_string()
}

impl SourceRegistration {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16, interval: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            interval: interval.into(),
            credential: None,
        }
    }

    /// Placeholder for a core seen on the stream but not in the inventory.
    pub fn discovered(name: impl Into<String>) -> Self {
        Self::new(name, "", 0, default_interval())
    }

    pub fn is_discovered(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }

    /// The configured interval, falling back to one second when unreadable.
    pub fn poll_interval(&self) -> Duration {
        parse_poll_interval(&self.interval)
    }

    /// `host:port` of the core's monitor endpoint.
    pub fn address(&self) -> String {
        if self.is_discovered() {
            return "-".to_string();
        }
        format!("{}:{}", self.host, self.port)
    }

    /// Parse a `/api/cores` inventory listing. `null` is an empty listing.
    pub fn parse_inventory(json: &str) -> serde_json::Result<Vec<SourceRegistration>> {
        let listing: Option<Vec<SourceRegistration>> = serde_json::from_str(json)?;
        Ok(listing.unwrap_or_default())
    }
}
