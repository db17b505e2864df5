//! Log entries shipped by cores inside `events` frames.
//!
//! Every raw line yields exactly one [`LogEntry`]. Lines that are not JSON
//! become an ERROR placeholder, JSON that lacks the required fields becomes
//! a WARN placeholder; both keep the raw text under `context.original`.

use std::fmt;

use chrono::{SecondsFormat, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse a level name, case-insensitively. "WARNING" is accepted as WARN.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warn),
            "ERROR" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A single structured log line from a core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp as sent by the core (`time` or `timestamp` on the wire).
    #[serde(alias = "timestamp", deserialize_with = "deserialize_time")]
    pub time: String,
    #[serde(deserialize_with = "deserialize_level")]
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<i64>,
    pub message: String,
    #[serde(
        default,
        deserialize_with = "deserialize_context",
        skip_serializing_if = "Option::is_none"
    )]
    pub context: Option<Map<String, Value>>,
    /// Any other fields the core attached.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Timestamps arrive as strings or as epoch numbers.
fn deserialize_time<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid timestamp: {}", other))),
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    LogLevel::parse(&s).ok_or_else(|| de::Error::custom(format!("unknown log level: {}", s)))
}

/// A context that is not an object is kept under `value`.
fn deserialize_context<'de, D>(deserializer: D) -> Result<Option<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Some(map)
        }
    })
}

impl LogEntry {
    /// Decode one raw line, substituting a placeholder when it is unusable.
    ///
    /// JSON that is not a valid entry becomes a WARN placeholder, anything
    /// else an ERROR one.
    pub fn decode_line(raw: &str) -> LogEntry {
        let value = match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to parse log entry ({}): {}", e, raw);
                return Self::placeholder(LogLevel::Error, "Log parsing failed", raw);
            }
        };

        match Self::from_value(value) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Invalid log entry format ({}): {}", e, raw);
                Self::placeholder(LogLevel::Warn, "Invalid log format", raw)
            }
        }
    }

    /// Build an entry from a decoded JSON value.
    ///
    /// Requires an object carrying a timestamp, a known level and a message.
    pub fn from_value(value: Value) -> serde_json::Result<LogEntry> {
        serde_json::from_value(value)
    }

    fn placeholder(level: LogLevel, message: &str, raw: &str) -> LogEntry {
        let mut context = Map::new();
        context.insert("original".to_string(), Value::String(raw.to_string()));
        LogEntry {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level,
            thread_id: None,
            message: message.to_string(),
            context: Some(context),
            extra: Map::new(),
        }
    }

    /// The raw text of a placeholder entry, if this is one.
    pub fn original(&self) -> Option<&str> {
        self.context.as_ref()?.get("original")?.as_str()
    }
}

/// Filter applied when reading a core's logs.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    /// Only entries at exactly this level.
    pub level: Option<LogLevel>,
    /// Case-insensitive substring of the message.
    pub text: Option<String>,
    /// Only entries from this worker thread.
    pub thread_id: Option<i64>,
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if self.level.is_some_and(|level| level != entry.level) {
            return false;
        }
        if let Some(text) = &self.text {
            if !entry.message.to_lowercase().contains(&text.to_lowercase()) {
                return false;
            }
        }
        if self.thread_id.is_some() && self.thread_id != entry.thread_id {
            return false;
        }
        true
    }
}
