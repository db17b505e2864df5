//! Decoding of inbound text messages into frames.

use serde_json::{Map, Value};

use crate::data::Metrics;
use crate::error::DecodeError;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `ping` or `pong`. Consumed by the router, never dispatched.
    Heartbeat,
    /// `metrics`: a fresh snapshot for one core.
    MetricsUpdate {
        source: String,
        metrics: Box<Metrics>,
    },
    /// `events`: raw log lines from one core, decoded later by the aggregator.
    LogBatch { source: String, lines: Vec<String> },
    /// Any other `type`, forwarded verbatim.
    Unknown { kind: String, payload: Value },
}

impl Frame {
    /// Decode one text message.
    pub fn decode(text: &str) -> Result<Frame, DecodeError> {
        let value: Value = serde_json::from_str(text)?;
        let Value::Object(mut message) = value else {
            return Err(DecodeError::MissingType);
        };
        let kind = match message.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            _ => return Err(DecodeError::MissingType),
        };

        match kind.as_str() {
            "ping" | "pong" => Ok(Frame::Heartbeat),
            "metrics" => {
                let data = message.remove("data").unwrap_or(Value::Null);
                let metrics: Metrics =
                    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
                        kind: "metrics",
                        source,
                    })?;
                let source = source_name(&message)
                    .or_else(|| Some(metrics.name.clone()).filter(|name| !name.is_empty()))
                    .ok_or(DecodeError::MissingSource { kind: "metrics" })?;
                Ok(Frame::MetricsUpdate {
                    source,
                    metrics: Box::new(metrics),
                })
            }
            "events" => {
                let source =
                    source_name(&message).ok_or(DecodeError::MissingSource { kind: "events" })?;
                let lines = match message.remove("data") {
                    Some(Value::Object(mut data)) => log_lines(data.remove("logs")),
                    _ => Vec::new(),
                };
                Ok(Frame::LogBatch { source, lines })
            }
            _ => Ok(Frame::Unknown {
                kind,
                payload: Value::Object(message),
            }),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Heartbeat)
    }

    /// The core this frame belongs to, if any.
    pub fn source(&self) -> Option<&str> {
        match self {
            Frame::MetricsUpdate { source, .. } | Frame::LogBatch { source, .. } => Some(source),
            Frame::Heartbeat | Frame::Unknown { .. } => None,
        }
    }
}

fn source_name(message: &Map<String, Value>) -> Option<String> {
    match message.get("name") {
        Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
        _ => None,
    }
}

// Non-string entries are kept as their JSON text so every entry yields a log line.
fn log_lines(logs: Option<Value>) -> Vec<String> {
    match logs {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(line) => line,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
