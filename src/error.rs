//! Error types for the session transport and frame decoding.

use thiserror::Error;

/// Errors raised while opening or driving the physical connection.
///
/// These never escape the session: they feed the reconnect policy and
/// show up to consumers only as connection status flags.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection attempt failed (refused, DNS, handshake).
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The endpoint could not be turned into a connection request.
    #[error("Invalid endpoint: {0}")]
    Endpoint(String),

    /// The connection dropped while in use.
    #[error("Connection closed: {0}")]
    Closed(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;

        match err {
            Error::Url(e) => TransportError::Endpoint(e.to_string()),
            Error::ConnectionClosed | Error::AlreadyClosed => {
                TransportError::Closed(err.to_string())
            }
            other => TransportError::Connect(other.to_string()),
        }
    }
}

/// Errors produced when an inbound text frame cannot be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The frame is JSON but carries no string `type` field.
    #[error("Frame has no type field")]
    MissingType,

    /// A data frame that does not name the core it came from.
    #[error("{kind} frame has no source name")]
    MissingSource { kind: &'static str },

    /// A known frame type whose payload does not match its shape.
    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        source: serde_json::Error,
    },
}
