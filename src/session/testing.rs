//! In-memory connector and listener doubles for session tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{CloseKind, ConnectionStatus, Connector, Link, LinkEvent, SessionListener};
use crate::error::TransportError;

/// Let spawned tasks run to quiescence.
pub(crate) async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// The server side of one in-memory connection.
pub(crate) struct Peer {
    to_client: mpsc::UnboundedSender<LinkEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl Peer {
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.to_client.send(LinkEvent::Text(text.to_string()));
    }

    pub(crate) fn send_json(&self, value: serde_json::Value) {
        self.send_text(&value.to_string());
    }

    pub(crate) fn close(&self, kind: CloseKind) {
        let _ = self.to_client.send(LinkEvent::Closed(kind));
    }

    /// Everything the client sent since the last call.
    pub(crate) fn received(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            out.push(text);
        }
        out
    }

    /// Drains pending messages and reports whether the client hung up.
    pub(crate) async fn is_closed_by_client(&mut self) -> bool {
        while self.from_client.recv().await.is_some() {}
        true
    }
}

#[derive(Debug, Default)]
struct ConnectorState {
    attempts: Vec<Instant>,
    failing: bool,
}

#[derive(Debug)]
pub(crate) struct TestConnector {
    state: Mutex<ConnectorState>,
    peers: mpsc::UnboundedSender<Peer>,
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer").finish_non_exhaustive()
    }
}

impl TestConnector {
    pub(crate) fn new() -> (Arc<TestConnector>, mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = TestConnector {
            state: Mutex::new(ConnectorState::default()),
            peers,
        };
        (Arc::new(connector), rx)
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// When each connection attempt was made.
    pub(crate) fn attempts(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self, _endpoint: &str) -> Result<Link, TransportError> {
        {
            let mut state = self.state.lock();
            state.attempts.push(Instant::now());
            if state.failing {
                return Err(TransportError::Connect("connection refused".to_string()));
            }
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let _ = self.peers.send(Peer {
            to_client,
            from_client,
        });
        Ok(Link { outbound, inbound })
    }
}

/// Records everything a session hands its listener.
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    texts: Mutex<Vec<String>>,
    statuses: Mutex<Vec<ConnectionStatus>>,
}

impl RecordingListener {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().clone()
    }

    pub(crate) fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().clone()
    }
}

impl SessionListener for RecordingListener {
    fn on_text(&self, text: &str) {
        self.texts.lock().push(text.to_string());
    }

    fn on_status(&self, status: ConnectionStatus) {
        self.statuses.lock().push(status);
    }
}
