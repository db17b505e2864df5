//! The physical connection behind a session.

use std::fmt;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::state::CloseKind;
use crate::error::TransportError;

/// Something the connection reports back to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    /// Always the last event a link emits.
    Closed(CloseKind),
}

/// An open connection, reduced to two channels.
///
/// Dropping `outbound` asks the connection to close cleanly.
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens connections to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}

/// WebSocket client connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (ws, _) = connect_async(endpoint).await?;
        let (mut sink, mut stream) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let kind = loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(LinkEvent::Text(text.as_str().to_owned())).is_err() {
                                break CloseKind::Clean;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => break close_kind(frame.as_ref()),
                        // Protocol-level pings are answered by tungstenite
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("WebSocket read error: {}", e);
                            break CloseKind::Abnormal;
                        }
                        None => break CloseKind::Abnormal,
                    },
                    out = out_rx.recv() => match out {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::text(text)).await {
                                tracing::warn!("WebSocket write error: {}", e);
                                break CloseKind::Abnormal;
                            }
                        }
                        None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "".into(),
                            };
                            let _ = sink.send(Message::Close(Some(frame))).await;
                            let _ = sink.close().await;
                            return;
                        }
                    },
                }
            };
            let _ = in_tx.send(LinkEvent::Closed(kind));
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

fn close_kind(frame: Option<&CloseFrame>) -> CloseKind {
    match frame {
        Some(frame) if frame.code == CloseCode::Normal => CloseKind::Clean,
        _ => CloseKind::Abnormal,
    }
}
