//! Message routing on top of the shared session.
//!
//! The [`Router`] is the only thing consumers talk to. It turns inbound text
//! into [`Frame`]s, swallows heartbeats, and fans frames out to data
//! subscribers in wire order. Connection status goes to a separate set of
//! subscribers, each of which is told the current status as soon as it
//! subscribes.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use corewatch::router::{Frame, Router};
//! use corewatch::session::{SessionOptions, WsConnector};
//!
//! # tokio_test::block_on(async {
//! let router = Router::spawn("ws://127.0.0.1:8080/ws", SessionOptions::default(), Arc::new(WsConnector));
//! let _data = router.subscribe(|frame: &Frame| println!("{:?}", frame.source()));
//! let _status = router.subscribe_to_connection_status(|status| println!("{:?}", status));
//! router.connect();
//! # });
//! ```

mod frame;
mod hub;

use std::sync::Arc;

use serde::Serialize;

use crate::session::{
    ConnectionStatus, Connector, Session, SessionListener, SessionOptions, StatusReport,
};

pub use frame::Frame;
pub use hub::Subscription;

use hub::Hub;

/// Shared handle to the session and its subscribers. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Router {
    session: Session,
    hub: Arc<Hub>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (data, status) = self.subscriber_counts();
        f.debug_struct("Hub")
            .field("data_subscribers", &data)
            .field("status_subscribers", &status)
            .finish()
    }
}

impl Router {
    /// Spawn the session task and the router on top of it.
    ///
    /// Must be called from within a tokio runtime. Nothing connects until
    /// [`Router::connect`].
    pub fn spawn(
        endpoint: impl Into<String>,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
    ) -> Router {
        let hub = Arc::new(Hub::default());
        let listener: Arc<dyn SessionListener> = hub.clone();
        let session = Session::spawn(endpoint, options, connector, listener);
        Router { session, hub }
    }

    pub fn endpoint(&self) -> &str {
        self.session.endpoint()
    }

    /// Adopt new session options. The ping interval applies from the next open.
    pub fn configure(&self, options: SessionOptions) {
        self.session.configure(options);
    }

    pub fn connect(&self) {
        self.session.connect();
    }

    /// Receive every decoded non-heartbeat frame, in wire order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.hub.subscribe(callback)
    }

    /// Receive status transitions, starting with the current status.
    pub fn subscribe_to_connection_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        self.hub.subscribe_status(callback)
    }

    /// Serialize `message` and send it. Returns `false` unless connected.
    pub fn send_message<T: Serialize>(&self, message: &T) -> bool {
        match serde_json::to_string(message) {
            Ok(text) => self.session.send_text(text),
            Err(e) => {
                tracing::warn!("Failed to serialize outbound message: {}", e);
                false
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.session.send_text(text)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.session.status()
    }

    pub fn connection_status(&self) -> StatusReport {
        self.session.connection_status()
    }

    pub fn stop_reconnecting(&self) {
        self.session.stop_reconnecting();
    }

    pub fn start_reconnecting(&self) {
        self.session.start_reconnecting();
    }

    /// Close the shared connection for good. Only for process exit.
    pub async fn shutdown(&self) {
        self.session.shutdown().await;
    }
}
