//! The shared transport session.
//!
//! A [`Session`] owns at most one physical connection to one endpoint. It
//! opens the connection, pings it on a fixed cadence, notices when it goes
//! away and reconnects with a linear backoff capped at ten seconds. It knows
//! nothing about cores or frames: inbound text and status transitions are
//! handed to a [`SessionListener`].
//!
//! ## Event model
//!
//! ```text
//!  connect attempt ─┐
//!  inbound pump ────┤   Event{generation}   ┌──────────────┐   on_status / on_text
//!  heartbeat tick ──┼──────────────────────▶│ driver task  │──────────────────────▶ listener
//!  reconnect timer ─┤                       │ SessionState │
//!  Session handle ──┘                       └──────────────┘
//! ```
//!
//! Every helper task only posts events; the driver applies them one at a
//! time, in arrival order. Events tagged with an older generation than the
//! current attempt are ignored.

mod link;
mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::error::TransportError;

pub use link::{Connector, Link, LinkEvent, WsConnector};
pub use state::{
    reconnect_delay, CloseKind, ConnectionState, ConnectionStatus, SessionOptions, StatusReport,
    DEFAULT_PING_INTERVAL, MAX_RECONNECT_DELAY,
};

use state::SessionState;

/// Heartbeat payload sent while the connection is open.
pub const PING_MESSAGE: &str = r#"{"type":"ping"}"#;

/// Receives what the session produces.
///
/// Both methods run on the session task. They must not block.
pub trait SessionListener: Send + Sync + 'static {
    /// A text message arrived on the current connection.
    fn on_text(&self, text: &str);

    /// The externally visible status changed.
    fn on_status(&self, status: ConnectionStatus);
}

enum Event {
    Connect,
    StartReconnecting,
    Opened { generation: u64, link: Link },
    ConnectFailed { generation: u64, error: TransportError },
    Inbound { generation: u64, text: String },
    Closed { generation: u64, kind: CloseKind },
    Heartbeat { generation: u64 },
    ReconnectDue { generation: u64 },
    /// Re-check the status after a change made outside the driver.
    Refresh,
    Shutdown(oneshot::Sender<()>),
}

#[derive(Default)]
struct Resources {
    outbound: Option<mpsc::UnboundedSender<String>>,
    /// Connect attempt, inbound pump and heartbeat of the current generation.
    tasks: Vec<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Resources {
    fn teardown(&mut self) {
        // Dropping the sender asks the link to close cleanly.
        self.outbound = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.cancel_reconnect();
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.reconnect.take() {
            timer.abort();
        }
    }
}

struct Core {
    machine: SessionState,
    resources: Resources,
}

struct Shared {
    endpoint: String,
    connector: Arc<dyn Connector>,
    core: Mutex<Core>,
    events: mpsc::UnboundedSender<Event>,
}

/// Handle to the session task. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.shared.endpoint)
            .field("status", &self.connection_status())
            .finish()
    }
}

impl Session {
    /// Spawn the session task. Nothing is opened until [`Session::connect`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        endpoint: impl Into<String>,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        listener: Arc<dyn SessionListener>,
    ) -> Session {
        let (events, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            endpoint: endpoint.into(),
            connector,
            core: Mutex::new(Core {
                machine: SessionState::new(options),
                resources: Resources::default(),
            }),
            events,
        });

        tokio::spawn(drive(shared.clone(), rx, listener));

        Session { shared }
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Open the connection unless one is already connecting or open.
    pub fn connect(&self) {
        let _ = self.shared.events.send(Event::Connect);
    }

    /// Adopt new options. The ping interval applies from the next open.
    pub fn configure(&self, options: SessionOptions) {
        self.shared.core.lock().machine.configure(options);
    }

    /// Send a text message. Returns `false` unless the connection is open.
    ///
    /// Nothing is buffered or retried.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let core = self.shared.core.lock();
        if !core.machine.is_open() {
            tracing::warn!(
                "Dropping outbound message: connection is {}",
                core.machine.state()
            );
            return false;
        }
        match &core.resources.outbound {
            Some(outbound) => outbound.send(text.into()).is_ok(),
            None => false,
        }
    }

    /// Stop reconnecting. A pending reconnect timer is cancelled before
    /// this returns.
    pub fn stop_reconnecting(&self) {
        {
            let mut core = self.shared.core.lock();
            core.machine.stop_reconnecting();
            core.resources.cancel_reconnect();
        }
        let _ = self.shared.events.send(Event::Refresh);
    }

    /// Resume reconnecting with a fresh attempt count, and connect.
    pub fn start_reconnecting(&self) {
        let _ = self.shared.events.send(Event::StartReconnecting);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.core.lock().machine.status()
    }

    pub fn connection_status(&self) -> StatusReport {
        self.shared.core.lock().machine.report()
    }

    /// Close the connection cleanly and end the session task.
    ///
    /// Further calls on any clone of this session are no-ops.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.shared.events.send(Event::Shutdown(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<Event>,
    listener: Arc<dyn SessionListener>,
) {
    while let Some(event) = events.recv().await {
        let mut finished = None;
        let text = {
            let mut core = shared.core.lock();
            match event {
                Event::Shutdown(done) => {
                    core.machine.begin_close();
                    core.resources.teardown();
                    core.machine.closed();
                    tracing::info!("Session to {} shut down", shared.endpoint);
                    finished = Some(done);
                    None
                }
                event => shared.handle(&mut *core, event),
            }
        };

        let change = shared.core.lock().machine.take_status_change();
        if let Some(status) = change {
            listener.on_status(status);
        }
        if let Some(text) = text {
            listener.on_text(&text);
        }

        if let Some(done) = finished {
            let _ = done.send(());
            break;
        }
    }
}

impl Shared {
    /// Apply one event. Returns inbound text to hand to the listener.
    fn handle(&self, core: &mut Core, event: Event) -> Option<String> {
        match event {
            Event::Connect => self.connect(core),
            Event::StartReconnecting => {
                core.machine.start_reconnecting();
                self.connect(core);
            }
            Event::Opened { generation, link } => self.opened(core, generation, link),
            Event::ConnectFailed { generation, error } => {
                if !core.machine.is_current(generation) {
                    return None;
                }
                tracing::warn!("Connection to {} failed: {}", self.endpoint, error);
                let delay = core.machine.on_connect_failed(generation);
                core.resources.teardown();
                if let Some(delay) = delay {
                    self.arm_reconnect(core, generation, delay);
                }
            }
            Event::Inbound { generation, text } => {
                if core.machine.is_current(generation) && core.machine.is_open() {
                    return Some(text);
                }
            }
            Event::Closed { generation, kind } => {
                if !core.machine.is_current(generation) {
                    return None;
                }
                match kind {
                    CloseKind::Clean => tracing::info!("Connection to {} closed", self.endpoint),
                    CloseKind::Abnormal => {
                        tracing::warn!("Connection to {} lost", self.endpoint)
                    }
                }
                let delay = core.machine.on_close(generation, kind);
                core.resources.teardown();
                if let Some(delay) = delay {
                    self.arm_reconnect(core, generation, delay);
                }
            }
            Event::Heartbeat { generation } => {
                if core.machine.is_current(generation) && core.machine.is_open() {
                    if let Some(outbound) = &core.resources.outbound {
                        tracing::debug!("Sending heartbeat ping");
                        let _ = outbound.send(PING_MESSAGE.to_string());
                    }
                }
            }
            Event::ReconnectDue { generation } => {
                core.resources.reconnect = None;
                if core.machine.reconnect_due(generation) {
                    self.connect(core);
                }
            }
            Event::Refresh | Event::Shutdown(_) => {}
        }
        None
    }

    fn connect(&self, core: &mut Core) {
        let Some(generation) = core.machine.begin_connect() else {
            tracing::debug!("Connect ignored: connection is {}", core.machine.state());
            return;
        };
        core.resources.teardown();
        tracing::info!("Connecting to {} (generation {})", self.endpoint, generation);

        let connector = self.connector.clone();
        let endpoint = self.endpoint.clone();
        let events = self.events.clone();
        core.resources.tasks.push(tokio::spawn(async move {
            let event = match connector.connect(&endpoint).await {
                Ok(link) => Event::Opened { generation, link },
                Err(error) => Event::ConnectFailed { generation, error },
            };
            let _ = events.send(event);
        }));
    }

    fn opened(&self, core: &mut Core, generation: u64, link: Link) {
        if !core.machine.on_open(generation) {
            // Dropping the link closes it.
            tracing::debug!("Discarding connection from stale generation {}", generation);
            return;
        }
        tracing::info!("Connected to {}", self.endpoint);

        let Link {
            outbound,
            mut inbound,
        } = link;
        core.resources.outbound = Some(outbound);

        let events = self.events.clone();
        core.resources.tasks.push(tokio::spawn(async move {
            loop {
                match inbound.recv().await {
                    Some(LinkEvent::Text(text)) => {
                        if events.send(Event::Inbound { generation, text }).is_err() {
                            return;
                        }
                    }
                    Some(LinkEvent::Closed(kind)) => {
                        let _ = events.send(Event::Closed { generation, kind });
                        return;
                    }
                    None => {
                        let _ = events.send(Event::Closed {
                            generation,
                            kind: CloseKind::Abnormal,
                        });
                        return;
                    }
                }
            }
        }));

        let every = core.machine.options().ping_interval;
        if every.is_zero() {
            tracing::warn!("Heartbeat disabled: ping interval is zero");
            return;
        }
        let events = self.events.clone();
        core.resources.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                if events.send(Event::Heartbeat { generation }).is_err() {
                    return;
                }
            }
        }));
    }

    fn arm_reconnect(&self, core: &mut Core, generation: u64, delay: Duration) {
        tracing::info!(
            "Reconnecting to {} in {:?} (attempt {})",
            self.endpoint,
            delay,
            core.machine.reconnect_attempts()
        );
        let events = self.events.clone();
        core.resources.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::ReconnectDue { generation });
        }));
    }
}
