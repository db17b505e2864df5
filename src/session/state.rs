//! Connection lifecycle bookkeeping, free of any I/O.
//!
//! The session task feeds every transport event through [`SessionState`],
//! which decides what happens next (open, back off, give up) and whether
//! the externally visible status changed. Events carry the generation of
//! the attempt that produced them; anything from an older generation is
//! ignored.

use std::fmt;
use std::time::Duration;

/// Default interval between heartbeat pings.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on the delay between reconnect attempts.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Delay added per consecutive failed attempt.
const RECONNECT_STEP: Duration = Duration::from_secs(1);

/// Lifecycle of the physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What status subscribers are told.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub is_reconnecting: bool,
}

/// Full snapshot of the session, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    pub reconnect_attempts: u32,
    pub state: ConnectionState,
}

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Close code 1000.
    Clean,
    /// Any other code, no close frame, or a transport error.
    Abnormal,
}

/// Tunables for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub ping_interval: Duration,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            max_reconnect_attempts: None,
        }
    }
}

/// Delay before reconnect attempt number `attempt` (1-based).
pub fn reconnect_delay(attempt: u32) -> Duration {
    RECONNECT_STEP.saturating_mul(attempt).min(MAX_RECONNECT_DELAY)
}

#[derive(Debug, Clone)]
pub struct SessionState {
    state: ConnectionState,
    generation: u64,
    reconnect_attempts: u32,
    should_reconnect: bool,
    is_reconnecting: bool,
    options: SessionOptions,
    published: ConnectionStatus,
}

impl SessionState {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: ConnectionState::Idle,
            generation: 0,
            reconnect_attempts: 0,
            should_reconnect: true,
            is_reconnecting: false,
            options,
            published: ConnectionStatus::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Adopt new options. A changed ping interval applies from the next open.
    pub fn configure(&mut self, options: SessionOptions) {
        self.options = options;
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.is_open(),
            is_reconnecting: self.is_reconnecting,
        }
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            is_connected: self.is_open(),
            is_reconnecting: self.is_reconnecting,
            reconnect_attempts: self.reconnect_attempts,
            state: self.state,
        }
    }

    /// The status, if it differs from the last one handed out.
    pub fn take_status_change(&mut self) -> Option<ConnectionStatus> {
        let status = self.status();
        if status == self.published {
            None
        } else {
            self.published = status;
            Some(status)
        }
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Start a new attempt, returning its generation.
    ///
    /// Returns `None` while an attempt is already in flight or open.
    pub fn begin_connect(&mut self) -> Option<u64> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => None,
            _ => {
                self.generation += 1;
                self.state = ConnectionState::Connecting;
                Some(self.generation)
            }
        }
    }

    /// The attempt `generation` produced a live connection.
    pub fn on_open(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.is_reconnecting = false;
        true
    }

    /// The connection of `generation` ended. Returns the reconnect delay if
    /// one should be scheduled.
    pub fn on_close(&mut self, generation: u64, kind: CloseKind) -> Option<Duration> {
        if !self.is_current(generation) || !self.is_active() {
            return None;
        }
        self.state = ConnectionState::Closed;
        match kind {
            CloseKind::Clean => {
                self.is_reconnecting = false;
                None
            }
            CloseKind::Abnormal => self.schedule_reconnect(),
        }
    }

    /// The attempt `generation` never opened.
    pub fn on_connect_failed(&mut self, generation: u64) -> Option<Duration> {
        if !self.is_current(generation) || self.state != ConnectionState::Connecting {
            return None;
        }
        self.state = ConnectionState::Closed;
        self.schedule_reconnect()
    }

    /// A reconnect timer armed after `generation` closed has fired.
    pub fn reconnect_due(&self, generation: u64) -> bool {
        self.is_current(generation)
            && self.should_reconnect
            && matches!(self.state, ConnectionState::Closed | ConnectionState::Idle)
    }

    pub fn stop_reconnecting(&mut self) {
        self.should_reconnect = false;
        self.is_reconnecting = false;
    }

    pub fn start_reconnecting(&mut self) {
        self.should_reconnect = true;
        self.reconnect_attempts = 0;
    }

    /// Begin a deliberate shutdown. No reconnect follows.
    pub fn begin_close(&mut self) {
        self.stop_reconnecting();
        if self.is_active() {
            self.state = ConnectionState::Closing;
        }
    }

    /// The connection was torn down locally.
    pub fn closed(&mut self) {
        self.state = ConnectionState::Closed;
    }

    fn is_active(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closing
        )
    }

    fn schedule_reconnect(&mut self) -> Option<Duration> {
        if !self.should_reconnect {
            self.is_reconnecting = false;
            return None;
        }

        if let Some(max) = self.options.max_reconnect_attempts {
            if self.reconnect_attempts >= max {
                tracing::warn!("Giving up after {} reconnect attempts", self.reconnect_attempts);
                self.stop_reconnecting();
                return None;
            }
        }

        self.reconnect_attempts += 1;
        self.is_reconnecting = true;
        Some(reconnect_delay(self.reconnect_attempts))
    }
}
