//! # corewatch
//!
//! A live telemetry console for Multitasking worker-pool processes ("cores").
//!
//! Every core reports thread and task metrics plus structured log lines to a
//! monitor server, which multiplexes them over one WebSocket. This crate
//! keeps a single shared connection to that server alive, decodes the
//! stream, and maintains bounded per-core state that consumers can read at
//! any time.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              AppContext                              │
//! │  ┌───────────┐  text   ┌──────────┐  Frame  ┌──────────────────┐     │
//! │  │  session  │────────▶│  router  │────────▶│ data::Aggregator │     │
//! │  │ (connect, │         │ (decode, │         │ (per-core state, │     │
//! │  │ heartbeat,│◀────────│ fan-out) │─status─▶│  liveness)       │     │
//! │  │ backoff)  │  send   └──────────┘         └────────┬─────────┘     │
//! │  └─────┬─────┘                                       │               │
//! │        ▼                                             ▼               │
//! │   Connector ◀── WsConnector | test double    report / readers        │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`session`]**: One physical connection with heartbeat and linear
//!   backoff reconnects, behind the [`Connector`] seam
//! - **[`router`]**: Decodes [`Frame`]s and fans them out to subscribers;
//!   connection status is published separately
//! - **[`data`]**: Metrics and log models, the bounded log ring, history,
//!   and the [`Aggregator`] with liveness inference
//! - **[`context`]**: [`AppContext`], the explicitly constructed owner of
//!   the above, plus inventory refresh
//! - **[`config`]**: TOML + environment configuration
//! - **[`report`]**: Plain-text rendering of aggregator state
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Watch the cores listed in corewatch.toml
//! corewatch --config corewatch.toml
//!
//! # Override the server and print the last 5 log lines per core
//! corewatch --origin http://10.0.0.1:8080 --tail 5
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use corewatch::{AppContext, ConsoleConfig, InventorySource, WsConnector};
//!
//! # tokio_test::block_on(async {
//! let path = PathBuf::from("corewatch.toml");
//! let config = ConsoleConfig::load(&path).unwrap();
//! let inventory = InventorySource::ConfigFile(path);
//! let context = AppContext::start(&config, &inventory, Arc::new(WsConnector)).unwrap();
//!
//! for summary in context.aggregator().summaries() {
//!     println!("{} live={}", summary.name, summary.live);
//! }
//! context.shutdown().await;
//! # });
//! ```

pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod report;
pub mod router;
pub mod session;

// Re-export main types for convenience
pub use config::ConsoleConfig;
pub use context::{AppContext, InventorySource};
pub use data::{
    Aggregator, AggregatorHandle, HealthStatus, LogEntry, LogFilter, LogLevel, Metrics,
    SourceRegistration, SourceSummary,
};
pub use error::{DecodeError, TransportError};
pub use router::{Frame, Router, Subscription};
pub use session::{ConnectionStatus, Connector, SessionOptions, WsConnector};
