//! Data models and per-core aggregation.
//!
//! This module turns the frames the router delivers into bounded per-core
//! state that readers can query at any time.
//!
//! ## Submodules
//!
//! - [`aggregator`]: Per-core state, liveness inference and inventory reconciliation
//! - [`duration`]: Parsing and formatting of duration strings (e.g., "1s", "500ms")
//! - [`history`]: Historical tracking for sparklines and rate calculations
//! - [`log`]: Log entries, placeholder substitution and filters
//! - [`metrics`]: The metrics snapshot a core reports, and [`HealthStatus`]
//! - [`ring`]: Fixed-capacity ring buffer backing each core's logs
//! - [`source`]: Core registrations from the inventory
//!
//! ## Data Flow
//!
//! ```text
//! Frame::MetricsUpdate ──▶ Aggregator::apply() ──┬──▶ latest metrics, liveness
//!                                                 └──▶ History::record()
//! Frame::LogBatch ───────▶ LogEntry::decode_line() ──▶ Ring<LogEntry>
//!
//! sweep timer ───────────▶ Aggregator::sweep() (stale cores lose liveness)
//! inventory ─────────────▶ Aggregator::reconcile()
//! ```

pub mod aggregator;
pub mod duration;
pub mod history;
pub mod log;
pub mod metrics;
pub mod ring;
pub mod source;

pub use aggregator::{
    Aggregator, AggregatorHandle, AggregatorOptions, Attachment, ReconcileReport, SourceState,
    SourceSummary, DEFAULT_STALE_FACTOR, DEFAULT_SWEEP_INTERVAL,
};
pub use history::History;
pub use log::{LogEntry, LogFilter, LogLevel};
pub use metrics::{HealthIssue, HealthStatus, Metrics, ThreadsDetail};
pub use ring::Ring;
pub use source::SourceRegistration;
