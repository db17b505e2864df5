//! Per-core state built from the multiplexed frame stream.
//!
//! The [`Aggregator`] demultiplexes frames by the core name they carry and
//! keeps, for every registered core, the latest metrics snapshot, a bounded
//! log ring, a short metrics history, and a liveness flag. Liveness tracks
//! telemetry receipt, not socket connectivity: a core that stops reporting
//! for longer than `stale_factor` poll intervals is not live even while the
//! connection is healthy.
//!
//! [`AggregatorHandle`] wraps an aggregator for sharing between the router
//! callbacks, the liveness sweep task and readers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::duration::parse_poll_interval;
use super::history::History;
use super::log::{LogEntry, LogFilter};
use super::metrics::{HealthStatus, Metrics};
use super::ring::{Ring, DEFAULT_LOG_CAPACITY};
use super::source::SourceRegistration;
use crate::router::{Frame, Router, Subscription};
use crate::session::ConnectionStatus;

/// How often the liveness sweep runs by default.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Missed poll intervals after which a core is stale.
pub const DEFAULT_STALE_FACTOR: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    pub stale_factor: u32,
    pub log_capacity: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            stale_factor: DEFAULT_STALE_FACTOR,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Everything known about one core.
#[derive(Debug, Clone)]
pub struct SourceState {
    registration: SourceRegistration,
    poll_interval: Duration,
    latest_metrics: Option<Metrics>,
    logs: Ring<LogEntry>,
    last_update_at: Option<Instant>,
    live: bool,
    history: History,
}

impl SourceState {
    fn new(registration: SourceRegistration, log_capacity: usize) -> Self {
        Self {
            poll_interval: registration.poll_interval(),
            registration,
            latest_metrics: None,
            logs: Ring::with_capacity(log_capacity),
            last_update_at: None,
            live: false,
            history: History::new(),
        }
    }

    pub fn registration(&self) -> &SourceRegistration {
        &self.registration
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn latest_metrics(&self) -> Option<&Metrics> {
        self.latest_metrics.as_ref()
    }

    pub fn logs(&self) -> &Ring<LogEntry> {
        &self.logs
    }

    pub fn last_update_at(&self) -> Option<Instant> {
        self.last_update_at
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Whether a metrics update arrived within `factor` poll intervals of `now`.
    fn is_fresh(&self, now: Instant, factor: u32) -> bool {
        match self.last_update_at {
            Some(at) => {
                now.saturating_duration_since(at) <= self.poll_interval.saturating_mul(factor)
            }
            None => false,
        }
    }

    fn adopt(&mut self, registration: SourceRegistration) {
        if registration.interval != self.registration.interval {
            self.poll_interval = parse_poll_interval(&registration.interval);
        }
        self.registration = registration;
    }
}

/// Outcome of reconciling against an inventory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Cores whose address or interval changed.
    pub updated: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// One line of the console report.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSummary {
    pub name: String,
    pub address: String,
    pub poll_interval: Duration,
    pub live: bool,
    pub health: Option<HealthStatus>,
    pub working: Option<u64>,
    pub threads: Option<usize>,
    pub usage_rate: Option<f64>,
    pub speed: Option<f64>,
    pub total_result: Option<u64>,
    pub result_rate: Option<f64>,
    pub sparkline: String,
    pub log_count: usize,
    /// Time since the last metrics update.
    pub age: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    sources: BTreeMap<String, SourceState>,
    options: AggregatorOptions,
}

impl Aggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self {
            sources: BTreeMap::new(),
            options,
        }
    }

    pub fn options(&self) -> AggregatorOptions {
        self.options
    }

    /// Apply one frame. Returns `false` if it touched no core.
    ///
    /// A core not in the inventory is tracked from its first frame, with a
    /// placeholder registration, until the next reconcile drops it.
    pub fn apply(&mut self, frame: &Frame, now: Instant) -> bool {
        match frame {
            Frame::MetricsUpdate { source, metrics } => {
                let state = self.upsert(source);
                state.history.record(metrics, now);
                state.latest_metrics = Some((**metrics).clone());
                state.last_update_at = Some(now);
                if !state.live {
                    tracing::info!("Core {} is live", source);
                }
                state.live = true;
                true
            }
            Frame::LogBatch { source, lines } => {
                let state = self.upsert(source);
                state.logs.extend(lines.iter().map(|line| LogEntry::decode_line(line)));
                true
            }
            Frame::Unknown { kind, .. } => {
                tracing::debug!("Ignoring {} frame", kind);
                false
            }
            Frame::Heartbeat => false,
        }
    }

    fn upsert(&mut self, name: &str) -> &mut SourceState {
        let log_capacity = self.options.log_capacity;
        self.sources.entry(name.to_string()).or_insert_with(|| {
            tracing::info!("Tracking unlisted core {}", name);
            SourceState::new(SourceRegistration::discovered(name), log_capacity)
        })
    }

    /// Mark every core that has gone quiet as not live. Returns their names.
    pub fn sweep(&mut self, now: Instant) -> Vec<String> {
        let factor = self.options.stale_factor;
        let mut stale = Vec::new();
        for (name, state) in self.sources.iter_mut() {
            if state.live && !state.is_fresh(now, factor) {
                state.live = false;
                tracing::warn!(
                    "Core {} is stale: no metrics for over {:?}",
                    name,
                    state.poll_interval.saturating_mul(factor)
                );
                stale.push(name.clone());
            }
        }
        stale
    }

    /// A lost transport means no core is live until it reports again.
    pub fn on_transport_status(&mut self, status: ConnectionStatus) {
        if status.is_connected {
            return;
        }
        let mut cleared = 0;
        for state in self.sources.values_mut() {
            if state.live {
                state.live = false;
                cleared += 1;
            }
        }
        if cleared > 0 {
            tracing::info!("Transport disconnected, {} cores marked not live", cleared);
        }
    }

    /// Register a core, or adopt a changed registration. Returns `true` if new.
    pub fn register(&mut self, registration: SourceRegistration) -> bool {
        match self.sources.get_mut(&registration.name) {
            Some(state) => {
                state.adopt(registration);
                false
            }
            None => {
                let name = registration.name.clone();
                let state = SourceState::new(registration, self.options.log_capacity);
                self.sources.insert(name, state);
                true
            }
        }
    }

    /// Drop a core and everything buffered for it.
    pub fn remove(&mut self, name: &str) -> bool {
        self.sources.remove(name).is_some()
    }

    /// Make the registered cores match `inventory` exactly.
    ///
    /// Cores that stay keep their buffers. A name listed twice takes the
    /// last entry.
    pub fn reconcile(&mut self, inventory: &[SourceRegistration]) -> ReconcileReport {
        let wanted: BTreeMap<&str, &SourceRegistration> = inventory
            .iter()
            .map(|registration| (registration.name.as_str(), registration))
            .collect();

        let mut report = ReconcileReport::default();

        let gone: BTreeSet<String> = self
            .sources
            .keys()
            .filter(|name| !wanted.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in gone {
            self.sources.remove(&name);
            report.removed.push(name);
        }

        for (name, registration) in wanted {
            match self.sources.get_mut(name) {
                Some(state) if state.registration == *registration => {}
                Some(state) => {
                    state.adopt(registration.clone());
                    report.updated.push(name.to_string());
                }
                None => {
                    let state = SourceState::new(registration.clone(), self.options.log_capacity);
                    self.sources.insert(name.to_string(), state);
                    report.added.push(name.to_string());
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                "Inventory reconciled: {} added, {} removed, {} updated",
                report.added.len(),
                report.removed.len(),
                report.updated.len()
            );
        }
        report
    }

    pub fn source(&self, name: &str) -> Option<&SourceState> {
        self.sources.get(name)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn latest_metrics_for(&self, name: &str) -> Option<&Metrics> {
        self.sources.get(name)?.latest_metrics.as_ref()
    }

    /// Buffered log entries for a core, oldest first.
    pub fn logs_for(&self, name: &str) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.sources
            .get(name)
            .into_iter()
            .flat_map(|state| state.logs.iter())
    }

    pub fn filtered_logs_for<'a>(
        &'a self,
        name: &str,
        filter: &'a LogFilter,
    ) -> impl Iterator<Item = &'a LogEntry> {
        self.logs_for(name).filter(move |entry| filter.matches(entry))
    }

    pub fn poll_interval_for(&self, name: &str) -> Option<Duration> {
        self.sources.get(name).map(|state| state.poll_interval)
    }

    /// Live as of `now`, even if the sweep has not run since the core went quiet.
    pub fn is_live(&self, name: &str, now: Instant) -> bool {
        self.sources
            .get(name)
            .is_some_and(|state| state.live && state.is_fresh(now, self.options.stale_factor))
    }

    pub fn history_for(&self, name: &str) -> Option<&History> {
        self.sources.get(name).map(|state| &state.history)
    }

    pub fn summaries(&self, now: Instant) -> Vec<SourceSummary> {
        self.sources
            .iter()
            .map(|(name, state)| {
                let metrics = state.latest_metrics.as_ref();
                SourceSummary {
                    name: name.clone(),
                    address: state.registration.address(),
                    poll_interval: state.poll_interval,
                    live: self.is_live(name, now),
                    health: metrics.map(Metrics::health),
                    working: metrics.map(|m| m.working),
                    threads: metrics.map(Metrics::thread_count),
                    usage_rate: metrics.and_then(Metrics::usage_rate),
                    speed: metrics.map(|m| m.speed),
                    total_result: metrics.map(|m| m.total_result),
                    result_rate: state.history.result_rate(),
                    sparkline: state.history.working_sparkline_text(),
                    log_count: state.logs.len(),
                    age: state
                        .last_update_at
                        .map(|at| now.saturating_duration_since(at)),
                }
            })
            .collect()
    }
}

/// Shared, lockable aggregator. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct AggregatorHandle {
    inner: Arc<RwLock<Aggregator>>,
}

/// Keeps an aggregator fed from a router.
///
/// Dropping it unsubscribes and stops the liveness sweep.
#[must_use = "dropping an Attachment detaches the aggregator"]
#[derive(Debug)]
pub struct Attachment {
    _data: Subscription,
    _status: Subscription,
    sweeper: JoinHandle<()>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

impl AggregatorHandle {
    pub fn new(options: AggregatorOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Aggregator::new(options))),
        }
    }

    /// Subscribe to `router` and start sweeping every `sweep_interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn attach(&self, router: &Router, sweep_interval: Duration) -> Attachment {
        let inner = self.inner.clone();
        let data = router.subscribe(move |frame: &Frame| {
            inner.write().apply(frame, Instant::now());
        });

        let inner = self.inner.clone();
        let status = router.subscribe_to_connection_status(move |status| {
            inner.write().on_transport_status(status);
        });

        let every = sweep_interval.max(Duration::from_millis(1));
        let inner = Arc::downgrade(&self.inner);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                let Some(aggregator) = inner.upgrade() else {
                    return;
                };
                aggregator.write().sweep(Instant::now());
            }
        });

        Attachment {
            _data: data,
            _status: status,
            sweeper,
        }
    }

    pub fn apply(&self, frame: &Frame) -> bool {
        self.inner.write().apply(frame, Instant::now())
    }

    pub fn sweep(&self) -> Vec<String> {
        self.inner.write().sweep(Instant::now())
    }

    pub fn register(&self, registration: SourceRegistration) -> bool {
        self.inner.write().register(registration)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.inner.write().remove(name)
    }

    pub fn reconcile(&self, inventory: &[SourceRegistration]) -> ReconcileReport {
        self.inner.write().reconcile(inventory)
    }

    pub fn source_names(&self) -> Vec<String> {
        self.inner.read().source_names().map(str::to_string).collect()
    }

    pub fn latest_metrics_for(&self, name: &str) -> Option<Metrics> {
        self.inner.read().latest_metrics_for(name).cloned()
    }

    pub fn logs_for(&self, name: &str) -> Vec<LogEntry> {
        self.inner.read().logs_for(name).cloned().collect()
    }

    /// The newest `n` entries, oldest first.
    pub fn tail_logs_for(&self, name: &str, n: usize) -> Vec<LogEntry> {
        let inner = self.inner.read();
        let mut tail: Vec<LogEntry> = inner.logs_for(name).rev().take(n).cloned().collect();
        tail.reverse();
        tail
    }

    pub fn filtered_logs_for(&self, name: &str, filter: &LogFilter) -> Vec<LogEntry> {
        self.inner
            .read()
            .filtered_logs_for(name, filter)
            .cloned()
            .collect()
    }

    pub fn poll_interval_for(&self, name: &str) -> Option<Duration> {
        self.inner.read().poll_interval_for(name)
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.inner.read().is_live(name, Instant::now())
    }

    pub fn history_for(&self, name: &str) -> Option<History> {
        self.inner.read().history_for(name).cloned()
    }

    pub fn summaries(&self) -> Vec<SourceSummary> {
        self.inner.read().summaries(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::duration::DEFAULT_POLL_INTERVAL;
    use crate::data::log::LogLevel;
    use crate::data::metrics::sample_metrics;
    use crate::session::testing::{settle, TestConnector};
    use crate::session::{CloseKind, SessionOptions};

    fn aggregator_with(names: &[&str]) -> Aggregator {
        let mut aggregator = Aggregator::new(AggregatorOptions::default());
        for name in names {
            aggregator.register(SourceRegistration::new(*name, "127.0.0.1", 50051, "1s"));
        }
        aggregator
    }

    fn metrics_frame(source: &str) -> Frame {
        Frame::MetricsUpdate {
            source: source.to_string(),
            metrics: Box::new(sample_metrics(source)),
        }
    }

    fn log_frame(source: &str, lines: &[&str]) -> Frame {
        Frame::LogBatch {
            source: source.to_string(),
            lines: lines.iter().map(|line| line.to_string()).collect(),
        }
    }

    #[test]
    fn test_liveness_window() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let t0 = Instant::now();

        assert!(!aggregator.is_live("alpha", t0));
        aggregator.apply(&metrics_frame("alpha"), t0);

        assert!(aggregator.is_live("alpha", t0 + Duration::from_millis(2900)));
        assert!(aggregator.is_live("alpha", t0 + Duration::from_secs(3)));
        assert!(!aggregator.is_live("alpha", t0 + Duration::from_millis(3500)));
        assert!(!aggregator.is_live("nobody", t0));
    }

    #[test]
    fn test_sweep_marks_stale() {
        let mut aggregator = aggregator_with(&["alpha", "beta"]);
        let t0 = Instant::now();
        aggregator.apply(&metrics_frame("alpha"), t0);
        aggregator.apply(&metrics_frame("beta"), t0 + Duration::from_secs(2));

        assert!(aggregator.sweep(t0 + Duration::from_secs(2)).is_empty());
        assert_eq!(aggregator.sweep(t0 + Duration::from_secs(4)), vec!["alpha".to_string()]);
        assert!(aggregator.sweep(t0 + Duration::from_secs(4)).is_empty());

        // A fresh update restores liveness.
        aggregator.apply(&metrics_frame("alpha"), t0 + Duration::from_secs(5));
        assert!(aggregator.is_live("alpha", t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_stale_factor_scales_with_interval() {
        let mut aggregator = Aggregator::new(AggregatorOptions::default());
        aggregator.register(SourceRegistration::new("slow", "h", 1, "10s"));
        let t0 = Instant::now();
        aggregator.apply(&metrics_frame("slow"), t0);

        assert!(aggregator.is_live("slow", t0 + Duration::from_secs(29)));
        assert!(!aggregator.is_live("slow", t0 + Duration::from_secs(31)));
    }

    #[test]
    fn test_metrics_update() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let t0 = Instant::now();

        assert!(aggregator.apply(&metrics_frame("alpha"), t0));
        assert_eq!(aggregator.latest_metrics_for("alpha"), Some(&sample_metrics("alpha")));
        assert_eq!(aggregator.history_for("alpha").map(History::len), Some(1));
        assert_eq!(aggregator.source("alpha").and_then(SourceState::last_update_at), Some(t0));
    }

    #[test]
    fn test_metrics_for_unlisted_core() {
        let mut aggregator = Aggregator::new(AggregatorOptions::default());
        let now = Instant::now();

        assert!(aggregator.apply(&metrics_frame("alpha"), now));
        assert_eq!(aggregator.latest_metrics_for("alpha"), Some(&sample_metrics("alpha")));
        assert!(aggregator.is_live("alpha", now));
        assert_eq!(aggregator.poll_interval_for("alpha"), Some(DEFAULT_POLL_INTERVAL));
        assert!(aggregator
            .source("alpha")
            .is_some_and(|state| state.registration().is_discovered()));
    }

    #[test]
    fn test_logs_for_unlisted_core() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let now = Instant::now();

        assert!(aggregator.apply(&log_frame("ghost", &["x"]), now));
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.logs_for("ghost").count(), 1);
        assert!(!aggregator.is_live("ghost", now));
    }

    #[test]
    fn test_reconcile_drops_or_adopts_unlisted_cores() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let now = Instant::now();
        aggregator.apply(&metrics_frame("ghost"), now);
        aggregator.apply(&metrics_frame("late"), now);

        let report = aggregator.reconcile(&[
            SourceRegistration::new("alpha", "127.0.0.1", 50051, "1s"),
            SourceRegistration::new("late", "10.0.0.4", 50053, "2s"),
        ]);

        assert_eq!(report.removed, vec!["ghost".to_string()]);
        assert_eq!(report.updated, vec!["late".to_string()]);
        assert!(aggregator.source("ghost").is_none());
        assert!(aggregator.latest_metrics_for("late").is_some());
        assert_eq!(aggregator.poll_interval_for("late"), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_log_batch_with_malformed_lines() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let lines = [
            r#"{"time":"t1","level":"INFO","message":"one"}"#,
            "garbage",
            r#"{"level":"INFO"}"#,
            r#"{"timestamp":"t2","level":"ERROR","message":"two","thread_id":1}"#,
        ];

        aggregator.apply(&log_frame("alpha", &lines), Instant::now());

        let logs: Vec<_> = aggregator.logs_for("alpha").collect();
        assert_eq!(logs.len(), 4);
        assert_eq!(logs[0].message, "one");
        assert_eq!(logs[1].message, "Log parsing failed");
        assert_eq!(logs[2].message, "Invalid log format");
        assert_eq!(logs[3].message, "two");
        // Logs do not count as a metrics update.
        assert!(!aggregator.is_live("alpha", Instant::now()));
    }

    #[test]
    fn test_log_ring_evicts_oldest() {
        let mut aggregator = aggregator_with(&["alpha"]);
        let lines: Vec<String> = (0..=1000)
            .map(|i| json!({"time": "t", "level": "DEBUG", "message": i.to_string()}).to_string())
            .collect();
        let frame = Frame::LogBatch {
            source: "alpha".to_string(),
            lines,
        };

        aggregator.apply(&frame, Instant::now());

        let logs: Vec<_> = aggregator.logs_for("alpha").collect();
        assert_eq!(logs.len(), DEFAULT_LOG_CAPACITY);
        assert_eq!(logs[0].message, "1");
        assert_eq!(logs[999].message, "1000");
    }

    #[test]
    fn test_filtered_logs() {
        let mut aggregator = aggregator_with(&["alpha"]);
        aggregator.apply(
            &log_frame(
                "alpha",
                &[
                    r#"{"time":"t","level":"INFO","message":"worker started","thread_id":0}"#,
                    r#"{"time":"t","level":"ERROR","message":"Worker crashed","thread_id":1}"#,
                    r#"{"time":"t","level":"ERROR","message":"disk full","thread_id":1}"#,
                ],
            ),
            Instant::now(),
        );

        let filter = LogFilter {
            level: Some(LogLevel::Error),
            text: Some("worker".to_string()),
            thread_id: None,
        };
        let hits: Vec<_> = aggregator.filtered_logs_for("alpha", &filter).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message, "Worker crashed");
        assert_eq!(aggregator.filtered_logs_for("nobody", &filter).count(), 0);
    }

    #[test]
    fn test_transport_loss_clears_liveness() {
        let mut aggregator = aggregator_with(&["alpha", "beta"]);
        let now = Instant::now();
        aggregator.apply(&metrics_frame("alpha"), now);
        aggregator.apply(&metrics_frame("beta"), now);

        aggregator.on_transport_status(ConnectionStatus {
            is_connected: true,
            is_reconnecting: false,
        });
        assert!(aggregator.is_live("alpha", now));

        aggregator.on_transport_status(ConnectionStatus {
            is_connected: false,
            is_reconnecting: true,
        });
        assert!(!aggregator.is_live("alpha", now));
        assert!(!aggregator.is_live("beta", now));

        aggregator.apply(&metrics_frame("beta"), now);
        assert!(!aggregator.is_live("alpha", now));
        assert!(aggregator.is_live("beta", now));
    }

    #[test]
    fn test_reconcile() {
        let mut aggregator = aggregator_with(&["alpha", "beta"]);
        let now = Instant::now();
        aggregator.apply(&log_frame("alpha", &["x"]), now);
        aggregator.apply(&metrics_frame("alpha"), now);

        let inventory = vec![
            SourceRegistration::new("alpha", "127.0.0.1", 50051, "2s"),
            SourceRegistration::new("gamma", "10.0.0.9", 50060, "1s"),
        ];
        let report = aggregator.reconcile(&inventory);

        assert_eq!(report.added, vec!["gamma".to_string()]);
        assert_eq!(report.removed, vec!["beta".to_string()]);
        assert_eq!(report.updated, vec!["alpha".to_string()]);

        assert_eq!(aggregator.logs_for("alpha").count(), 1);
        assert!(aggregator.latest_metrics_for("alpha").is_some());
        assert_eq!(aggregator.poll_interval_for("alpha"), Some(Duration::from_secs(2)));
        assert_eq!(aggregator.poll_interval_for("beta"), None);
        assert_eq!(aggregator.logs_for("beta").count(), 0);
        assert!(aggregator.latest_metrics_for("gamma").is_none());

        assert!(aggregator.reconcile(&inventory).is_empty());
    }

    #[test]
    fn test_summaries() {
        let mut aggregator = aggregator_with(&["alpha", "idle"]);
        let t0 = Instant::now();
        aggregator.apply(&metrics_frame("alpha"), t0);
        let mut later = sample_metrics("alpha");
        later.total_result = 110;
        aggregator.apply(
            &Frame::MetricsUpdate {
                source: "alpha".to_string(),
                metrics: Box::new(later),
            },
            t0 + Duration::from_secs(1),
        );

        let summaries = aggregator.summaries(t0 + Duration::from_secs(1));
        assert_eq!(summaries.len(), 2);

        let alpha = &summaries[0];
        assert_eq!(alpha.name, "alpha");
        assert!(alpha.live);
        assert_eq!(alpha.health, Some(HealthStatus::Healthy));
        assert_eq!(alpha.usage_rate, Some(0.5));
        assert_eq!(alpha.result_rate, Some(10.0));
        assert_eq!(alpha.age, Some(Duration::ZERO));

        let idle = &summaries[1];
        assert!(!idle.live);
        assert_eq!(idle.health, None);
        assert_eq!(idle.age, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attached_aggregator_follows_router() {
        let (connector, mut peers) = TestConnector::new();
        let router = Router::spawn("ws://test/ws", SessionOptions::default(), connector);
        let aggregator = AggregatorHandle::new(AggregatorOptions::default());
        aggregator.register(SourceRegistration::new("alpha", "127.0.0.1", 50051, "1s"));
        let _attachment = aggregator.attach(&router, Duration::from_secs(5));

        router.connect();
        settle().await;
        let peer = peers.recv().await.unwrap();

        peer.send_json(json!({"type": "metrics", "name": "alpha", "data": sample_metrics("alpha")}));
        peer.send_json(json!({"type": "events", "name": "alpha", "data": {"logs": ["oops"]}}));
        settle().await;
        assert!(aggregator.is_live("alpha"));
        assert_eq!(aggregator.logs_for("alpha").len(), 1);

        // An undecodable snapshot leaves the last good one in place.
        peer.send_json(json!({"type": "metrics", "name": "alpha", "data": {"speed": "fast"}}));
        settle().await;
        assert_eq!(aggregator.latest_metrics_for("alpha"), Some(sample_metrics("alpha")));

        // Quiet for longer than three intervals while still connected.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(router.status().is_connected);
        assert!(!aggregator.is_live("alpha"));
        assert!(!aggregator.summaries()[0].live);

        peer.send_json(json!({"type": "metrics", "name": "alpha", "data": sample_metrics("alpha")}));
        settle().await;
        assert!(aggregator.is_live("alpha"));

        peer.close(CloseKind::Abnormal);
        settle().await;
        assert!(!aggregator.is_live("alpha"));
        assert_eq!(aggregator.tail_logs_for("alpha", 5).len(), 1);
    }
}
