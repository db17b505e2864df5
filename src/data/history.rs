//! Historical metrics tracking for sparklines and rate calculations.

use std::collections::VecDeque;

use tokio::time::Instant;

use super::metrics::Metrics;

/// Maximum number of historical points to keep per core.
const MAX_HISTORY_SIZE: usize = 60;

/// One recorded metrics sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    /// When the console received the sample.
    pub at: Instant,
    /// Threads working at that moment.
    pub working: u64,
    /// Size of the thread pool.
    pub threads: usize,
    /// Cumulative results the core had produced.
    pub total_result: u64,
}

/// Tracks recent metrics for a single core.
#[derive(Debug, Clone, Default)]
pub struct History {
    points: VecDeque<HistoryPoint>,
}

impl History {
    /// Create a new empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new metrics snapshot
    pub fn record(&mut self, metrics: &Metrics, at: Instant) {
        self.points.push_back(HistoryPoint {
            at,
            working: metrics.working,
            threads: metrics.thread_count(),
            total_result: metrics.total_result,
        });
        if self.points.len() > MAX_HISTORY_SIZE {
            self.points.pop_front();
        }
    }

    pub fn points(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get sparkline data for working threads (normalized to 0-7 for 8 bar levels).
    ///
    /// Returns an empty Vec if there's not enough history.
    pub fn working_sparkline(&self) -> Vec<u8> {
        if self.points.len() < 2 {
            return Vec::new();
        }

        let max = self.points.iter().map(|p| p.working).max().unwrap_or(0).max(1);

        self.points
            .iter()
            .map(|p| {
                let normalized = (p.working as f64 / max as f64 * 7.0) as u8;
                normalized.min(7)
            })
            .collect()
    }

    /// Render the working-threads sparkline with block characters.
    pub fn working_sparkline_text(&self) -> String {
        const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
        self.working_sparkline().into_iter().map(|level| BARS[level as usize]).collect()
    }

    /// Get the rate of change (results per second) between the last two samples.
    ///
    /// Returns None if there's not enough history to calculate a rate.
    pub fn result_rate(&self) -> Option<f64> {
        if self.points.len() < 2 {
            return None;
        }

        let current = self.points.back()?;
        let previous = self.points.get(self.points.len() - 2)?;
        let delta = current.total_result as i64 - previous.total_result as i64;
        let elapsed = current.at.duration_since(previous.at).as_secs_f64();

        if elapsed > 0.0 {
            Some(delta as f64 / elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::data::metrics::sample_metrics;

    #[test]
    fn test_history_is_bounded() {
        let mut history = History::new();
        let start = Instant::now();
        let metrics = sample_metrics("alpha");

        for i in 0..(MAX_HISTORY_SIZE as u64 + 5) {
            history.record(&metrics, start + Duration::from_secs(i));
        }

        assert_eq!(history.len(), MAX_HISTORY_SIZE);
        assert_eq!(history.points().next().map(|p| p.at), Some(start + Duration::from_secs(5)));
    }

    #[test]
    fn test_result_rate() {
        let mut history = History::new();
        let start = Instant::now();
        let mut metrics = sample_metrics("alpha");

        assert_eq!(history.result_rate(), None);

        metrics.total_result = 100;
        history.record(&metrics, start);
        metrics.total_result = 150;
        history.record(&metrics, start + Duration::from_secs(2));

        assert_eq!(history.result_rate(), Some(25.0));
    }

    #[test]
    fn test_working_sparkline() {
        let mut history = History::new();
        let start = Instant::now();
        let mut metrics = sample_metrics("alpha");

        assert!(history.working_sparkline().is_empty());

        for (i, working) in [0u64, 2, 4].into_iter().enumerate() {
            metrics.working = working;
            history.record(&metrics, start + Duration::from_secs(i as u64));
        }

        assert_eq!(history.working_sparkline(), vec![0, 3, 7]);
        assert_eq!(history.working_sparkline_text(), "▁▄█");
    }
}
