//! Metrics reported by a core and the health model derived from them.
//!
//! The wire shape mirrors what a Multitasking core's monitor endpoint
//! serializes. Go encodes empty slices as `null`, so every list field
//! accepts `null` as an empty list.

use serde::{Deserialize, Deserializer, Serialize};

/// Per-thread status and completed-task counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadsDetail {
    /// One entry per worker thread; `1` means working, anything else idle.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub threads_status: Vec<i64>,
    /// Tasks completed by each worker thread.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub threads_count: Vec<u64>,
}

/// A problem the core's own health check flagged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthIssue {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Alerting issues need operator attention.
    #[serde(default)]
    pub alert: bool,
    /// The thread concerned, or `-1` for core-wide issues.
    #[serde(default = "no_thread")]
    pub thread_id: i64,
    /// Issue category, e.g. "thread-blocking" or "core-health-issue".
    #[serde(rename = "type", default)]
    pub kind: String,
}

fn no_thread() -> i64 {
    -1
}

/// One metrics snapshot for a core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub name: String,
    pub total_task: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_retry: Option<u64>,
    pub total_result: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_size: Option<u64>,
    pub threads_detail: ThreadsDetail,
    /// Results per second over the last reporting interval.
    pub speed: f64,
    pub idle: u64,
    pub working: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub threads_working_times: Vec<u64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub health_issues: Vec<HealthIssue>,
    /// The interval the core reports on. Informational only; staleness is
    /// judged against the inventory interval.
    #[serde(default)]
    pub interval: String,
}

impl Metrics {
    /// Number of worker threads in the pool.
    pub fn thread_count(&self) -> usize {
        self.threads_detail.threads_status.len()
    }

    /// Fraction of threads currently working, in `0.0..=1.0`.
    ///
    /// Returns `None` for a pool with no threads.
    pub fn usage_rate(&self) -> Option<f64> {
        let threads = self.thread_count();
        if threads == 0 {
            None
        } else {
            Some(self.working as f64 / threads as f64)
        }
    }

    /// Health derived from the reported issues.
    pub fn health(&self) -> HealthStatus {
        self.health_issues
            .iter()
            .map(|issue| {
                if issue.alert {
                    HealthStatus::Critical
                } else {
                    HealthStatus::Warning
                }
            })
            .max()
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Issues flagged as alerts.
    pub fn alerts(&self) -> impl Iterator<Item = &HealthIssue> {
        self.health_issues.iter().filter(|issue| issue.alert)
    }
}

/// Health status for a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "OK",
            HealthStatus::Warning => "WARN",
            HealthStatus::Critical => "CRIT",
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
pub(crate) fn sample_metrics(name: &str) -> Metrics {
    Metrics {
        name: name.to_string(),
        total_task: 120,
        total_retry: Some(2),
        total_result: 100,
        retry_size: None,
        threads_detail: ThreadsDetail {
            threads_status: vec![1, 1, 0, 0],
            threads_count: vec![30, 30, 20, 20],
        },
        speed: 12.5,
        idle: 2,
        working: 2,
        threads_working_times: vec![0, 1, 0, 0],
        health_issues: Vec::new(),
        interval: "1s".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_metrics() {
        let json = r#"{
            "name": "alpha",
            "total_task": 10,
            "total_result": 8,
            "retry_size": 3,
            "threads_detail": {"threads_status": [1, 0], "threads_count": [5, 3]},
            "speed": 1.5,
            "idle": 1,
            "working": 1,
            "threads_working_times": [2, 0],
            "health_issues": [
                {"title": "线程阻塞", "description": "stuck", "alert": false, "thread_id": 0, "type": "thread-blocking"}
            ],
            "interval": "1s"
        }"#;

        let metrics: Metrics = serde_json::from_str(json).unwrap();
        assert_eq!(metrics.total_task, 10);
        assert_eq!(metrics.total_retry, None);
        assert_eq!(metrics.retry_size, Some(3));
        assert_eq!(metrics.thread_count(), 2);
        assert_eq!(metrics.health_issues[0].kind, "thread-blocking");
        assert_eq!(metrics.health(), HealthStatus::Warning);
    }

    #[test]
    fn test_null_lists_are_empty() {
        let json = r#"{
            "total_task": 0,
            "total_result": 0,
            "threads_detail": {"threads_status": null, "threads_count": null},
            "speed": 0,
            "idle": 0,
            "working": 0,
            "threads_working_times": null,
            "health_issues": null
        }"#;

        let metrics: Metrics = serde_json::from_str(json).unwrap();
        assert!(metrics.health_issues.is_empty());
        assert_eq!(metrics.thread_count(), 0);
        assert_eq!(metrics.usage_rate(), None);
        assert_eq!(metrics.health(), HealthStatus::Healthy);
    }

    #[test]
    fn test_alert_is_critical() {
        let mut metrics = sample_metrics("alpha");
        metrics.health_issues.push(HealthIssue {
            title: "No Threads Working".to_string(),
            description: String::new(),
            alert: true,
            thread_id: -1,
            kind: "core-health-issue".to_string(),
        });
        assert_eq!(metrics.health(), HealthStatus::Critical);
        assert_eq!(metrics.health().symbol(), "CRIT");
        assert_eq!(metrics.alerts().count(), 1);
    }

    #[test]
    fn test_usage_rate() {
        let metrics = sample_metrics("alpha");
        assert_eq!(metrics.usage_rate(), Some(0.5));
    }

    #[test]
    fn test_missing_required_field_fails() {
        let json = r#"{"total_task": 1}"#;
        assert!(serde_json::from_str::<Metrics>(json).is_err());
    }
}
