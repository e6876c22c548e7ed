//! Metrics collection for tasks and streams.
//!
//! Write-heavy, read-light: each entity's series lives in its own dashmap
//! slot, so recording never takes a cross-entity lock.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One timestamped observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Rolling-window timeseries collector keyed by entity (task or stream id)
/// and metric name, plus aggregate engine counters.
#[derive(Debug)]
pub struct MetricsCollector {
    series: DashMap<String, DashMap<String, VecDeque<Sample>>>,
    window: ChronoDuration,

    // Aggregate counters
    pub tasks_submitted: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_cancelled: AtomicU64,
    total_attempt_ms: AtomicU64,
    attempts: AtomicU64,
}

/// Point-in-time view of the aggregate counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tasks_submitted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub attempts: u64,
    pub avg_attempt_ms: u64,
}

impl MetricsCollector {
    pub fn new(window: Duration) -> Self {
        Self {
            series: DashMap::new(),
            window: ChronoDuration::from_std(window)
                .unwrap_or_else(|_| ChronoDuration::try_hours(1).unwrap()),
            tasks_submitted: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
            total_attempt_ms: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
        }
    }

    /// Record a sample for an entity's metric, pruning anything that has
    /// fallen out of the retention window.
    pub fn record(&self, entity_id: &str, metric: &str, value: f64) {
        self.record_at(entity_id, metric, value, Utc::now());
    }

    fn record_at(&self, entity_id: &str, metric: &str, value: f64, timestamp: DateTime<Utc>) {
        let entity = self
            .series
            .entry(entity_id.to_string())
            .or_insert_with(DashMap::new);
        let mut samples = entity
            .entry(metric.to_string())
            .or_insert_with(VecDeque::new);
        samples.push_back(Sample { timestamp, value });

        let cutoff = timestamp - self.window;
        while samples.front().is_some_and(|s| s.timestamp < cutoff) {
            samples.pop_front();
        }
    }

    /// Latest sample value for an entity's metric, if any survives the window.
    pub fn current(&self, entity_id: &str, metric: &str) -> Option<f64> {
        let entity = self.series.get(entity_id)?;
        let samples = entity.get(metric)?;
        samples.back().map(|s| s.value)
    }

    /// Full retained history for an entity's metric, oldest first.
    pub fn history(&self, entity_id: &str, metric: &str) -> Vec<Sample> {
        self.series
            .get(entity_id)
            .and_then(|entity| entity.get(metric).map(|s| s.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// Drop all series for an entity (called when its task record is evicted).
    pub fn evict(&self, entity_id: &str) {
        self.series.remove(entity_id);
    }

    pub fn record_attempt(&self, duration: Duration) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.total_attempt_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.attempts.load(Ordering::Relaxed);
        let total = self.total_attempt_ms.load(Ordering::Relaxed);
        MetricsSnapshot {
            tasks_submitted: self.tasks_submitted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            tasks_cancelled: self.tasks_cancelled.load(Ordering::Relaxed),
            attempts,
            avg_attempt_ms: if attempts > 0 { total / attempts } else { 0 },
        }
    }
}
