//! Command queue metrics.
//!
//! Per-operation latency and outcome counters plus queue-wide recovery
//! counters (BUSY retries, timeouts, cancels). Everything is lock-free so
//! the worker can record without contending with readers.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// Snapshot of one operation's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Calls completed, successful or not.
    pub count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Sum of end-to-end durations, retries and cancels included.
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: Option<f64>,
}

/// Atomic counters for one operation.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a call that returned a value.
    pub fn record_success(&self, duration: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    /// Record a call that surfaced an error.
    pub fn record_failure(&self, duration: Duration) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    fn record(&self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let total_duration_ms = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);
        let max = self.max_duration_ms.load(Ordering::Relaxed);

        OperationMetrics {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            total_duration_ms,
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then_some(max),
            avg_duration_ms: (count > 0).then(|| total_duration_ms as f64 / count as f64),
        }
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.success_count.store(0, Ordering::Relaxed);
        self.failure_count.store(0, Ordering::Relaxed);
        self.total_duration_ms.store(0, Ordering::Relaxed);
        self.min_duration_ms.store(u64::MAX, Ordering::Relaxed);
        self.max_duration_ms.store(0, Ordering::Relaxed);
    }
}

/// Serializable view of [`QueueMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueMetricsSnapshot {
    /// Operations that ran at least once, keyed by bridge name.
    pub operations: BTreeMap<String, OperationMetrics>,
    pub busy_retries: u64,
    pub timeouts: u64,
    pub cancels_issued: u64,
    pub cancel_failures: u64,
}

impl QueueMetricsSnapshot {
    /// Calls completed across all operations.
    pub fn total_calls(&self) -> u64 {
        self.operations.values().map(|m| m.count).sum()
    }

    /// Fraction of completed calls that failed, 0.0 when idle.
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        let failures: u64 = self.operations.values().map(|m| m.failure_count).sum();
        failures as f64 / total as f64
    }
}

/// Counters owned by a [`crate::CommandQueue`].
#[derive(Debug)]
pub struct QueueMetrics {
    operations: Vec<AtomicOperationMetrics>,
    busy_retries: AtomicU64,
    timeouts: AtomicU64,
    cancels_issued: AtomicU64,
    cancel_failures: AtomicU64,
}

impl Default for QueueMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self {
            operations: Operation::ALL
                .iter()
                .map(|_| AtomicOperationMetrics::new())
                .collect(),
            busy_retries: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            cancels_issued: AtomicU64::new(0),
            cancel_failures: AtomicU64::new(0),
        }
    }

    /// Counters of one operation.
    pub fn operation(&self, operation: Operation) -> &AtomicOperationMetrics {
        &self.operations[operation as usize]
    }

    pub(crate) fn record_busy_retry(&self) {
        self.busy_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancel(&self, succeeded: bool) {
        self.cancels_issued.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.cancel_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        let operations = Operation::ALL
            .iter()
            .map(|op| (op.bridge_name().to_string(), self.operation(*op).snapshot()))
            .filter(|(_, m)| m.count > 0)
            .collect();
        QueueMetricsSnapshot {
            operations,
            busy_retries: self.busy_retries.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancels_issued: self.cancels_issued.load(Ordering::Relaxed),
            cancel_failures: self.cancel_failures.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        for metrics in &self.operations {
            metrics.reset();
        }
        self.busy_retries.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.cancels_issued.store(0, Ordering::Relaxed);
        self.cancel_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_metrics_empty() {
        let metrics = AtomicOperationMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.min_duration_ms, None);
        assert_eq!(snapshot.max_duration_ms, None);
        assert_eq!(snapshot.avg_duration_ms, None);
    }

    #[test]
    fn test_operation_metrics_record() {
        let metrics = AtomicOperationMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_success(Duration::from_millis(200));
        metrics.record_failure(Duration::from_millis(5000));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.success_count, 2);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.min_duration_ms, Some(100));
        assert_eq!(snapshot.max_duration_ms, Some(5000));
        assert_eq!(snapshot.total_duration_ms, 5300);
    }

    #[test]
    fn test_queue_metrics_snapshot_skips_idle_operations() {
        let metrics = QueueMetrics::new();
        metrics
            .operation(Operation::GetSleepData)
            .record_success(Duration::from_millis(40));
        metrics
            .operation(Operation::GetBatteryLevel)
            .record_failure(Duration::from_millis(10));
        metrics.record_busy_retry();
        metrics.record_timeout();
        metrics.record_cancel(true);
        metrics.record_cancel(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.operations.len(), 2);
        assert!(snapshot.operations.contains_key("getSleepData"));
        assert_eq!(snapshot.total_calls(), 2);
        assert!((snapshot.failure_rate() - 0.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.busy_retries, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.cancels_issued, 2);
        assert_eq!(snapshot.cancel_failures, 1);
    }

    #[test]
    fn test_queue_metrics_reset() {
        let metrics = QueueMetrics::new();
        metrics
            .operation(Operation::SyncTime)
            .record_success(Duration::from_millis(1));
        metrics.record_timeout();
        metrics.reset();
        assert_eq!(metrics.snapshot(), QueueMetricsSnapshot::default());
    }

    #[test]
    fn test_every_operation_has_a_slot() {
        let metrics = QueueMetrics::new();
        for op in Operation::ALL {
            metrics.operation(op).record_success(Duration::ZERO);
        }
        assert_eq!(metrics.snapshot().operations.len(), Operation::ALL.len());
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = QueueMetrics::new();
        metrics
            .operation(Operation::GetHrvData)
            .record_success(Duration::from_millis(12));
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("getHRVData"));
    }
}
