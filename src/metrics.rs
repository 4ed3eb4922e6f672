// Performance metrics module
//
// Counters and latencies shared by the detection pipeline. Every update to a
// group of related fields happens inside one critical section so readers never
// observe a half-applied record.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime};

/// Detection must complete within this many milliseconds.
pub const DETECTION_TARGET_MS: f64 = 500.0;
/// Acceptance must complete within this many milliseconds.
pub const ACCEPTANCE_TARGET_MS: f64 = 2000.0;
pub const MEMORY_TARGET_MB: f64 = 50.0;
pub const CPU_TARGET_PERCENT: f64 = 5.0;
pub const SUCCESS_RATE_TARGET: f64 = 0.95;

#[derive(Debug)]
struct MetricsInner {
    last_detection_latency_ms: f64,
    total_detection_latency_ms: f64,
    detection_samples: u64,

    last_acceptance_latency_ms: f64,
    total_acceptance_latency_ms: f64,
    acceptance_samples: u64,

    last_click_latency_ms: f64,
    clicks_succeeded: u64,
    clicks_failed: u64,

    matches_detected: u64,
    matches_accepted: u64,

    successful_requests: u64,
    failed_requests: u64,
    total_request_latency_ms: f64,

    consecutive_errors: u64,
    total_errors: u64,
    last_error_message: Option<String>,
    last_error_time: Option<SystemTime>,

    memory_usage_mb: f64,
    cpu_usage_percent: f64,

    start_time: Instant,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            last_detection_latency_ms: 0.0,
            total_detection_latency_ms: 0.0,
            detection_samples: 0,
            last_acceptance_latency_ms: 0.0,
            total_acceptance_latency_ms: 0.0,
            acceptance_samples: 0,
            last_click_latency_ms: 0.0,
            clicks_succeeded: 0,
            clicks_failed: 0,
            matches_detected: 0,
            matches_accepted: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_request_latency_ms: 0.0,
            consecutive_errors: 0,
            total_errors: 0,
            last_error_message: None,
            last_error_time: None,
            memory_usage_mb: 0.0,
            cpu_usage_percent: 0.0,
            start_time: Instant::now(),
        }
    }

    fn record_error(&mut self, message: &str) {
        self.consecutive_errors += 1;
        self.total_errors += 1;
        self.last_error_message = Some(message.to_string());
        self.last_error_time = Some(SystemTime::now());
    }
}

/// Point-in-time copy of every metric, for display and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub last_detection_latency_ms: f64,
    pub avg_detection_latency_ms: f64,
    pub last_acceptance_latency_ms: f64,
    pub avg_acceptance_latency_ms: f64,
    pub last_click_latency_ms: f64,
    pub clicks_succeeded: u64,
    pub clicks_failed: u64,
    pub matches_detected: u64,
    pub matches_accepted: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_request_latency_ms: f64,
    pub consecutive_errors: u64,
    pub total_errors: u64,
    pub last_error_message: Option<String>,
    #[serde(skip)]
    pub last_error_time: Option<SystemTime>,
    pub memory_usage_mb: f64,
    pub cpu_usage_percent: f64,
    pub uptime_secs: f64,
}

impl MetricsSnapshot {
    /// Accepted matches over detected matches, 1.0 before any detection.
    pub fn success_rate(&self) -> f64 {
        if self.matches_detected == 0 {
            1.0
        } else {
            self.matches_accepted as f64 / self.matches_detected as f64
        }
    }

    pub fn meets_detection_target(&self) -> bool {
        self.avg_detection_latency_ms < DETECTION_TARGET_MS
    }

    pub fn meets_acceptance_target(&self) -> bool {
        self.avg_acceptance_latency_ms < ACCEPTANCE_TARGET_MS
    }

    pub fn meets_memory_target(&self) -> bool {
        self.memory_usage_mb < MEMORY_TARGET_MB
    }

    pub fn meets_cpu_target(&self) -> bool {
        self.cpu_usage_percent < CPU_TARGET_PERCENT
    }

    pub fn meets_success_rate_target(&self) -> bool {
        self.success_rate() >= SUCCESS_RATE_TARGET
    }

    pub fn meets_performance_targets(&self) -> bool {
        self.meets_detection_target()
            && self.meets_acceptance_target()
            && self.meets_memory_target()
            && self.meets_cpu_target()
            && self.meets_success_rate_target()
    }
}

fn average(total: f64, count: u64) -> f64 {
    if count > 0 { total / count as f64 } else { 0.0 }
}

/// Thread-safe metrics accumulator.
///
/// Shared by `Arc` between the API client, the visual detector, the input
/// synthesizer, the arbitrator and the housekeeping loop.
#[derive(Debug)]
pub struct PerformanceMetrics {
    inner: Mutex<MetricsInner>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsInner::new()),
        }
    }

    pub fn record_detection_latency(&self, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        let mut inner = self.inner.lock();
        inner.last_detection_latency_ms = ms;
        inner.total_detection_latency_ms += ms;
        inner.detection_samples += 1;
    }

    pub fn record_acceptance_latency(&self, latency: Duration) {
        let ms = latency.as_secs_f64() * 1000.0;
        let mut inner = self.inner.lock();
        inner.last_acceptance_latency_ms = ms;
        inner.total_acceptance_latency_ms += ms;
        inner.acceptance_samples += 1;
    }

    /// Record a synthetic click. Failed clicks also count as errors.
    pub fn record_click(&self, latency: Duration, success: bool, error: Option<&str>) {
        let mut inner = self.inner.lock();
        inner.last_click_latency_ms = latency.as_secs_f64() * 1000.0;
        if success {
            inner.clicks_succeeded += 1;
        } else {
            inner.clicks_failed += 1;
            inner.record_error(error.unwrap_or("click failed"));
        }
    }

    pub fn record_match_detected(&self) {
        self.inner.lock().matches_detected += 1;
    }

    /// Record an accepted match; this ends the consecutive error streak.
    pub fn record_match_accepted(&self) {
        let mut inner = self.inner.lock();
        inner.matches_accepted += 1;
        inner.consecutive_errors = 0;
    }

    pub fn record_request_success(&self, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.successful_requests += 1;
        inner.total_request_latency_ms += latency.as_secs_f64() * 1000.0;
    }

    /// A failed request attempt; counted both as a failure and as an error.
    pub fn record_request_failure(&self, message: &str) {
        let mut inner = self.inner.lock();
        inner.failed_requests += 1;
        inner.record_error(message);
    }

    pub fn record_error(&self, message: &str) {
        self.inner.lock().record_error(message);
    }

    pub fn clear_consecutive_errors(&self) {
        self.inner.lock().consecutive_errors = 0;
    }

    pub fn update_resource_usage(&self, memory_mb: f64, cpu_percent: f64) {
        let mut inner = self.inner.lock();
        inner.memory_usage_mb = memory_mb;
        inner.cpu_usage_percent = cpu_percent;
    }

    pub fn failed_requests(&self) -> u64 {
        self.inner.lock().failed_requests
    }

    pub fn consecutive_errors(&self) -> u64 {
        self.inner.lock().consecutive_errors
    }

    pub fn uptime(&self) -> Duration {
        self.inner.lock().start_time.elapsed()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            last_detection_latency_ms: inner.last_detection_latency_ms,
            avg_detection_latency_ms: average(
                inner.total_detection_latency_ms,
                inner.detection_samples,
            ),
            last_acceptance_latency_ms: inner.last_acceptance_latency_ms,
            avg_acceptance_latency_ms: average(
                inner.total_acceptance_latency_ms,
                inner.acceptance_samples,
            ),
            last_click_latency_ms: inner.last_click_latency_ms,
            clicks_succeeded: inner.clicks_succeeded,
            clicks_failed: inner.clicks_failed,
            matches_detected: inner.matches_detected,
            matches_accepted: inner.matches_accepted,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            avg_request_latency_ms: average(
                inner.total_request_latency_ms,
                inner.successful_requests,
            ),
            consecutive_errors: inner.consecutive_errors,
            total_errors: inner.total_errors,
            last_error_message: inner.last_error_message.clone(),
            last_error_time: inner.last_error_time,
            memory_usage_mb: inner.memory_usage_mb,
            cpu_usage_percent: inner.cpu_usage_percent,
            uptime_secs: inner.start_time.elapsed().as_secs_f64(),
        }
    }

    pub fn meets_performance_targets(&self) -> bool {
        self.snapshot().meets_performance_targets()
    }

    /// Zero every counter and restart the uptime clock.
    pub fn reset(&self) {
        *self.inner.lock() = MetricsInner::new();
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!("=== Performance Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", s.uptime_secs);
        tracing::info!(
            "Ready checks: {} detected, {} accepted (success rate {:.1}%)",
            s.matches_detected,
            s.matches_accepted,
            s.success_rate() * 100.0
        );
        tracing::info!(
            "Latency: detection avg {:.1}ms (last {:.1}ms), acceptance avg {:.1}ms (last {:.1}ms)",
            s.avg_detection_latency_ms,
            s.last_detection_latency_ms,
            s.avg_acceptance_latency_ms,
            s.last_acceptance_latency_ms
        );
        tracing::info!(
            "API requests: {} ok, {} failed, avg {:.1}ms",
            s.successful_requests,
            s.failed_requests,
            s.avg_request_latency_ms
        );
        tracing::info!(
            "Clicks: {} ok, {} failed; errors: {} total, {} consecutive",
            s.clicks_succeeded,
            s.clicks_failed,
            s.total_errors,
            s.consecutive_errors
        );
        if !s.meets_performance_targets() {
            tracing::warn!(
                "Performance targets missed (memory {:.1}MB, cpu {:.1}%)",
                s.memory_usage_mb,
                s.cpu_usage_percent
            );
        }
    }

    /// Log periodic metrics (for long-running operations)
    pub fn log_periodic(&self) {
        let s = self.snapshot();
        tracing::info!(
            "Metrics: {} detected, {} accepted, {} failed requests, {:.1}MB, {:.1}% cpu, uptime {:.0}s",
            s.matches_detected,
            s.matches_accepted,
            s.failed_requests,
            s.memory_usage_mb,
            s.cpu_usage_percent,
            s.uptime_secs
        );
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let snapshot = PerformanceMetrics::new().snapshot();
        assert_eq!(snapshot.matches_detected, 0);
        assert_eq!(snapshot.failed_requests, 0);
        assert_eq!(snapshot.success_rate(), 1.0);
    }

    #[test]
    fn test_latency_averages() {
        let metrics = PerformanceMetrics::new();
        metrics.record_detection_latency(Duration::from_millis(100));
        metrics.record_detection_latency(Duration::from_millis(200));

        let snapshot = metrics.snapshot();
        assert!((snapshot.last_detection_latency_ms - 200.0).abs() < 1e-9);
        assert!((snapshot.avg_detection_latency_ms - 150.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_acceptance_latency_ms, 0.0);
    }

    #[test]
    fn test_accepted_match_clears_error_streak() {
        let metrics = PerformanceMetrics::new();
        metrics.record_request_failure("connection refused");
        metrics.record_error("capture failed");
        assert_eq!(metrics.consecutive_errors(), 2);

        metrics.record_match_detected();
        metrics.record_match_accepted();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.consecutive_errors, 0);
        assert_eq!(snapshot.total_errors, 2);
        assert_eq!(snapshot.last_error_message.as_deref(), Some("capture failed"));
        assert!(snapshot.last_error_time.is_some());
    }

    #[test]
    fn test_failed_click_counts_as_error() {
        let metrics = PerformanceMetrics::new();
        metrics.record_click(Duration::from_millis(5), false, Some("pointer unavailable"));
        metrics.record_click(Duration::from_millis(7), true, None);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.clicks_failed, 1);
        assert_eq!(snapshot.clicks_succeeded, 1);
        assert_eq!(snapshot.total_errors, 1);
        assert!((snapshot.last_click_latency_ms - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_performance_targets() {
        let metrics = PerformanceMetrics::new();
        metrics.update_resource_usage(20.0, 1.0);
        metrics.record_detection_latency(Duration::from_millis(50));
        metrics.record_acceptance_latency(Duration::from_millis(300));
        assert!(metrics.meets_performance_targets());

        metrics.update_resource_usage(80.0, 1.0);
        let snapshot = metrics.snapshot();
        assert!(!snapshot.meets_memory_target());
        assert!(!snapshot.meets_performance_targets());
    }

    #[test]
    fn test_success_rate_target() {
        let metrics = PerformanceMetrics::new();
        for _ in 0..4 {
            metrics.record_match_detected();
        }
        for _ in 0..3 {
            metrics.record_match_accepted();
        }
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.success_rate(), 0.75);
        assert!(!snapshot.meets_success_rate_target());
    }

    #[test]
    fn test_reset() {
        let metrics = PerformanceMetrics::new();
        metrics.record_match_detected();
        metrics.record_request_failure("timeout");
        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.matches_detected, 0);
        assert_eq!(snapshot.failed_requests, 0);
        assert!(snapshot.last_error_message.is_none());
    }

    #[test]
    fn test_concurrent_updates_are_consistent() {
        let metrics = Arc::new(PerformanceMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..250 {
                        metrics.record_request_success(Duration::from_millis(2));
                        metrics.record_request_failure("refused");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.successful_requests, 1000);
        assert_eq!(snapshot.failed_requests, 1000);
        assert_eq!(snapshot.total_errors, 1000);
        assert!((snapshot.avg_request_latency_ms - 2.0).abs() < 1e-9);
    }
}
