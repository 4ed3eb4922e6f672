use crate::metrics::PerformanceMetrics;
use crate::platform::SystemResources;
use crate::services::supervisor::Cycle;
use std::sync::Arc;
use std::time::Duration;

pub const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

/// Cycles between periodic metric log lines (one minute at the default interval).
pub const LOG_EVERY_CYCLES: u64 = 60;

/// Samples process resource usage and periodically logs a metrics line.
pub struct Housekeeping {
    metrics: Arc<PerformanceMetrics>,
    resources: SystemResources,
    interval: Duration,
    log_every: u64,
    ticks: u64,
}

impl Housekeeping {
    pub fn new(metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            metrics,
            resources: SystemResources::new(),
            interval: HOUSEKEEPING_INTERVAL,
            log_every: LOG_EVERY_CYCLES,
            ticks: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_log_every(mut self, cycles: u64) -> Self {
        self.log_every = cycles.max(1);
        self
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Take one resource sample; returns whether a periodic line was logged.
    pub fn tick(&mut self) -> bool {
        self.ticks += 1;

        match self.resources.sample() {
            Some(sample) => {
                self.metrics
                    .update_resource_usage(sample.memory_mb, sample.cpu_percent);
            }
            None => tracing::debug!("Resource sample unavailable"),
        }

        if self.ticks % self.log_every == 0 {
            self.metrics.log_periodic();
            if !self.metrics.meets_performance_targets() {
                tracing::warn!("Running outside performance targets");
            }
            return true;
        }
        false
    }
}

impl Cycle for Housekeeping {
    fn name(&self) -> &'static str {
        "housekeeping"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_cycle(&mut self) -> anyhow::Result<()> {
        self.tick();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_samples_and_logs_on_schedule() {
        let metrics = Arc::new(PerformanceMetrics::new());
        let mut housekeeping = Housekeeping::new(Arc::clone(&metrics)).with_log_every(2);

        assert!(!housekeeping.tick());
        assert!(housekeeping.tick());
        assert_eq!(housekeeping.ticks(), 2);
        assert!(metrics.snapshot().memory_usage_mb > 0.0);
    }

    #[test]
    fn test_log_every_never_zero() {
        let housekeeping = Housekeeping::new(Arc::new(PerformanceMetrics::new())).with_log_every(0);
        assert_eq!(housekeeping.log_every, 1);
    }
}
