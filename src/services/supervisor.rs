//! Uniform "run one cycle, catch, back off, repeat" wrapper for the
//! long-running loops.
//!
//! Each cycle runs in its own task so that a panic inside it is reported as a
//! [`tokio::task::JoinError`] instead of tearing down the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::Instant;

pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(1000);

/// One unit of periodic work.
pub trait Cycle: Send + 'static {
    fn name(&self) -> &'static str;

    /// Pause between successful cycles.
    fn interval(&self) -> Duration;

    fn run_cycle(&mut self) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Outcome counters of a supervised loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub cycles: u64,
    pub failures: u64,
    pub panics: u64,
}

/// Sleep for `duration` unless shutdown is requested first.
///
/// Returns `true` when shutdown was requested. A closed channel is treated as
/// "never shutting down".
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if *shutdown.borrow_and_update() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => return false,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    tokio::time::sleep_until(deadline).await;
                    return false;
                }
            }
        }
    }
}

/// Drives a [`Cycle`] until shutdown.
pub struct Supervisor {
    error_backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            error_backoff: DEFAULT_ERROR_BACKOFF,
            shutdown,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Run `cycle` repeatedly. Errors and panics are logged and followed by
    /// the error backoff; the loop only ends on shutdown.
    pub async fn run<C: Cycle>(mut self, cycle: Arc<Mutex<C>>) -> SupervisorReport {
        let mut report = SupervisorReport::default();
        let name = cycle.lock().await.name();
        tracing::info!("{} loop started", name);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let task = Arc::clone(&cycle);
            let handle = tokio::spawn(async move {
                let mut guard = task.lock().await;
                guard.run_cycle().await
            });

            report.cycles += 1;
            let pause = match handle.await {
                Ok(Ok(())) => cycle.lock().await.interval(),
                Ok(Err(e)) => {
                    report.failures += 1;
                    tracing::error!("{} cycle failed: {:#}", name, e);
                    self.error_backoff
                }
                Err(e) if e.is_panic() => {
                    report.panics += 1;
                    tracing::error!("{} cycle panicked, restarting after backoff", name);
                    self.error_backoff
                }
                Err(e) => {
                    tracing::warn!("{} cycle cancelled: {}", name, e);
                    break;
                }
            };

            if sleep_or_shutdown(pause, &mut self.shutdown).await {
                break;
            }
        }

        tracing::info!(
            "{} loop stopped after {} cycles ({} failed, {} panicked)",
            name,
            report.cycles,
            report.failures,
            report.panics
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky {
        calls: u32,
        stop_after: u32,
        shutdown: watch::Sender<bool>,
    }

    impl Cycle for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(1)
        }

        async fn run_cycle(&mut self) -> anyhow::Result<()> {
            self.calls += 1;
            if self.calls >= self.stop_after {
                let _ = self.shutdown.send(true);
            }
            match self.calls % 3 {
                1 => Ok(()),
                2 => anyhow::bail!("transient failure"),
                _ => panic!("cycle blew up"),
            }
        }
    }

    #[tokio::test]
    async fn test_errors_and_panics_do_not_stop_the_loop() {
        let (tx, rx) = watch::channel(false);
        let cycle = Arc::new(Mutex::new(Flaky {
            calls: 0,
            stop_after: 6,
            shutdown: tx,
        }));

        let report = Supervisor::new(rx)
            .with_error_backoff(Duration::from_millis(1))
            .run(Arc::clone(&cycle))
            .await;

        assert_eq!(report.cycles, 6);
        assert_eq!(report.failures, 2);
        assert_eq!(report.panics, 2);
        assert_eq!(cycle.lock().await.calls, 6);
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { sleep_or_shutdown(Duration::from_secs(30), &mut rx).await });
        tx.send(true).unwrap();

        let interrupted = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("sleep should end promptly")
            .unwrap();
        assert!(interrupted);
    }

    #[tokio::test]
    async fn test_sleep_wakes_on_shutdown_signal() {
        let (tx, mut rx) = watch::channel(false);
        let mut sleep = tokio_test::task::spawn(sleep_or_shutdown(Duration::from_secs(30), &mut rx));
        tokio_test::assert_pending!(sleep.poll());

        tx.send(true).unwrap();
        assert!(sleep.is_woken());
        tokio_test::assert_ready_eq!(sleep.poll(), true);
    }

    #[tokio::test]
    async fn test_sleep_completes_without_shutdown() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_shutdown(Duration::from_millis(5), &mut rx).await);
    }

    #[tokio::test]
    async fn test_closed_channel_is_not_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(!sleep_or_shutdown(Duration::from_millis(5), &mut rx).await);
    }
}
