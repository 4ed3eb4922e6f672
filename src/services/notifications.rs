//! Single consumer of the state event channel that renders user-facing
//! notifications. The sink is the log (`target: "notification"`); a tray or
//! toast front end would subscribe the same way.

use crate::state::StateChange;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: &'static str,
    pub message: String,
    pub level: NotificationLevel,
}

/// Map a state change to the notification it produces, if any.
pub fn notification_for(change: &StateChange) -> Option<Notification> {
    match change {
        StateChange::AcceptanceFinished {
            success: true,
            method,
            latency,
            ..
        } => Some(Notification {
            title: "Match Accepted",
            message: match method {
                Some(method) => format!(
                    "Ready check accepted via {} in {}ms",
                    method,
                    latency.as_millis()
                ),
                None => format!("Ready check accepted in {}ms", latency.as_millis()),
            },
            level: NotificationLevel::Info,
        }),
        StateChange::AcceptanceFinished {
            success: false,
            error,
            ..
        } => Some(Notification {
            title: "Acceptance Failed",
            message: error
                .clone()
                .unwrap_or_else(|| "Could not accept the ready check".to_string()),
            level: NotificationLevel::Warning,
        }),
        StateChange::AutoAcceptToggled { enabled } => Some(Notification {
            title: if *enabled {
                "Auto-Accept Enabled"
            } else {
                "Auto-Accept Disabled"
            },
            message: if *enabled {
                "Ready checks will be accepted automatically".to_string()
            } else {
                "Ready checks will not be accepted".to_string()
            },
            level: NotificationLevel::Info,
        }),
        StateChange::EmergencyStop => Some(Notification {
            title: "Emergency Stop",
            message: "Auto-accept has been disabled".to_string(),
            level: NotificationLevel::Warning,
        }),
        _ => None,
    }
}

pub struct NotificationDispatcher {
    enabled: bool,
    events: broadcast::Receiver<StateChange>,
    shutdown: watch::Receiver<bool>,
    delivered: u64,
}

impl NotificationDispatcher {
    pub fn new(
        enabled: bool,
        events: broadcast::Receiver<StateChange>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            enabled,
            events,
            shutdown,
            delivered: 0,
        }
    }

    fn deliver(&mut self, notification: &Notification) {
        self.delivered += 1;
        match notification.level {
            NotificationLevel::Info => tracing::info!(
                target: "notification",
                title = notification.title,
                "{}",
                notification.message
            ),
            NotificationLevel::Warning => tracing::warn!(
                target: "notification",
                title = notification.title,
                "{}",
                notification.message
            ),
        }
    }

    /// Consume events until shutdown or until every sender is gone.
    ///
    /// Returns the number of notifications delivered.
    pub async fn run(mut self) -> u64 {
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let change = tokio::select! {
                received = self.events.recv() => received,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped; keep draining events.
                        self.events.recv().await
                    } else {
                        continue;
                    }
                }
            };

            match change {
                Ok(change) => {
                    if !self.enabled {
                        continue;
                    }
                    if let Some(notification) = notification_for(&change) {
                        self.deliver(&notification);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Notification dispatcher lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }

        tracing::debug!("Notification dispatcher stopped ({} delivered)", self.delivered);
        self.delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionSource;
    use std::time::Duration;

    fn accepted() -> StateChange {
        StateChange::AcceptanceFinished {
            success: true,
            method: Some(DetectionSource::ClientApi),
            latency: Duration::from_millis(120),
            error: None,
        }
    }

    #[test]
    fn test_acceptance_notifications() {
        let ok = notification_for(&accepted()).unwrap();
        assert_eq!(ok.title, "Match Accepted");
        assert!(ok.message.contains("120ms"));

        let failed = notification_for(&StateChange::AcceptanceFinished {
            success: false,
            method: None,
            latency: Duration::from_millis(900),
            error: Some("api: refused; ui: not found".to_string()),
        })
        .unwrap();
        assert_eq!(failed.title, "Acceptance Failed");
        assert_eq!(failed.level, NotificationLevel::Warning);
        assert_eq!(failed.message, "api: refused; ui: not found");
    }

    #[test]
    fn test_phase_changes_are_silent() {
        let change = StateChange::ErrorRaised {
            message: "x".to_string(),
        };
        assert!(notification_for(&change).is_none());
    }

    #[tokio::test]
    async fn test_dispatcher_counts_and_stops_on_close() {
        let (tx, rx) = broadcast::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = NotificationDispatcher::new(true, rx, stop_rx);

        tx.send(accepted()).unwrap();
        tx.send(StateChange::EmergencyStop).unwrap();
        drop(tx);

        let delivered = tokio::time::timeout(Duration::from_secs(1), dispatcher.run())
            .await
            .unwrap();
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_delivers_nothing() {
        let (tx, rx) = broadcast::channel(16);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let dispatcher = NotificationDispatcher::new(false, rx, stop_rx);

        tx.send(accepted()).unwrap();
        drop(tx);

        let delivered = tokio::time::timeout(Duration::from_secs(1), dispatcher.run())
            .await
            .unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_dispatcher_stops_on_shutdown() {
        let (_tx, rx) = broadcast::channel::<StateChange>(16);
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(NotificationDispatcher::new(true, rx, stop_rx).run());

        stop_tx.send(true).unwrap();
        let delivered = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, 0);
    }
}
