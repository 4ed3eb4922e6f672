// State management module
//
// StateManager wraps AppState with thread-safe access and turns every mutation
// into typed change events. The notification dispatcher and any presentation
// layer subscribe to those events instead of polling.

use crate::models::{
    AcceptanceEvent, AppConfig, AppState, ApplicationState, ConnectionState, DetectionEvent,
    DetectionSource, GameflowPhase,
};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Broadcast buffer; slow subscribers lag instead of blocking producers.
const EVENT_CAPACITY: usize = 100;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// Auto-accept was switched on or off
    AutoAcceptToggled { enabled: bool },

    /// The emergency stop was triggered
    EmergencyStop,

    ApplicationStateChanged {
        from: ApplicationState,
        to: ApplicationState,
    },

    ConnectionChanged { state: ConnectionState },

    PhaseChanged {
        from: GameflowPhase,
        to: GameflowPhase,
    },

    /// A ready check was detected by one of the detection paths
    ReadyCheckDetected {
        source: DetectionSource,
        latency: Duration,
    },

    /// An acceptance attempt finished
    AcceptanceFinished {
        success: bool,
        method: Option<DetectionSource>,
        latency: Duration,
        error: Option<String>,
    },

    ErrorRaised { message: String },
}

/// Thread-safe state manager with event emission
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> AppState {
        self.state.read().clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.state.read();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, diffs the two and
    /// broadcasts one event per detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.state.write();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.auto_accept_enabled != new.auto_accept_enabled {
            changes.push(StateChange::AutoAcceptToggled {
                enabled: new.auto_accept_enabled,
            });
        }

        if !old.emergency_stopped && new.emergency_stopped {
            changes.push(StateChange::EmergencyStop);
        }

        if old.application_state != new.application_state {
            changes.push(StateChange::ApplicationStateChanged {
                from: old.application_state,
                to: new.application_state,
            });
        }

        if old.connection_state != new.connection_state {
            changes.push(StateChange::ConnectionChanged {
                state: new.connection_state,
            });
        }

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged {
                from: old.phase,
                to: new.phase,
            });
        }

        if new.total_detections > old.total_detections {
            if let Some(detection) = &new.last_detection {
                changes.push(StateChange::ReadyCheckDetected {
                    source: detection.source,
                    latency: detection.latency,
                });
            }
        }

        if new.total_acceptances > old.total_acceptances {
            if let Some(acceptance) = &new.last_acceptance {
                changes.push(StateChange::AcceptanceFinished {
                    success: acceptance.success,
                    method: acceptance.method,
                    latency: acceptance.latency,
                    error: acceptance.error.clone(),
                });
            }
        }

        if old.last_error != new.last_error {
            if let Some(message) = &new.last_error {
                changes.push(StateChange::ErrorRaised {
                    message: message.clone(),
                });
            }
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn is_active(&self) -> bool {
        self.read(|s| s.is_active())
    }

    pub fn set_auto_accept_enabled(&self, enabled: bool) -> Vec<StateChange> {
        self.update(|state| {
            state.auto_accept_enabled = enabled;
            if enabled {
                state.emergency_stopped = false;
            }
        })
    }

    /// Flip auto-accept and return the new setting.
    pub fn toggle_auto_accept(&self) -> bool {
        let mut enabled = false;
        self.update(|state| {
            state.auto_accept_enabled = !state.auto_accept_enabled;
            if state.auto_accept_enabled {
                state.emergency_stopped = false;
            }
            enabled = state.auto_accept_enabled;
        });
        tracing::info!("Auto-accept {}", if enabled { "enabled" } else { "disabled" });
        enabled
    }

    /// Disable auto-accept immediately.
    pub fn emergency_stop(&self) -> Vec<StateChange> {
        tracing::warn!("Emergency stop: auto-accept disabled");
        self.update(|state| {
            state.emergency_stopped = true;
            state.auto_accept_enabled = false;
        })
    }

    pub fn set_application_state(&self, application_state: ApplicationState) -> Vec<StateChange> {
        self.update(|state| state.application_state = application_state)
    }

    pub fn set_connection_state(&self, connection_state: ConnectionState) -> Vec<StateChange> {
        self.update(|state| state.connection_state = connection_state)
    }

    pub fn set_phase(&self, phase: GameflowPhase) -> Vec<StateChange> {
        self.update(|state| state.phase = phase)
    }

    pub fn record_detection(&self, detection: DetectionEvent) -> Vec<StateChange> {
        self.update(|state| {
            state.total_detections += 1;
            state.last_detection = Some(detection);
        })
    }

    pub fn record_acceptance(&self, acceptance: AcceptanceEvent) -> Vec<StateChange> {
        self.update(|state| {
            state.total_acceptances += 1;
            if !acceptance.success {
                state.last_error = acceptance.error.clone();
            }
            state.last_acceptance = Some(acceptance);
        })
    }

    pub fn record_error(&self, message: impl Into<String>) -> Vec<StateChange> {
        let message = message.into();
        self.update(|state| state.last_error = Some(message))
    }

    /// Apply the persisted settings that live in runtime state.
    pub fn load_from_config(&self, config: &AppConfig) -> Vec<StateChange> {
        self.update(|state| {
            state.auto_accept_enabled = config.auto_accept_enabled;
            tracing::info!(
                "Loaded config: auto_accept={}, method={}, polling={}ms",
                config.auto_accept_enabled,
                config.detection_method,
                config.polling_interval
            );
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn test_toggle_emits_event() {
        let state = StateManager::new();
        let changes = state.set_auto_accept_enabled(false);
        assert_eq!(changes, vec![StateChange::AutoAcceptToggled { enabled: false }]);
        assert!(!state.is_active());

        assert!(state.toggle_auto_accept());
        assert!(state.is_active());
    }

    #[test]
    fn test_no_change_no_event() {
        let state = StateManager::new();
        assert!(state.set_auto_accept_enabled(true).is_empty());
        assert!(state.set_phase(GameflowPhase::None).is_empty());
    }

    #[test]
    fn test_emergency_stop() {
        let state = StateManager::new();
        let changes = state.emergency_stop();
        assert!(changes.contains(&StateChange::EmergencyStop));
        assert!(changes.contains(&StateChange::AutoAcceptToggled { enabled: false }));
        assert!(!state.is_active());
        assert!(state.read(|s| s.emergency_stopped));

        state.set_auto_accept_enabled(true);
        assert!(state.is_active());
    }

    #[test]
    fn test_failed_acceptance_records_error() {
        let state = StateManager::new();
        let changes = state.record_acceptance(AcceptanceEvent {
            success: false,
            method: None,
            latency: Duration::from_millis(40),
            error: Some("button not found".to_string()),
            at: SystemTime::now(),
        });

        assert!(matches!(
            changes[0],
            StateChange::AcceptanceFinished { success: false, .. }
        ));
        assert!(changes.contains(&StateChange::ErrorRaised {
            message: "button not found".to_string()
        }));
    }

    #[test]
    fn test_load_from_config() {
        let state = StateManager::new();
        let config = AppConfig {
            auto_accept_enabled: false,
            ..AppConfig::default()
        };
        state.load_from_config(&config);
        assert!(!state.read(|s| s.auto_accept_enabled));
    }
}
