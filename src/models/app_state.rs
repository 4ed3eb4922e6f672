use crate::models::connection::ConnectionState;
use crate::models::gameflow::{DetectionSource, GameflowPhase};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Coarse lifecycle of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ApplicationState {
    #[default]
    Initializing,
    Idle,
    Monitoring,
    ReadyCheckDetected,
    Accepting,
    Error,
    ShuttingDown,
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplicationState::Initializing => "initializing",
            ApplicationState::Idle => "idle",
            ApplicationState::Monitoring => "monitoring",
            ApplicationState::ReadyCheckDetected => "ready-check-detected",
            ApplicationState::Accepting => "accepting",
            ApplicationState::Error => "error",
            ApplicationState::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// A positive ready-check detection.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    pub source: DetectionSource,
    pub latency: Duration,
    /// Visual confidence, when the visual path produced the detection.
    pub confidence: Option<f64>,
    pub at: SystemTime,
}

/// Result of one acceptance attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceEvent {
    pub success: bool,
    /// Path that completed the acceptance, `None` when every path failed.
    pub method: Option<DetectionSource>,
    pub latency: Duration,
    pub error: Option<String>,
    pub at: SystemTime,
}

/// Shared runtime status read by the presentation layer.
///
/// Only mutated through [`StateManager`](crate::state::StateManager), which
/// turns every change into a [`StateChange`](crate::state::StateChange) event.
#[derive(Debug, Clone)]
pub struct AppState {
    pub auto_accept_enabled: bool,
    pub application_state: ApplicationState,
    pub connection_state: ConnectionState,
    pub phase: GameflowPhase,
    pub emergency_stopped: bool,
    pub last_detection: Option<DetectionEvent>,
    pub last_acceptance: Option<AcceptanceEvent>,
    pub total_detections: u64,
    pub total_acceptances: u64,
    pub last_error: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            auto_accept_enabled: true,
            application_state: ApplicationState::Initializing,
            connection_state: ConnectionState::Disconnected,
            phase: GameflowPhase::None,
            emergency_stopped: false,
            last_detection: None,
            last_acceptance: None,
            total_detections: 0,
            total_acceptances: 0,
            last_error: None,
        }
    }
}

impl AppState {
    /// Whether the detection loop should act on ready checks.
    pub fn is_active(&self) -> bool {
        self.auto_accept_enabled && !self.emergency_stopped
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = AppState::default();
        assert!(state.is_active());
        assert!(!state.is_connected());
        assert_eq!(state.application_state, ApplicationState::Initializing);
        assert!(state.last_detection.is_none());
    }

    #[test]
    fn test_emergency_stop_deactivates() {
        let state = AppState {
            emergency_stopped: true,
            ..AppState::default()
        };
        assert!(!state.is_active());
    }

    #[test]
    fn test_application_state_display() {
        assert_eq!(ApplicationState::ReadyCheckDetected.to_string(), "ready-check-detected");
    }
}
