//! Turning raw client observations into a consistent game-flow state.

use crate::models::{
    DetectionSource, GameflowError, GameflowPhase, GameflowState, ReadyCheckStatus,
};
use crate::services::retry::LcuError;
use serde_json::Value;

/// Identical rejected observations tolerated before resynchronizing via `None`.
pub const RESYNC_AFTER_REJECTIONS: u32 = 3;

/// Parse the gameflow-phase payload, a bare JSON string such as `"Lobby"`.
pub fn parse_gameflow_phase(body: &str) -> Result<GameflowPhase, LcuError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| LcuError::Parse(format!("gameflow phase: {}", e)))?;

    match value {
        Value::String(raw) => Ok(GameflowPhase::from_client_str(&raw)),
        other => Err(LcuError::Parse(format!(
            "gameflow phase: expected a string, got {}",
            other
        ))),
    }
}

/// Parse the ready-check payload.
///
/// Missing, mistyped or unparseable fields fall back to their defaults; this
/// never fails.
pub fn parse_ready_check(body: &str) -> ReadyCheckStatus {
    let mut status = ReadyCheckStatus::default();

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!("Unparseable ready-check payload, using defaults: {}", e);
            return status;
        }
    };

    if let Some(ids) = value.get("declinerIds").and_then(Value::as_array) {
        status.decliner_ids = ids.iter().filter_map(Value::as_i64).collect();
    }
    if let Some(s) = value.get("dodgeWarning").and_then(Value::as_str) {
        status.dodge_warning = s.to_string();
    }
    if let Some(s) = value.get("playerResponse").and_then(Value::as_str) {
        status.player_response = s.to_string();
    }
    if let Some(s) = value.get("state").and_then(Value::as_str) {
        status.state = s.to_string();
    }
    if let Some(b) = value.get("suppressUx").and_then(Value::as_bool) {
        status.suppress_ux = b;
    }
    if let Some(t) = value.get("timer").and_then(Value::as_f64) {
        if t.is_finite() && t >= 0.0 {
            status.timer = t;
        }
    }

    status
}

/// What happened to an observed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseObservation {
    Unchanged,
    Changed { from: GameflowPhase, to: GameflowPhase },
    Rejected { from: GameflowPhase, to: GameflowPhase },
    Resynced { from: GameflowPhase, to: GameflowPhase },
}

/// Owns the [`GameflowState`] and applies observations to it.
#[derive(Debug, Default)]
pub struct GameStateInterpreter {
    state: GameflowState,
    rejected: Option<(GameflowPhase, u32)>,
}

impl GameStateInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &GameflowState {
        &self.state
    }

    pub fn phase(&self) -> GameflowPhase {
        self.state.phase()
    }

    /// Apply a phase reported by the client.
    ///
    /// Illegal transitions keep the previous phase. Observing anything other
    /// than `ReadyCheck` deactivates a pending ready check even when the
    /// transition itself is rejected.
    pub fn observe_phase(&mut self, observed: GameflowPhase) -> PhaseObservation {
        let current = self.state.phase();

        if observed != GameflowPhase::ReadyCheck && self.state.ready_check_active() {
            // Deactivation never fails.
            let _ = self.state.set_ready_check_active(false);
        }

        if observed == current {
            self.rejected = None;
            return PhaseObservation::Unchanged;
        }

        match self.state.set_phase(observed) {
            Ok(()) => {
                self.rejected = None;
                tracing::info!("Gameflow phase {} -> {}", current, observed);
                PhaseObservation::Changed {
                    from: current,
                    to: observed,
                }
            }
            Err(GameflowError::InvalidTransition { from, to }) => {
                let count = match self.rejected {
                    Some((phase, count)) if phase == to => count + 1,
                    _ => 1,
                };
                self.rejected = Some((to, count));

                if count < RESYNC_AFTER_REJECTIONS {
                    tracing::warn!("Ignoring invalid phase transition {} -> {}", from, to);
                    return PhaseObservation::Rejected { from, to };
                }

                self.resync(from, to)
            }
            Err(e) => {
                tracing::warn!("Unexpected gameflow error: {}", e);
                PhaseObservation::Rejected {
                    from: current,
                    to: observed,
                }
            }
        }
    }

    /// Route through `None`, which is always a legal intermediate phase.
    fn resync(&mut self, from: GameflowPhase, to: GameflowPhase) -> PhaseObservation {
        tracing::warn!(
            "Phase {} observed {} times from {}, resynchronizing",
            to,
            RESYNC_AFTER_REJECTIONS,
            from
        );
        self.rejected = None;
        self.state.reset();
        match self.state.set_phase(to) {
            Ok(()) => PhaseObservation::Resynced { from, to },
            Err(_) => PhaseObservation::Rejected { from, to },
        }
    }

    /// Apply a ready-check snapshot taken while the phase is `ReadyCheck`.
    ///
    /// Returns whether a ready check is now active and awaiting our response.
    pub fn observe_ready_check(&mut self, status: &ReadyCheckStatus) -> Result<bool, GameflowError> {
        let awaiting = status.is_in_progress() && status.has_time_remaining() && !status.already_accepted();

        if !awaiting {
            if self.state.ready_check_active() {
                self.state.set_ready_check_active(false)?;
            }
            return Ok(false);
        }

        self.state.set_ready_check_active(true)?;
        let duration = self
            .state
            .ready_check_duration()
            .as_secs_f64()
            .max(status.timer);
        self.state.set_ready_check_timing(duration, status.timer)?;
        self.state.set_detection_source(DetectionSource::ClientApi);

        Ok(self.state.is_ready_check_active())
    }

    /// Record a ready check found on screen.
    ///
    /// The phase is moved to `ReadyCheck` when that transition is legal; the
    /// detection stands either way.
    pub fn observe_visual_detection(&mut self) {
        if let Err(e) = self.state.set_ready_check_active(true) {
            tracing::debug!("Visual detection outside matchmaking: {}", e);
            return;
        }
        self.state.set_detection_source(DetectionSource::VisualDetection);
    }

    pub fn is_ready_check_active(&self) -> bool {
        self.state.is_ready_check_active()
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.rejected = None;
    }
}
