use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Game-flow phase as understood by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameflowPhase {
    #[default]
    None,
    Lobby,
    Matchmaking,
    ReadyCheck,
    ChampionSelect,
    InGame,
}

impl GameflowPhase {
    /// Map a raw phase string reported by the client.
    ///
    /// Unknown phases map to `None`, the state machine's escape hatch.
    pub fn from_client_str(raw: &str) -> Self {
        match raw {
            "None" => GameflowPhase::None,
            "Lobby" => GameflowPhase::Lobby,
            "Matchmaking" => GameflowPhase::Matchmaking,
            "ReadyCheck" => GameflowPhase::ReadyCheck,
            "ChampSelect" | "ChampionSelect" => GameflowPhase::ChampionSelect,
            "InGame" | "GameStart" | "InProgress" | "Reconnect" => GameflowPhase::InGame,
            other => {
                tracing::debug!("Unrecognized gameflow phase '{}', treating as None", other);
                GameflowPhase::None
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GameflowPhase::None => "None",
            GameflowPhase::Lobby => "Lobby",
            GameflowPhase::Matchmaking => "Matchmaking",
            GameflowPhase::ReadyCheck => "ReadyCheck",
            GameflowPhase::ChampionSelect => "ChampSelect",
            GameflowPhase::InGame => "InGame",
        }
    }

    /// Whether moving from `from` to `to` is a legal transition.
    ///
    /// Any transition into or out of `None` is always legal. Self-transitions
    /// are not in the table and therefore rejected.
    pub fn is_valid_transition(from: GameflowPhase, to: GameflowPhase) -> bool {
        use GameflowPhase::*;

        if from == None || to == None {
            return true;
        }

        matches!(
            (from, to),
            (Lobby, Matchmaking)
                | (Lobby, InGame)
                | (Matchmaking, ReadyCheck)
                | (Matchmaking, Lobby)
                | (ReadyCheck, ChampionSelect)
                | (ReadyCheck, Lobby)
                | (ChampionSelect, InGame)
                | (ChampionSelect, Lobby)
                | (InGame, Lobby)
        )
    }
}

impl fmt::Display for GameflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path produced a detection or acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectionSource {
    ClientApi,
    VisualDetection,
}

impl fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionSource::ClientApi => f.write_str("client-api"),
            DetectionSource::VisualDetection => f.write_str("visual"),
        }
    }
}

/// Snapshot of the matchmaking ready-check resource.
///
/// Defaults mirror what the client reports when a field is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCheckStatus {
    pub decliner_ids: Vec<i64>,
    pub dodge_warning: String,
    pub player_response: String,
    pub state: String,
    pub suppress_ux: bool,
    /// Seconds remaining on the ready check.
    pub timer: f64,
}

impl Default for ReadyCheckStatus {
    fn default() -> Self {
        Self {
            decliner_ids: Vec::new(),
            dodge_warning: "None".to_string(),
            player_response: "None".to_string(),
            state: "Invalid".to_string(),
            suppress_ux: false,
            timer: 0.0,
        }
    }
}

impl ReadyCheckStatus {
    pub fn is_in_progress(&self) -> bool {
        self.state == "InProgress"
    }

    pub fn has_time_remaining(&self) -> bool {
        self.timer > 0.0
    }

    pub fn already_accepted(&self) -> bool {
        self.player_response == "Accepted"
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameflowError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: GameflowPhase, to: GameflowPhase },

    #[error("Invalid ready check timing: {0}")]
    InvalidTiming(String),
}

/// Interpreted game-flow state.
///
/// Invariants: `ready_check_active` implies `phase == ReadyCheck`, and
/// `0 <= remaining <= duration`.
#[derive(Debug, Clone)]
pub struct GameflowState {
    phase: GameflowPhase,
    previous_phase: GameflowPhase,
    ready_check_active: bool,
    ready_check_duration: Duration,
    ready_check_remaining: Duration,
    last_updated: Instant,
    detection_source: Option<DetectionSource>,
}

impl Default for GameflowState {
    fn default() -> Self {
        Self {
            phase: GameflowPhase::None,
            previous_phase: GameflowPhase::None,
            ready_check_active: false,
            ready_check_duration: Duration::ZERO,
            ready_check_remaining: Duration::ZERO,
            last_updated: Instant::now(),
            detection_source: None,
        }
    }
}

impl GameflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GameflowPhase {
        self.phase
    }

    pub fn previous_phase(&self) -> GameflowPhase {
        self.previous_phase
    }

    pub fn ready_check_active(&self) -> bool {
        self.ready_check_active
    }

    pub fn ready_check_duration(&self) -> Duration {
        self.ready_check_duration
    }

    pub fn ready_check_remaining(&self) -> Duration {
        self.ready_check_remaining
    }

    pub fn detection_source(&self) -> Option<DetectionSource> {
        self.detection_source
    }

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    pub fn can_transition_to(&self, to: GameflowPhase) -> bool {
        GameflowPhase::is_valid_transition(self.phase, to)
    }

    /// Move to `phase`, rejecting transitions outside the table.
    ///
    /// Leaving `ReadyCheck` resets every ready-check field.
    pub fn set_phase(&mut self, phase: GameflowPhase) -> Result<(), GameflowError> {
        if !self.can_transition_to(phase) {
            return Err(GameflowError::InvalidTransition {
                from: self.phase,
                to: phase,
            });
        }

        let leaving_ready_check =
            self.phase == GameflowPhase::ReadyCheck && phase != GameflowPhase::ReadyCheck;

        self.previous_phase = self.phase;
        self.phase = phase;
        self.touch();

        if leaving_ready_check {
            self.clear_ready_check();
        }

        Ok(())
    }

    /// Flag a ready check as active or inactive.
    ///
    /// Activating from another phase first transitions to `ReadyCheck`, which
    /// fails when that transition is not legal.
    pub fn set_ready_check_active(&mut self, active: bool) -> Result<(), GameflowError> {
        if active && self.phase != GameflowPhase::ReadyCheck {
            self.set_phase(GameflowPhase::ReadyCheck)?;
        }

        self.ready_check_active = active;
        if !active {
            self.ready_check_remaining = Duration::ZERO;
        }
        self.touch();
        Ok(())
    }

    /// Set the ready-check window. Negative values and a remaining time
    /// longer than the duration are rejected.
    pub fn set_ready_check_timing(
        &mut self,
        duration_secs: f64,
        remaining_secs: f64,
    ) -> Result<(), GameflowError> {
        if !duration_secs.is_finite() || !remaining_secs.is_finite() {
            return Err(GameflowError::InvalidTiming(
                "timing values must be finite".to_string(),
            ));
        }
        if duration_secs < 0.0 || remaining_secs < 0.0 {
            return Err(GameflowError::InvalidTiming(format!(
                "negative timing (duration {duration_secs}s, remaining {remaining_secs}s)"
            )));
        }
        if remaining_secs > duration_secs {
            return Err(GameflowError::InvalidTiming(format!(
                "remaining {remaining_secs}s exceeds duration {duration_secs}s"
            )));
        }

        self.ready_check_duration = Duration::from_secs_f64(duration_secs);
        self.ready_check_remaining = Duration::from_secs_f64(remaining_secs);
        self.touch();
        Ok(())
    }

    pub fn set_detection_source(&mut self, source: DetectionSource) {
        self.detection_source = Some(source);
        self.touch();
    }

    pub fn has_time_remaining(&self) -> bool {
        self.ready_check_remaining > Duration::ZERO
    }

    /// Ready check flagged active with time left on the clock.
    pub fn is_ready_check_active(&self) -> bool {
        self.phase == GameflowPhase::ReadyCheck && self.ready_check_active && self.has_time_remaining()
    }

    pub fn is_recent(&self, max_age: Duration) -> bool {
        self.last_updated.elapsed() <= max_age
    }

    /// Internal consistency of the ready-check fields.
    pub fn is_valid(&self) -> bool {
        let active_in_phase = !self.ready_check_active || self.phase == GameflowPhase::ReadyCheck;
        active_in_phase && self.ready_check_remaining <= self.ready_check_duration
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn clear_ready_check(&mut self) {
        self.ready_check_active = false;
        self.ready_check_duration = Duration::ZERO;
        self.ready_check_remaining = Duration::ZERO;
        self.detection_source = None;
    }

    fn touch(&mut self) {
        self.last_updated = Instant::now();
    }
}
