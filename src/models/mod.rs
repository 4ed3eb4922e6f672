//! Data models for the auto-accept engine.
//!
//! - [`AppState`]: runtime status shared with the presentation layer
//! - [`AppConfig`]: persisted settings loaded by [`ConfigManager`](crate::config::ConfigManager)
//! - [`ConnectionInfo`]: endpoint and credentials of the local client API
//! - [`GameflowState`]: interpreted game-flow phase and ready-check timing
//! - [`TemplateMatchResult`] / [`ClickResult`]: outcomes of the visual path

pub mod app_state;
pub mod config;
pub mod connection;
pub mod gameflow;
pub mod vision;

pub use app_state::{AcceptanceEvent, AppState, ApplicationState, DetectionEvent};
pub use config::{AppConfig, ConfigError, DetectionMethod, LogLevel, ScaleRange};
pub use connection::{ConnectionInfo, ConnectionState, MAX_CONSECUTIVE_ERRORS};
pub use gameflow::{
    DetectionSource, GameflowError, GameflowPhase, GameflowState, ReadyCheckStatus,
};
pub use vision::{ClickResult, ScreenRegion, TemplateMatchResult};
