// League Auto Accept - automatic ready-check acceptance for the League client
//
// This is the library crate containing the detection engine and data structures.
// The binary crate (main.rs) wires it to the real platform and runs the loops.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod platform;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use metrics::{MetricsSnapshot, PerformanceMetrics};
pub use models::{AppConfig, AppState, ApplicationState, DetectionMethod, GameflowPhase};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
