//! Services module - the ready-check detection and acceptance engine.
//!
//! The services are framework-agnostic: they only reach the operating system
//! through the capability traits in [`crate::platform`] and the client API
//! through the [`LcuTransport`] seam, so every component runs against fakes in
//! tests.
//!
//! # Components
//!
//! - [`ConnectionDiscovery`]: reads the client's lockfile (port, token, owning
//!   process) and checks that the owner is still alive.
//! - [`ApiClient`]: authenticated HTTPS requests to the loopback API with the
//!   retry/reconnect policy of [`RetryPolicy`] and the [`LcuError`] taxonomy.
//! - [`GameStateInterpreter`]: folds phase and ready-check observations into a
//!   validated [`GameflowState`](crate::models::GameflowState).
//! - [`VisualDetector`]: multi-scale template matching of the accept button on
//!   a captured frame.
//! - [`InputSynthesizer`]: DPI-aware synthetic left clicks.
//! - [`DetectionArbitrator`]: one poll = detect (API, then screen) and accept
//!   (API, then click).
//! - [`Supervisor`]: the shared run-cycle/catch/backoff loop driving the
//!   arbitrator and [`Housekeeping`].
//! - [`NotificationDispatcher`]: renders state events for the user.
//!
//! # Data flow
//!
//! ```text
//! Supervisor ─► DetectionArbitrator ─► ApiClient ─► GameStateInterpreter
//!                      │                   └─ (unreachable) ─► VisualDetector
//!                      └─ accept: ApiClient ─► (failed) ─► VisualDetector + InputSynthesizer
//! ```

pub mod arbitrator;
pub mod discovery;
pub mod gameflow;
pub mod housekeeping;
pub mod input;
pub mod lcu_client;
pub mod notifications;
pub mod retry;
pub mod supervisor;
pub mod vision;

pub use arbitrator::{AcceptanceOutcome, ArbitratorSettings, Detection, DetectionArbitrator};
pub use discovery::{ConnectionDiscovery, DiscoveryError, LockfileEntry, parse_lockfile_line};
pub use gameflow::{GameStateInterpreter, PhaseObservation, parse_gameflow_phase, parse_ready_check};
pub use housekeeping::Housekeeping;
pub use input::InputSynthesizer;
pub use lcu_client::{
    ApiClient, ApiResponse, HttpMethod, HttpsTransport, LcuTransport, RawResponse, TransportError,
    TransportRequest,
};
pub use notifications::{Notification, NotificationDispatcher, NotificationLevel, notification_for};
pub use retry::{ErrorKind, LcuError, RetryPolicy, classify_status};
pub use supervisor::{Cycle, Supervisor, SupervisorReport, sleep_or_shutdown};
pub use vision::{
    VisionError, VisualDetector, match_template_at_scale, match_template_multi_scale, scale_steps,
    synthetic_accept_template,
};
