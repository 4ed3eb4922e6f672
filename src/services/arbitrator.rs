//! Decides, once per poll, whether a ready check is pending and accepts it.
//!
//! Detection asks the client API first and falls back to the screen when the
//! API is unreachable; acceptance tries the API first and falls back to a
//! synthetic click. Which paths are allowed is governed by
//! [`DetectionMethod`].

use crate::metrics::PerformanceMetrics;
use crate::models::{
    AcceptanceEvent, AppConfig, ApplicationState, DetectionEvent, DetectionMethod, DetectionSource,
    GameflowPhase, TemplateMatchResult,
};
use crate::services::gameflow::GameStateInterpreter;
use crate::services::input::InputSynthesizer;
use crate::services::lcu_client::{ApiClient, LcuTransport};
use crate::services::retry::ErrorKind;
use crate::services::supervisor::Cycle;
use crate::services::vision::VisualDetector;
use crate::state::StateManager;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArbitratorSettings {
    pub detection_method: DetectionMethod,
    pub polling_interval: Duration,
}

impl From<&AppConfig> for ArbitratorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            detection_method: config.detection_method,
            polling_interval: config.polling_interval(),
        }
    }
}

impl Default for ArbitratorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

/// A pending ready check found during one poll.
#[derive(Debug, Clone)]
pub struct Detection {
    pub source: DetectionSource,
    /// When the poll that found it started.
    pub started: Instant,
    pub latency: Duration,
    /// Match that produced a visual detection.
    pub visual: Option<TemplateMatchResult>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptanceOutcome {
    pub success: bool,
    pub method: Option<DetectionSource>,
    pub latency: Duration,
    pub error: Option<String>,
}

/// Result of asking the client API about the ready check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiProbe {
    Active,
    Inactive,
    Unreachable,
}

pub struct DetectionArbitrator<T: LcuTransport> {
    client: ApiClient<T>,
    interpreter: GameStateInterpreter,
    detector: Arc<Mutex<VisualDetector>>,
    input: Arc<InputSynthesizer>,
    state: Arc<StateManager>,
    metrics: Arc<PerformanceMetrics>,
    settings: ArbitratorSettings,
}

impl<T: LcuTransport + 'static> DetectionArbitrator<T> {
    pub fn new(
        client: ApiClient<T>,
        detector: VisualDetector,
        input: InputSynthesizer,
        state: Arc<StateManager>,
        metrics: Arc<PerformanceMetrics>,
        settings: ArbitratorSettings,
    ) -> Self {
        Self {
            client,
            interpreter: GameStateInterpreter::new(),
            detector: Arc::new(Mutex::new(detector)),
            input: Arc::new(input),
            state,
            metrics,
            settings,
        }
    }

    pub fn client(&self) -> &ApiClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ApiClient<T> {
        &mut self.client
    }

    pub fn interpreter(&self) -> &GameStateInterpreter {
        &self.interpreter
    }

    pub fn detector(&self) -> MutexGuard<'_, VisualDetector> {
        self.detector.lock()
    }

    pub fn settings(&self) -> ArbitratorSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: ArbitratorSettings) {
        self.settings = settings;
    }

    fn sync_connection_state(&self) {
        self.state.set_connection_state(self.client.connection().state());
    }

    /// Make sure the client has a live endpoint, rediscovering if needed.
    fn ensure_connected(&mut self) -> bool {
        let connected = if self.client.is_connected() && self.client.verify_owner() {
            true
        } else {
            match self.client.connect() {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("Client API not available: {}", e);
                    false
                }
            }
        };
        self.sync_connection_state();
        connected
    }

    async fn probe_api(&mut self) -> ApiProbe {
        if !self.ensure_connected() {
            return ApiProbe::Unreachable;
        }

        let observed = match self.client.get_gameflow_phase().await {
            Ok(phase) => phase,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Parse) => {
                tracing::debug!("Gameflow phase unavailable: {}", e);
                return ApiProbe::Inactive;
            }
            Err(e) => {
                tracing::debug!("Client API unreachable: {}", e);
                self.sync_connection_state();
                return ApiProbe::Unreachable;
            }
        };

        self.interpreter.observe_phase(observed);
        self.state.set_phase(self.interpreter.phase());

        if observed != GameflowPhase::ReadyCheck || self.interpreter.phase() != GameflowPhase::ReadyCheck {
            return ApiProbe::Inactive;
        }

        let status = match self.client.get_ready_check_status().await {
            Ok(status) => status,
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::Parse) => {
                tracing::debug!("Ready-check status unavailable: {}", e);
                return ApiProbe::Inactive;
            }
            Err(e) => {
                tracing::debug!("Ready-check status request failed: {}", e);
                self.sync_connection_state();
                return ApiProbe::Unreachable;
            }
        };

        if status.already_accepted() {
            tracing::debug!("Ready check already accepted, nothing to do");
        }

        match self.interpreter.observe_ready_check(&status) {
            Ok(true) => ApiProbe::Active,
            Ok(false) => ApiProbe::Inactive,
            Err(e) => {
                tracing::debug!("Ignoring inconsistent ready-check status: {}", e);
                ApiProbe::Inactive
            }
        }
    }

    /// Screen search, run on the blocking pool.
    async fn probe_visual(&mut self) -> Option<TemplateMatchResult> {
        let detector = Arc::clone(&self.detector);
        match tokio::task::spawn_blocking(move || detector.lock().find_accept_button()).await {
            Ok(result) => result.found.then_some(result),
            Err(e) => {
                tracing::error!("Visual detection task failed: {}", e);
                self.metrics.record_error(&format!("visual detection task failed: {}", e));
                None
            }
        }
    }

    /// Look for a pending ready check using the allowed paths.
    ///
    /// An API that answers "no ready check" is authoritative; the screen is
    /// only consulted when the API is not allowed or cannot be reached.
    pub async fn check_for_ready_check(&mut self) -> Option<Detection> {
        let started = Instant::now();
        let method = self.settings.detection_method;
        let mut found: Option<(DetectionSource, Option<TemplateMatchResult>)> = None;

        if method.uses_api() {
            match self.probe_api().await {
                ApiProbe::Active => found = Some((DetectionSource::ClientApi, None)),
                ApiProbe::Inactive => return None,
                ApiProbe::Unreachable if !method.uses_visual() => return None,
                ApiProbe::Unreachable => {
                    tracing::debug!("Falling back to visual detection");
                }
            }
        }

        if found.is_none() && method.uses_visual() {
            if let Some(result) = self.probe_visual().await {
                self.interpreter.observe_visual_detection();
                found = Some((DetectionSource::VisualDetection, Some(result)));
            }
        }

        let (source, visual) = found?;
        let latency = started.elapsed();

        self.metrics.record_match_detected();
        if source == DetectionSource::ClientApi {
            self.metrics.record_detection_latency(latency);
        }

        tracing::info!(
            source = %source,
            latency_ms = latency.as_millis() as u64,
            "Ready check detected"
        );

        self.state.record_detection(DetectionEvent {
            source,
            latency,
            confidence: visual.as_ref().map(|r| r.confidence),
            at: SystemTime::now(),
        });

        Some(Detection {
            source,
            started,
            latency,
            visual,
        })
    }

    /// Accept a detected ready check, API first, then a synthetic click.
    pub async fn perform_acceptance(&mut self, detection: &Detection) -> AcceptanceOutcome {
        let method = self.settings.detection_method;
        let mut errors: Vec<String> = Vec::new();

        if method.uses_api() && self.client.is_connected() {
            match self.client.accept_ready_check().await {
                Ok(()) => {
                    return self.finish_acceptance(detection, Some(DetectionSource::ClientApi), None);
                }
                Err(e) => {
                    tracing::warn!("API acceptance failed: {}", e);
                    errors.push(format!("api: {}", e));
                }
            }
        }

        if method.uses_visual() {
            match self.click_accept_button(detection).await {
                Ok(()) => {
                    return self.finish_acceptance(
                        detection,
                        Some(DetectionSource::VisualDetection),
                        None,
                    );
                }
                Err(message) => errors.push(message),
            }
        }

        if errors.is_empty() {
            errors.push("no acceptance path available".to_string());
        }
        self.finish_acceptance(detection, None, Some(errors.join("; ")))
    }

    /// Locate (unless already located) and click the accept button on the
    /// blocking pool.
    async fn click_accept_button(&mut self, detection: &Detection) -> Result<(), String> {
        let known = detection.visual.clone().filter(|result| result.found);
        let detector = Arc::clone(&self.detector);
        let input = Arc::clone(&self.input);

        tokio::task::spawn_blocking(move || click_on_screen(&detector, &input, known))
            .await
            .map_err(|e| format!("ui: click task failed: {}", e))?
    }

    fn finish_acceptance(
        &mut self,
        detection: &Detection,
        method: Option<DetectionSource>,
        error: Option<String>,
    ) -> AcceptanceOutcome {
        let latency = detection.started.elapsed();
        let success = method.is_some();

        if let Some(method) = method {
            self.metrics.record_acceptance_latency(latency);
            self.metrics.record_match_accepted();
            tracing::info!(
                method = %method,
                latency_ms = latency.as_millis() as u64,
                "Ready check accepted in {}ms",
                latency.as_millis()
            );
        } else {
            let message = error.as_deref().unwrap_or("unknown failure");
            self.metrics.record_error(message);
            tracing::error!(
                latency_ms = latency.as_millis() as u64,
                "Failed to accept ready check: {}",
                message
            );
        }

        self.state.record_acceptance(AcceptanceEvent {
            success,
            method,
            latency,
            error: error.clone(),
            at: SystemTime::now(),
        });

        AcceptanceOutcome {
            success,
            method,
            latency,
            error,
        }
    }

    /// One poll: detect, re-check the enabled flag, accept.
    pub async fn poll_once(&mut self) -> anyhow::Result<Option<AcceptanceOutcome>> {
        if !self.state.is_active() {
            self.state.set_application_state(ApplicationState::Idle);
            return Ok(None);
        }
        self.state.set_application_state(ApplicationState::Monitoring);

        let Some(detection) = self.check_for_ready_check().await else {
            return Ok(None);
        };
        self.state.set_application_state(ApplicationState::ReadyCheckDetected);

        if !self.state.is_active() {
            tracing::info!("Auto-accept disabled after detection, not accepting");
            return Ok(None);
        }

        self.state.set_application_state(ApplicationState::Accepting);
        let outcome = self.perform_acceptance(&detection).await;
        self.state.set_application_state(if outcome.success {
            ApplicationState::Monitoring
        } else {
            ApplicationState::Error
        });

        Ok(Some(outcome))
    }
}

impl<T: LcuTransport + 'static> Cycle for DetectionArbitrator<T> {
    fn name(&self) -> &'static str {
        "detection"
    }

    fn interval(&self) -> Duration {
        self.settings.polling_interval
    }

    async fn run_cycle(&mut self) -> anyhow::Result<()> {
        self.poll_once().await.map(|_| ())
    }
}

fn click_on_screen(
    detector: &Mutex<VisualDetector>,
    input: &InputSynthesizer,
    known: Option<TemplateMatchResult>,
) -> Result<(), String> {
    let mut detector = detector.lock();
    let result = match known {
        Some(result) => result,
        None => detector.find_accept_button(),
    };
    if !result.found {
        return Err(format!(
            "ui: accept button not found (confidence {:.2})",
            result.confidence
        ));
    }

    let scale = detector.capture_scale_factor();
    drop(detector);
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let (px, py) = result.center();
    let x = (f64::from(px) / scale).round() as i32;
    let y = (f64::from(py) / scale).round() as i32;

    let click = input.click(x, y);
    if click.success {
        Ok(())
    } else {
        Err(format!(
            "ui: {}",
            click.error.unwrap_or_else(|| "click failed".to_string())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConnectionState, ScreenRegion};
    use crate::platform::{MockPointerInput, MockProcessQuery, MockScreenCapture};
    use crate::services::discovery::ConnectionDiscovery;
    use crate::services::lcu_client::{
        GAMEFLOW_PHASE_ENDPOINT, READY_CHECK_ACCEPT_ENDPOINT, READY_CHECK_ENDPOINT, RawResponse,
        TransportError, TransportRequest,
    };
    use crate::services::retry::RetryPolicy;
    use crate::services::vision::synthetic_accept_template;
    use image::{GrayImage, Luma, imageops};
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASE_URL: &str = "https://127.0.0.1:2999";

    /// Answers per endpoint; anything unscripted is refused.
    #[derive(Default)]
    struct RoutedTransport {
        routes: Mutex<HashMap<String, VecDeque<RawResponse>>>,
        calls: Mutex<Vec<String>>,
    }

    impl RoutedTransport {
        fn respond(&self, endpoint: &str, status: u16, body: &str) {
            self.routes
                .lock()
                .entry(endpoint.to_string())
                .or_default()
                .push_back(RawResponse {
                    status,
                    body: body.to_string(),
                });
        }

        fn calls_to(&self, endpoint: &str) -> usize {
            self.calls.lock().iter().filter(|c| c.as_str() == endpoint).count()
        }
    }

    impl LcuTransport for Arc<RoutedTransport> {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
            let endpoint = request
                .url
                .strip_prefix(BASE_URL)
                .unwrap_or(&request.url)
                .to_string();
            self.calls.lock().push(endpoint.clone());
            self.routes
                .lock()
                .get_mut(&endpoint)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| TransportError::Connection("connection refused".to_string()))
        }
    }

    fn screen_with_button() -> GrayImage {
        let mut screen = GrayImage::from_fn(400, 300, |x, y| {
            let v = (x.wrapping_mul(73) ^ y.wrapping_mul(151)).wrapping_mul(2_654_435_761) >> 24;
            Luma([(v % 120) as u8])
        });
        imageops::replace(&mut screen, &synthetic_accept_template(), 150, 200);
        screen
    }

    fn capture_showing(screen: Option<GrayImage>) -> MockScreenCapture {
        let mut capture = MockScreenCapture::new();
        capture.expect_scale_factor().return_const(1.0);
        capture.expect_capture_screen().returning(move || {
            screen
                .clone()
                .ok_or(crate::platform::CaptureError::NoMonitor)
        });
        capture
    }

    fn idle_pointer() -> MockPointerInput {
        let mut pointer = MockPointerInput::new();
        pointer.expect_device_pixel_ratio().return_const(1.0);
        pointer.expect_move_to().never();
        pointer
    }

    struct Fixture {
        arbitrator: DetectionArbitrator<Arc<RoutedTransport>>,
        transport: Arc<RoutedTransport>,
        state: Arc<StateManager>,
        metrics: Arc<PerformanceMetrics>,
        _lockfile: NamedTempFile,
    }

    fn fixture(
        method: DetectionMethod,
        capture: MockScreenCapture,
        pointer: MockPointerInput,
    ) -> Fixture {
        let mut lockfile = NamedTempFile::new().unwrap();
        write!(lockfile, "LeagueClient:1234:2999:secret:https").unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(lockfile.path().to_path_buf()).unwrap();

        let mut processes = MockProcessQuery::new();
        processes.expect_is_process_running().return_const(true);
        let discovery = ConnectionDiscovery::new(vec![path], Arc::new(processes));

        let metrics = Arc::new(PerformanceMetrics::new());
        let state = Arc::new(StateManager::new());
        let transport = Arc::new(RoutedTransport::default());

        let mut client = ApiClient::new(Arc::clone(&transport), discovery, Arc::clone(&metrics));
        client.set_retry_policy(RetryPolicy::new(3, Duration::from_millis(1), true));

        let detector = VisualDetector::new(Arc::new(capture), Arc::clone(&metrics));
        let input = InputSynthesizer::new(Arc::new(pointer), Arc::clone(&metrics));
        let settings = ArbitratorSettings {
            detection_method: method,
            polling_interval: Duration::from_millis(10),
        };

        Fixture {
            arbitrator: DetectionArbitrator::new(
                client,
                detector,
                input,
                Arc::clone(&state),
                Arc::clone(&metrics),
                settings,
            ),
            transport,
            state,
            metrics,
            _lockfile: lockfile,
        }
    }

    const PENDING_READY_CHECK: &str =
        r#"{"state":"InProgress","playerResponse":"None","timer":25.0,"declinerIds":[]}"#;

    #[tokio::test]
    async fn test_api_detects_pending_ready_check() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::Hybrid, capture, idle_pointer());
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"ReadyCheck\"");
        f.transport.respond(READY_CHECK_ENDPOINT, 200, PENDING_READY_CHECK);

        let detection = f.arbitrator.check_for_ready_check().await.unwrap();

        assert_eq!(detection.source, DetectionSource::ClientApi);
        assert!(detection.visual.is_none());
        assert!(f.arbitrator.interpreter().is_ready_check_active());
        assert_eq!(
            f.arbitrator.interpreter().state().ready_check_remaining(),
            Duration::from_secs(25)
        );
        assert_eq!(f.metrics.snapshot().matches_detected, 1);
        assert_eq!(f.state.read(|s| s.total_detections), 1);
        assert_eq!(f.state.read(|s| s.connection_state), ConnectionState::Connected);
        assert_eq!(f.state.read(|s| s.phase), GameflowPhase::ReadyCheck);
    }

    #[tokio::test]
    async fn test_api_without_ready_check_skips_screen() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::Hybrid, capture, idle_pointer());
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"Lobby\"");

        assert!(f.arbitrator.check_for_ready_check().await.is_none());
        assert_eq!(f.transport.calls_to(READY_CHECK_ENDPOINT), 0);
        assert_eq!(f.state.read(|s| s.phase), GameflowPhase::Lobby);
    }

    #[tokio::test]
    async fn test_already_accepted_is_not_a_detection() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::Hybrid, capture, idle_pointer());
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"ReadyCheck\"");
        f.transport.respond(
            READY_CHECK_ENDPOINT,
            200,
            r#"{"state":"InProgress","playerResponse":"Accepted","timer":9.0}"#,
        );

        assert!(f.arbitrator.check_for_ready_check().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_api_falls_back_to_screen_each_poll() {
        let f = fixture(
            DetectionMethod::Hybrid,
            capture_showing(Some(screen_with_button())),
            idle_pointer(),
        );
        let mut arbitrator = f.arbitrator;

        for poll in 1..=3u64 {
            let detection = arbitrator.check_for_ready_check().await.unwrap();
            assert_eq!(detection.source, DetectionSource::VisualDetection);
            assert_eq!(detection.visual.as_ref().unwrap().location, (150, 200));
            assert_eq!(arbitrator.client().failed_request_count(), 3 * poll);
        }

        assert_eq!(f.metrics.failed_requests(), 9);
        assert_eq!(f.metrics.snapshot().matches_detected, 3);
        assert_eq!(arbitrator.client().connection().consecutive_errors(), 3);
    }

    #[tokio::test]
    async fn test_primary_api_never_uses_screen() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::PrimaryApi, capture, idle_pointer());

        assert!(f.arbitrator.check_for_ready_check().await.is_none());
        assert_eq!(f.arbitrator.client().failed_request_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_ui_never_calls_api() {
        let mut f = fixture(
            DetectionMethod::FallbackUi,
            capture_showing(Some(screen_with_button())),
            idle_pointer(),
        );

        let detection = f.arbitrator.check_for_ready_check().await.unwrap();
        assert_eq!(detection.source, DetectionSource::VisualDetection);
        assert!(f.transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_api_accept_falls_back_to_click() {
        let mut pointer = MockPointerInput::new();
        pointer.expect_device_pixel_ratio().return_const(1.0);
        pointer
            .expect_move_to()
            .withf(|x, y| *x == 210 && *y == 220)
            .times(1)
            .returning(|_, _| Ok(()));
        pointer.expect_press_left().times(1).returning(|| Ok(()));
        pointer.expect_release_left().times(1).returning(|| Ok(()));

        let mut f = fixture(
            DetectionMethod::Hybrid,
            capture_showing(Some(screen_with_button())),
            pointer,
        );
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"ReadyCheck\"");
        f.transport.respond(READY_CHECK_ENDPOINT, 200, PENDING_READY_CHECK);

        let outcome = f.arbitrator.poll_once().await.unwrap().unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.method, Some(DetectionSource::VisualDetection));
        assert_eq!(f.transport.calls_to(READY_CHECK_ACCEPT_ENDPOINT), 3);
        assert_eq!(f.metrics.snapshot().matches_accepted, 1);
        assert_eq!(
            f.state.read(|s| s.application_state),
            ApplicationState::Monitoring
        );
    }

    #[tokio::test]
    async fn test_api_accept_succeeds() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::Hybrid, capture, idle_pointer());
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"ReadyCheck\"");
        f.transport.respond(READY_CHECK_ENDPOINT, 200, PENDING_READY_CHECK);
        f.transport.respond(READY_CHECK_ACCEPT_ENDPOINT, 204, "");

        let outcome = f.arbitrator.poll_once().await.unwrap().unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.method, Some(DetectionSource::ClientApi));
        let acceptance = f.state.read(|s| s.last_acceptance.clone()).unwrap();
        assert!(acceptance.success);
    }

    #[tokio::test]
    async fn test_both_paths_failing_reports_error() {
        let mut f = fixture(
            DetectionMethod::Hybrid,
            capture_showing(None),
            idle_pointer(),
        );
        f.transport.respond(GAMEFLOW_PHASE_ENDPOINT, 200, "\"ReadyCheck\"");
        f.transport.respond(READY_CHECK_ENDPOINT, 200, PENDING_READY_CHECK);

        let outcome = f.arbitrator.poll_once().await.unwrap().unwrap();

        assert!(!outcome.success);
        assert!(outcome.method.is_none());
        let error = outcome.error.unwrap();
        assert!(error.contains("api:"), "{}", error);
        assert!(error.contains("ui:"), "{}", error);
        assert_eq!(f.state.read(|s| s.application_state), ApplicationState::Error);
    }

    #[tokio::test]
    async fn test_disabled_poll_is_idle() {
        let mut capture = MockScreenCapture::new();
        capture.expect_capture_screen().never();
        let mut f = fixture(DetectionMethod::Hybrid, capture, idle_pointer());
        f.state.set_auto_accept_enabled(false);

        assert!(f.arbitrator.poll_once().await.unwrap().is_none());
        assert!(f.transport.calls.lock().is_empty());
        assert_eq!(f.state.read(|s| s.application_state), ApplicationState::Idle);
    }

    #[tokio::test]
    async fn test_screen_search_and_click_run_on_blocking_pool() {
        let poll_thread = std::thread::current().id();
        let threads = Arc::new(Mutex::new(Vec::new()));

        let mut capture = MockScreenCapture::new();
        capture.expect_scale_factor().return_const(1.0);
        let seen = Arc::clone(&threads);
        capture.expect_capture_screen().returning(move || {
            seen.lock().push(std::thread::current().id());
            Ok(screen_with_button())
        });

        let mut pointer = MockPointerInput::new();
        pointer.expect_device_pixel_ratio().return_const(1.0);
        let seen = Arc::clone(&threads);
        pointer.expect_move_to().times(1).returning(move |_, _| {
            seen.lock().push(std::thread::current().id());
            Ok(())
        });
        pointer.expect_press_left().times(1).returning(|| Ok(()));
        pointer.expect_release_left().times(1).returning(|| Ok(()));

        let mut f = fixture(DetectionMethod::FallbackUi, capture, pointer);
        let outcome = f.arbitrator.poll_once().await.unwrap().unwrap();

        assert!(outcome.success);
        let threads = threads.lock();
        assert_eq!(threads.len(), 2);
        assert!(threads.iter().all(|id| *id != poll_thread));
    }

    #[tokio::test]
    async fn test_search_region_is_respected() {
        let mut f = fixture(
            DetectionMethod::FallbackUi,
            capture_showing(Some(screen_with_button())),
            idle_pointer(),
        );
        f.arbitrator
            .detector()
            .set_search_region(Some(ScreenRegion::new(0, 0, 120, 120)));

        assert!(f.arbitrator.check_for_ready_check().await.is_none());
    }
}
