//! Client for the game client's local HTTPS API.
//!
//! Requests go through the [`LcuTransport`] seam so the retry, reconnect and
//! classification logic can be exercised without a running client. The
//! production transport is [`HttpsTransport`] (reqwest, self-signed
//! certificate accepted, HTTP basic auth).

use crate::metrics::PerformanceMetrics;
use crate::models::{ConnectionInfo, ConnectionState, GameflowPhase, ReadyCheckStatus};
use crate::services::discovery::{ConnectionDiscovery, DiscoveryError};
use crate::services::gameflow::{parse_gameflow_phase, parse_ready_check};
use crate::services::retry::{ErrorKind, LcuError, RetryPolicy, classify_status};
use crate::services::supervisor::sleep_or_shutdown;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

pub const GAMEFLOW_PHASE_ENDPOINT: &str = "/lol-gameflow/v1/gameflow-phase";
pub const READY_CHECK_ENDPOINT: &str = "/lol-matchmaking/v1/ready-check";
pub const READY_CHECK_ACCEPT_ENDPOINT: &str = "/lol-matchmaking/v1/ready-check/accept";
pub const READY_CHECK_DECLINE_ENDPOINT: &str = "/lol-matchmaking/v1/ready-check/decline";

/// Basic-auth user name expected by the client API.
pub const AUTH_USERNAME: &str = "riot";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully resolved request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: HttpMethod,
    pub url: String,
    pub username: &'static str,
    pub password: String,
    pub body: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Connection(String),
}

/// Sends a request and returns the raw status and body.
pub trait LcuTransport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = Result<RawResponse, TransportError>> + Send;
}

/// reqwest-backed transport for the loopback API.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn map_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(error.to_string())
    }
}

impl LcuTransport for HttpsTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        let mut builder = builder
            .basic_auth(request.username, Some(&request.password))
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;

        Ok(RawResponse { status, body })
    }
}

/// Successful response with its round-trip latency.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub latency: Duration,
}

#[derive(Debug, Clone, Default)]
struct RequestStats {
    successful: u64,
    failed: u64,
    total_latency: Duration,
}

/// Authenticated, retrying client for the local API.
///
/// Owns the [`ConnectionInfo`]; it is only touched from the detection loop.
pub struct ApiClient<T: LcuTransport> {
    transport: T,
    discovery: ConnectionDiscovery,
    connection: ConnectionInfo,
    policy: RetryPolicy,
    timeout: Duration,
    metrics: Arc<PerformanceMetrics>,
    stats: RequestStats,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<T: LcuTransport> ApiClient<T> {
    pub fn new(transport: T, discovery: ConnectionDiscovery, metrics: Arc<PerformanceMetrics>) -> Self {
        Self {
            transport,
            discovery,
            connection: ConnectionInfo::new(),
            policy: RetryPolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            metrics,
            stats: RequestStats::default(),
            shutdown: None,
        }
    }

    /// Abort retry waits once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.policy = policy;
    }

    pub fn set_auto_reconnect(&mut self, enabled: bool) {
        self.policy.auto_reconnect = enabled;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Discover the endpoint and mark the connection as connected.
    pub fn connect(&mut self) -> Result<(), DiscoveryError> {
        self.connection.set_state(ConnectionState::Connecting);
        match self.discovery.discover() {
            Ok(mut info) => {
                info.inherit_error_streak(self.connection.consecutive_errors());
                self.connection = info;
                Ok(())
            }
            Err(e) => {
                self.connection.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Drop the current endpoint and discover it again.
    pub fn reconnect(&mut self) -> bool {
        match self.connect() {
            Ok(()) => {
                tracing::info!("Reconnected to client API on port {}", self.connection.port());
                true
            }
            Err(e) => {
                tracing::debug!("Reconnect failed: {}", e);
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.connection.set_state(ConnectionState::Disconnected);
    }

    /// Disconnect when the process owning the endpoint has exited.
    ///
    /// Returns whether the connection is still usable.
    pub fn verify_owner(&mut self) -> bool {
        if !self.connection.is_connected() {
            return false;
        }
        if self.discovery.is_owner_alive(self.connection.process_id()) {
            return true;
        }
        tracing::warn!(
            "Client process {} exited, dropping connection",
            self.connection.process_id()
        );
        self.disconnect();
        false
    }

    /// One attempt, bounded by the request timeout.
    pub async fn request(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<String>,
    ) -> Result<ApiResponse, LcuError> {
        let url = self
            .connection
            .full_url(endpoint)
            .ok_or_else(|| LcuError::Connection("not connected to client API".to_string()))?;

        let request = TransportRequest {
            method,
            url,
            username: AUTH_USERNAME,
            password: self.connection.auth_token().to_string(),
            body,
            timeout: self.timeout,
        };

        let started = Instant::now();
        let raw = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                return Err(LcuError::Timeout(self.timeout));
            }
            Ok(Err(TransportError::Connection(message))) => {
                return Err(LcuError::Connection(message));
            }
            Ok(Ok(raw)) => raw,
        };
        let latency = started.elapsed();

        if let Some(error) = classify_status(raw.status, endpoint, &raw.body) {
            return Err(error);
        }

        Ok(ApiResponse {
            status: raw.status,
            body: raw.body,
            latency,
        })
    }

    /// Issue a request within the retry budget.
    ///
    /// Every failed attempt is counted. Connection failures try to
    /// rediscover the endpoint and retry immediately; other retryable
    /// failures wait `retry_delay`. An exhausted budget extends the
    /// connection's error streak.
    pub async fn request_with_retry(
        &mut self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<String>,
    ) -> Result<ApiResponse, LcuError> {
        let mut attempt = 0;

        loop {
            let error = match self.request(method, endpoint, body.clone()).await {
                Ok(response) => {
                    self.connection.update_last_successful_request();
                    self.stats.successful += 1;
                    self.stats.total_latency += response.latency;
                    self.metrics.record_request_success(response.latency);
                    return Ok(response);
                }
                Err(error) if !error.is_failure() => return Err(error),
                Err(error) => error,
            };

            self.stats.failed += 1;
            self.metrics.record_request_failure(&error.to_string());
            tracing::debug!(
                "{} attempt {}/{} failed: {}",
                endpoint,
                attempt + 1,
                self.policy.max_attempts,
                error
            );

            let kind = error.kind();
            if kind == ErrorKind::Authentication {
                tracing::warn!("Client API rejected credentials, rediscovering on next poll");
                self.disconnect();
                return Err(error);
            }

            if !self.policy.is_retryable(kind) || !self.policy.has_attempts_left(attempt) {
                self.connection.increment_connection_errors();
                return Err(error);
            }
            attempt += 1;

            if self.policy.triggers_reconnect(kind) && self.reconnect() {
                continue;
            }

            if self.wait_before_retry().await {
                tracing::debug!("Shutdown requested, abandoning retries for {}", endpoint);
                return Err(error);
            }
        }
    }

    /// Returns `true` when shutdown interrupted the wait.
    async fn wait_before_retry(&mut self) -> bool {
        let delay = self.policy.retry_delay;
        match self.shutdown.as_mut() {
            Some(shutdown) => sleep_or_shutdown(delay, shutdown).await,
            None => {
                tokio::time::sleep(delay).await;
                false
            }
        }
    }

    pub async fn get_gameflow_phase(&mut self) -> Result<GameflowPhase, LcuError> {
        let response = self
            .request_with_retry(HttpMethod::Get, GAMEFLOW_PHASE_ENDPOINT, None)
            .await?;
        parse_gameflow_phase(&response.body)
    }

    pub async fn get_ready_check_status(&mut self) -> Result<ReadyCheckStatus, LcuError> {
        let response = self
            .request_with_retry(HttpMethod::Get, READY_CHECK_ENDPOINT, None)
            .await?;
        Ok(parse_ready_check(&response.body))
    }

    pub async fn accept_ready_check(&mut self) -> Result<(), LcuError> {
        self.request_with_retry(HttpMethod::Post, READY_CHECK_ACCEPT_ENDPOINT, None)
            .await
            .map(|_| ())
    }

    pub async fn decline_ready_check(&mut self) -> Result<(), LcuError> {
        self.request_with_retry(HttpMethod::Post, READY_CHECK_DECLINE_ENDPOINT, None)
            .await
            .map(|_| ())
    }

    pub fn successful_request_count(&self) -> u64 {
        self.stats.successful
    }

    pub fn failed_request_count(&self) -> u64 {
        self.stats.failed
    }

    pub fn average_latency(&self) -> Duration {
        if self.stats.successful == 0 {
            Duration::ZERO
        } else {
            self.stats.total_latency / self.stats.successful as u32
        }
    }
}
