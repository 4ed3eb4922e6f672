use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Consecutive connection-class failures tolerated before the connection is
/// forced into [`ConnectionState::Error`].
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Loopback host the client API listens on.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Connection lifecycle of the local client API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Error => "ERROR",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Endpoint, credentials and health of the local client API.
///
/// When the state is [`ConnectionState::Connected`] the port, token and base
/// URL are always populated. Moving to `Disconnected` or `Error` clears them so
/// no stale credentials survive a lost connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionInfo {
    port: u16,
    auth_token: String,
    process_id: u32,
    base_url: String,
    state: ConnectionState,
    lockfile_path: Option<Utf8PathBuf>,
    last_successful_request: Option<Instant>,
    consecutive_errors: u32,
}

impl ConnectionInfo {
    /// A disconnected, empty connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// A connected endpoint discovered from an authentication file.
    pub fn connected(
        port: u16,
        auth_token: impl Into<String>,
        process_id: u32,
        lockfile_path: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            port,
            auth_token: auth_token.into(),
            process_id,
            base_url: format!("https://{}:{}", LOOPBACK_HOST, port),
            state: ConnectionState::Connected,
            lockfile_path,
            last_successful_request: None,
            consecutive_errors: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn lockfile_path(&self) -> Option<&Utf8PathBuf> {
        self.lockfile_path.as_ref()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn last_successful_request(&self) -> Option<Instant> {
        self.last_successful_request
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Move to `state`, clearing credentials when the connection is lost.
    pub fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!("Connection state {} -> {}", self.state, state);
        }
        self.state = state;

        if matches!(state, ConnectionState::Disconnected | ConnectionState::Error) {
            self.base_url.clear();
            self.auth_token.clear();
            self.process_id = 0;
            self.port = 0;
        }
    }

    /// Absolute URL for an endpoint path, or `None` when not connected.
    pub fn full_url(&self, endpoint: &str) -> Option<String> {
        if !self.is_connected() || self.base_url.is_empty() {
            return None;
        }
        if endpoint.starts_with('/') {
            Some(format!("{}{}", self.base_url, endpoint))
        } else {
            Some(format!("{}/{}", self.base_url, endpoint))
        }
    }

    /// Record a successful request; this also ends any error streak.
    pub fn update_last_successful_request(&mut self) {
        self.last_successful_request = Some(Instant::now());
        self.clear_connection_errors();
    }

    /// Count a connection-class failure. Returns `true` if the streak just
    /// forced the connection into the error state.
    pub fn increment_connection_errors(&mut self) -> bool {
        self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS && self.state != ConnectionState::Error {
            tracing::warn!(
                "{} consecutive connection errors, marking connection as failed",
                self.consecutive_errors
            );
            self.set_state(ConnectionState::Error);
            return true;
        }
        false
    }

    pub fn clear_connection_errors(&mut self) {
        self.consecutive_errors = 0;
    }

    /// Carry an existing error streak over to a freshly discovered connection.
    pub(crate) fn inherit_error_streak(&mut self, consecutive_errors: u32) {
        self.consecutive_errors = consecutive_errors;
    }

    /// Whether the last successful request happened within `max_age`.
    pub fn is_recent(&self, max_age: Duration) -> bool {
        self.last_successful_request
            .is_some_and(|at| at.elapsed() <= max_age)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connected_populates_endpoint() {
        let info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        assert!(info.is_connected());
        assert_eq!(info.base_url(), "https://127.0.0.1:2999");
        assert_eq!(info.port(), 2999);
        assert_eq!(info.auth_token(), "abc123");
        assert_eq!(info.process_id(), 1234);
    }

    #[test]
    fn test_disconnect_clears_credentials() {
        let mut info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        info.set_state(ConnectionState::Disconnected);

        assert!(!info.is_connected());
        assert!(info.base_url().is_empty());
        assert!(info.auth_token().is_empty());
        assert_eq!(info.port(), 0);
        assert_eq!(info.process_id(), 0);
    }

    #[test]
    fn test_error_streak_forces_error_state() {
        let mut info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        for _ in 0..MAX_CONSECUTIVE_ERRORS - 1 {
            assert!(!info.increment_connection_errors());
        }
        assert!(info.is_connected());

        assert!(info.increment_connection_errors());
        assert_eq!(info.state(), ConnectionState::Error);
        assert!(info.auth_token().is_empty());
    }

    #[test]
    fn test_successful_request_clears_streak() {
        let mut info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        info.increment_connection_errors();
        info.increment_connection_errors();
        info.update_last_successful_request();

        assert_eq!(info.consecutive_errors(), 0);
        assert!(info.is_recent(Duration::from_secs(5)));
    }

    #[test]
    fn test_clear_errors_is_idempotent() {
        let mut info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        info.increment_connection_errors();
        info.clear_connection_errors();
        info.clear_connection_errors();
        assert_eq!(info.consecutive_errors(), 0);
    }

    #[test]
    fn test_full_url() {
        let info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        assert_eq!(
            info.full_url("/lol-gameflow/v1/gameflow-phase").as_deref(),
            Some("https://127.0.0.1:2999/lol-gameflow/v1/gameflow-phase")
        );
        assert_eq!(
            info.full_url("lol-gameflow/v1/gameflow-phase").as_deref(),
            Some("https://127.0.0.1:2999/lol-gameflow/v1/gameflow-phase")
        );
        assert_eq!(ConnectionInfo::new().full_url("/x"), None);
    }

    #[test]
    fn test_never_recent_without_success() {
        let info = ConnectionInfo::connected(2999, "abc123", 1234, None);
        assert!(!info.is_recent(Duration::from_secs(60)));
    }
}
