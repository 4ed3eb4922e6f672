//! Locating the local client API through its authentication file.
//!
//! The running client writes a single line
//! `<label>:<pid>:<port>:<token>:<protocol>` to a well-known location. A file
//! is only trusted when every field is well-formed and the owning process is
//! still alive.

use crate::models::ConnectionInfo;
use crate::platform::ProcessQuery;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Only TLS endpoints are accepted.
pub const SUPPORTED_PROTOCOL: &str = "https";

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("No authentication file found (searched: {0})")]
    NotFound(String),

    #[error("Failed to read authentication file {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed authentication file: expected 5 fields, found {0}")]
    FieldCount(usize),

    #[error("Invalid {field} in authentication file: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("Unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    #[error("Authentication file belongs to '{found}', expected '{expected}'")]
    LabelMismatch { expected: String, found: String },

    #[error("Process {0} owning the authentication file is not running")]
    ProcessNotRunning(u32),
}

/// Parsed contents of an authentication file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockfileEntry {
    pub label: String,
    pub process_id: u32,
    pub port: u16,
    pub auth_token: String,
    pub protocol: String,
}

/// Parse the first line of an authentication file, validating every field.
/// Anything after the first line break is ignored.
pub fn parse_lockfile_line(contents: &str) -> Result<LockfileEntry, DiscoveryError> {
    let line = contents.lines().next().unwrap_or("");
    let fields: Vec<&str> = line.trim().split(':').collect();
    if fields.len() != 5 {
        return Err(DiscoveryError::FieldCount(fields.len()));
    }

    let label = fields[0];
    if label.is_empty() {
        return Err(DiscoveryError::InvalidField {
            field: "label",
            value: label.to_string(),
        });
    }

    let process_id = fields[1]
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| DiscoveryError::InvalidField {
            field: "process id",
            value: fields[1].to_string(),
        })?;

    let port = fields[2]
        .parse::<u16>()
        .ok()
        .filter(|port| *port > 0)
        .ok_or_else(|| DiscoveryError::InvalidField {
            field: "port",
            value: fields[2].to_string(),
        })?;

    let auth_token = fields[3];
    if auth_token.is_empty() {
        return Err(DiscoveryError::InvalidField {
            field: "token",
            value: String::new(),
        });
    }

    let protocol = fields[4];
    if protocol != SUPPORTED_PROTOCOL {
        return Err(DiscoveryError::UnsupportedProtocol(protocol.to_string()));
    }

    Ok(LockfileEntry {
        label: label.to_string(),
        process_id,
        port,
        auth_token: auth_token.to_string(),
        protocol: protocol.to_string(),
    })
}

/// Finds a live client endpoint among candidate authentication files.
#[derive(Clone)]
pub struct ConnectionDiscovery {
    lockfile_paths: Vec<Utf8PathBuf>,
    client_label: Option<String>,
    processes: Arc<dyn ProcessQuery>,
}

impl ConnectionDiscovery {
    pub fn new(lockfile_paths: Vec<Utf8PathBuf>, processes: Arc<dyn ProcessQuery>) -> Self {
        Self {
            lockfile_paths,
            client_label: None,
            processes,
        }
    }

    /// Only accept authentication files written under `label`.
    pub fn with_client_label(mut self, label: Option<String>) -> Self {
        self.client_label = label.filter(|l| !l.is_empty());
        self
    }

    pub fn lockfile_paths(&self) -> &[Utf8PathBuf] {
        &self.lockfile_paths
    }

    /// Try every candidate in order and return the first live endpoint.
    ///
    /// When no candidate exists, [`DiscoveryError::NotFound`] is returned;
    /// otherwise the error of the last candidate that exists.
    pub fn discover(&self) -> Result<ConnectionInfo, DiscoveryError> {
        let mut last_error = None;

        for path in &self.lockfile_paths {
            if !path.exists() {
                continue;
            }
            match self.discover_path(path) {
                Ok(info) => return Ok(info),
                Err(e) => {
                    tracing::debug!("Skipping authentication file {}: {}", path, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            let searched = self
                .lockfile_paths
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            DiscoveryError::NotFound(searched)
        }))
    }

    /// Read and validate a single authentication file.
    pub fn discover_path(&self, path: &Utf8Path) -> Result<ConnectionInfo, DiscoveryError> {
        let contents = fs::read_to_string(path).map_err(|source| DiscoveryError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let entry = parse_lockfile_line(&contents)?;

        if let Some(expected) = &self.client_label {
            if &entry.label != expected {
                return Err(DiscoveryError::LabelMismatch {
                    expected: expected.clone(),
                    found: entry.label,
                });
            }
        }

        if !self.processes.is_process_running(entry.process_id) {
            return Err(DiscoveryError::ProcessNotRunning(entry.process_id));
        }

        tracing::info!(
            "Discovered client API '{}' on port {} (pid {})",
            entry.label,
            entry.port,
            entry.process_id
        );

        Ok(ConnectionInfo::connected(
            entry.port,
            entry.auth_token,
            entry.process_id,
            Some(path.to_path_buf()),
        ))
    }

    /// Whether the process owning a discovered endpoint is still alive.
    pub fn is_owner_alive(&self, process_id: u32) -> bool {
        self.processes.is_process_running(process_id)
    }
}
