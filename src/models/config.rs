use crate::models::vision::ScreenRegion;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

pub const POLLING_INTERVAL_RANGE_MS: RangeInclusive<u64> = 100..=5000;
pub const LCU_TIMEOUT_RANGE_MS: RangeInclusive<u64> = 1000..=10000;
pub const UI_SCALE_RANGE: RangeInclusive<f64> = 0.5..=3.0;
pub const MATCH_THRESHOLD_RANGE: RangeInclusive<f64> = 0.6..=0.95;
pub const MAX_RETRIES_RANGE: RangeInclusive<u32> = 1..=9;
pub const RETRY_DELAY_RANGE_MS: RangeInclusive<u64> = 0..=5000;

static HOTKEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:CTRL|ALT|SHIFT)\+F9|F(?:9|1[0-2]))$").expect("Invalid hotkey regex")
});

/// How ready checks are detected and accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Client API only.
    #[serde(alias = "primary_lcu")]
    PrimaryApi,
    /// Screen matching and synthetic clicks only.
    FallbackUi,
    /// Client API first, screen matching when the API is unreachable.
    #[default]
    Hybrid,
}

impl DetectionMethod {
    pub fn uses_api(&self) -> bool {
        matches!(self, DetectionMethod::PrimaryApi | DetectionMethod::Hybrid)
    }

    pub fn uses_visual(&self) -> bool {
        matches!(self, DetectionMethod::FallbackUi | DetectionMethod::Hybrid)
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::PrimaryApi => f.write_str("primary_api"),
            DetectionMethod::FallbackUi => f.write_str("fallback_ui"),
            DetectionMethod::Hybrid => f.write_str("hybrid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Smallest accepted step of a scale sweep.
pub const MIN_SCALE_STEP: f64 = 0.01;
/// Upper bound on the number of scales one search may try.
pub const MAX_SCALE_STEPS: usize = 41;

/// Scale sweep for multi-scale template matching.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ScaleRange {
    /// Number of evenly spaced scales from `min` to `max`, before 1.0 is added.
    pub fn step_count(&self) -> usize {
        if self.step <= 0.0 || self.min > self.max {
            return 1;
        }
        ((self.max - self.min) / self.step + 1e-9).floor() as usize + 1
    }
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self {
            min: 0.8,
            max: 1.2,
            step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{field} = {value} is outside the allowed range {range}")]
    OutOfRange {
        field: &'static str,
        value: String,
        range: String,
    },

    #[error("Invalid emergency hotkey '{0}' (expected F9-F12, CTRL+F9, ALT+F9 or SHIFT+F9)")]
    InvalidHotkey(String),

    #[error("Invalid scale range: {0}")]
    InvalidScaleRange(String),
}

/// Persisted application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auto_accept_enabled: bool,
    pub detection_method: DetectionMethod,
    /// Poll interval in milliseconds.
    pub polling_interval: u64,
    /// Per-request timeout in milliseconds.
    pub lcu_timeout: u64,
    pub ui_scale_factor: f64,
    pub template_match_threshold: f64,
    pub multi_scale_matching: bool,
    pub scale_range: ScaleRange,
    pub search_region: Option<ScreenRegion>,
    pub template_path: Option<String>,
    pub enable_notifications: bool,
    pub enable_sound: bool,
    pub emergency_hotkey: String,
    pub startup_enabled: bool,
    pub log_level: LogLevel,
    /// Total attempts per request.
    pub max_retries: u32,
    /// Wait between attempts in milliseconds.
    pub retry_delay: u64,
    pub auto_reconnect: bool,
    /// Candidate authentication files, tried in order.
    pub lockfile_paths: Vec<String>,
    /// Only accept authentication files with this label.
    pub client_label: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auto_accept_enabled: true,
            detection_method: DetectionMethod::Hybrid,
            polling_interval: 500,
            lcu_timeout: 5000,
            ui_scale_factor: 1.0,
            template_match_threshold: 0.8,
            multi_scale_matching: false,
            scale_range: ScaleRange::default(),
            search_region: None,
            template_path: None,
            enable_notifications: true,
            enable_sound: false,
            emergency_hotkey: "F9".to_string(),
            startup_enabled: false,
            log_level: LogLevel::Info,
            max_retries: 3,
            retry_delay: 100,
            auto_reconnect: true,
            lockfile_paths: default_lockfile_paths(),
            client_label: None,
        }
    }
}

impl AppConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval)
    }

    pub fn lcu_timeout(&self) -> Duration {
        Duration::from_millis(self.lcu_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    /// Check every bounded option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("polling_interval", self.polling_interval, &POLLING_INTERVAL_RANGE_MS)?;
        check_range("lcu_timeout", self.lcu_timeout, &LCU_TIMEOUT_RANGE_MS)?;
        check_range("ui_scale_factor", self.ui_scale_factor, &UI_SCALE_RANGE)?;
        check_range(
            "template_match_threshold",
            self.template_match_threshold,
            &MATCH_THRESHOLD_RANGE,
        )?;
        check_range("max_retries", self.max_retries, &MAX_RETRIES_RANGE)?;
        check_range("retry_delay", self.retry_delay, &RETRY_DELAY_RANGE_MS)?;

        if !is_valid_hotkey(&self.emergency_hotkey) {
            return Err(ConfigError::InvalidHotkey(self.emergency_hotkey.clone()));
        }

        let scales = &self.scale_range;
        if !(scales.min > 0.0 && scales.min <= scales.max && scales.step >= MIN_SCALE_STEP) {
            return Err(ConfigError::InvalidScaleRange(format!(
                "min {} max {} step {}",
                scales.min, scales.max, scales.step
            )));
        }
        if scales.step_count() > MAX_SCALE_STEPS {
            return Err(ConfigError::InvalidScaleRange(format!(
                "{} scales exceed the limit of {}",
                scales.step_count(),
                MAX_SCALE_STEPS
            )));
        }

        Ok(())
    }
}

pub fn is_valid_hotkey(hotkey: &str) -> bool {
    HOTKEY_PATTERN.is_match(&hotkey.to_ascii_uppercase())
}

fn check_range<T>(field: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + fmt::Debug,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value: format!("{:?}", value),
            range: format!("{:?}", range),
        })
    }
}

/// Where the game client and the launcher write their authentication files.
pub fn default_lockfile_paths() -> Vec<String> {
    let mut paths = vec!["C:/Riot Games/League of Legends/lockfile".to_string()];
    if let Some(local) = dirs::data_local_dir() {
        let launcher = local.join("Riot Games").join("Riot Client").join("Config").join("lockfile");
        paths.push(launcher.to_string_lossy().into_owned());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection_method, DetectionMethod::Hybrid);
        assert_eq!(config.polling_interval(), Duration::from_millis(500));
        assert_eq!(config.template_match_threshold, 0.8);
    }

    #[test]
    fn test_out_of_range_values_rejected() {
        let config = AppConfig {
            polling_interval: 50,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { field: "polling_interval", .. })
        ));

        let config = AppConfig {
            template_match_threshold: 0.99,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            ui_scale_factor: 3.5,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scale_range_bounded() {
        let config = AppConfig {
            scale_range: ScaleRange {
                min: 0.8,
                max: 1.2,
                step: 0.0001,
            },
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScaleRange(_))));

        let config = AppConfig {
            scale_range: ScaleRange {
                min: 0.5,
                max: 3.0,
                step: 0.01,
            },
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidScaleRange(_))));

        let config = AppConfig {
            scale_range: ScaleRange {
                min: 0.6,
                max: 1.4,
                step: 0.02,
            },
            ..AppConfig::default()
        };
        assert_eq!(config.scale_range.step_count(), 41);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_hotkey_validation() {
        for key in ["F9", "F10", "F11", "F12", "CTRL+F9", "alt+f9", "SHIFT+F9"] {
            assert!(is_valid_hotkey(key), "{key} should be accepted");
        }
        for key in ["F8", "CTRL+F10", "F13", "", "F9 "] {
            assert!(!is_valid_hotkey(key), "{key} should be rejected");
        }
    }

    #[test]
    fn test_detection_method_aliases() {
        let method: DetectionMethod = serde_yaml_ng::from_str("primary_lcu").unwrap();
        assert_eq!(method, DetectionMethod::PrimaryApi);
        let method: DetectionMethod = serde_yaml_ng::from_str("fallback_ui").unwrap();
        assert_eq!(method, DetectionMethod::FallbackUi);
        assert!(DetectionMethod::Hybrid.uses_api() && DetectionMethod::Hybrid.uses_visual());
    }

    #[test]
    fn test_log_level_filter() {
        assert_eq!(LogLevel::Warning.as_filter(), "warn");
        let level: LogLevel = serde_yaml_ng::from_str("warning").unwrap();
        assert_eq!(level, LogLevel::Warning);
    }
}
