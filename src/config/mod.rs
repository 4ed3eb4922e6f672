use crate::models::AppConfig;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Directory name under the per-user config directory.
pub const CONFIG_DIR_NAME: &str = "League-Auto-Accept";

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Configuration manager for loading and saving the YAML settings file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    config_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager for `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
            config_dir,
        })
    }

    /// Manager for an explicit config file path (`--config`).
    pub fn with_file<P: AsRef<Utf8Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let config_dir = match config_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            config_dir,
            config_path,
        })
    }

    /// Per-user default location, falling back to the working directory.
    pub fn default_config_dir() -> Utf8PathBuf {
        dirs::config_dir()
            .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .unwrap_or_else(|| Utf8PathBuf::from(CONFIG_DIR_NAME))
    }

    /// Load the configuration file.
    ///
    /// A missing file yields the defaults, which are written back so the user
    /// has something to edit. Invalid YAML or out-of-range values are errors.
    pub fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            tracing::warn!(
                "Config file not found at {}, writing defaults",
                self.config_path
            );
            let config = AppConfig::default();
            self.save_config(&config)?;
            return Ok(config);
        }

        let file_contents = fs::read_to_string(&self.config_path)
            .with_context(|| format!("Failed to read config: {}", self.config_path))?;

        let config: AppConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse config: {}", self.config_path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config: {}", self.config_path))?;

        tracing::info!("Loaded config from {}", self.config_path);
        Ok(config)
    }

    /// Save the configuration file.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(config).context("Failed to serialize config to YAML")?;

        fs::write(&self.config_path, yaml_string)
            .with_context(|| format!("Failed to write config: {}", self.config_path))?;

        tracing::info!("Saved config to {}", self.config_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }
}
