/// Application configuration management
/// Stores defaults in ~/.config/backupbot/config.toml

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::executor::ExecOptions;
use crate::utils::constants::{
    DEFAULT_EXEC_RETRY_INTERVAL_MS, DEFAULT_EXEC_TIMEOUT_SECS, DEFAULT_HELPER_IMAGE, DEFAULT_STOP_TIMEOUT_SECS,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Image used for tar-based helper containers
    pub helper_image: String,
    /// Parent of the per-task staging directories (system temp dir if unset)
    pub staging_root: Option<PathBuf>,
    pub exec_timeout_secs: u64,
    pub exec_retry_interval_ms: u64,
    pub stop_timeout_secs: i64,
    /// Rotate the major instead of the minor version
    pub update_major: bool,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            helper_image: DEFAULT_HELPER_IMAGE.to_string(),
            staging_root: None,
            exec_timeout_secs: DEFAULT_EXEC_TIMEOUT_SECS,
            exec_retry_interval_ms: DEFAULT_EXEC_RETRY_INTERVAL_MS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
            update_major: false,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Get default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("backupbot");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the default config file, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load an explicitly given config file; it must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("Config file not found at {}", path.display()));
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn exec_options(&self) -> ExecOptions {
        ExecOptions {
            timeout: Duration::from_secs(self.exec_timeout_secs),
            retry_interval: Duration::from_millis(self.exec_retry_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "helper_image = \"busybox:1.36\"\nupdate_major = true\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.helper_image, "busybox:1.36");
        assert!(config.update_major);
        assert_eq!(config.exec_timeout_secs, DEFAULT_EXEC_TIMEOUT_SECS);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let config = AppConfig {
            staging_root: Some(tmp.path().join("staging")),
            exec_timeout_secs: 30,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
        assert_eq!(config.exec_options().timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        assert!(AppConfig::load_from(Path::new("/nonexistent/backupbot.toml")).is_err());
    }
}
