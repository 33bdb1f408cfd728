//! `config.toml` for the `f13` binary.
//!
//! ```toml
//! base_url = "http://localhost:5000/api"
//! session_dir = "/home/me/.local/share/f13"   # optional
//! request_timeout_secs = 30
//! refresh_timeout_secs = 30
//! ```
//!
//! A missing file is the default configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use f13_client::ClientConfig;
use f13_client::config::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_dir: None,
            request_timeout_secs: 30,
            refresh_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("f13").join("config.toml"))
    }

    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf).or_else(Self::default_path)
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = Self::resolve_path(path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Overwrite the config file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path).context("no config directory available")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, Self::default().show()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Directory holding the persisted session.
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("f13")))
            .unwrap_or_else(|| PathBuf::from(".f13"))
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::builder()
            .base_url(self.base_url.clone())
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .refresh_timeout(Duration::from_secs(self.refresh_timeout_secs))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("config.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = \"https://f13.example/api\"\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.base_url, "https://f13.example/api");
        assert_eq!(config.refresh_timeout_secs, 30);

        let client = config.client_config();
        assert_eq!(client.base_url, "https://f13.example/api");
        assert_eq!(client.refresh_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_reset_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "request_timeout_secs = \"soon\"").unwrap();

        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
