//! Application configuration.
//!
//! Loaded from `~/.config/bazhi-guru/config.toml`; a missing or empty
//! file means defaults. Defaults reproduce the deployed client's
//! constants (relay endpoint, `deepseek-chat`, the temperature split
//! between translation and consultation, the 2000-token reply budget).

use crate::paths::GuruPaths;
use bazhi_core::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Environment variable overriding the relay endpoint.
pub const RELAY_URL_ENV: &str = "BAZHI_RELAY_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat-completions relay endpoint (the key-holding proxy).
    pub relay_url: String,
    /// Model name forwarded to the relay.
    pub model_name: String,
    /// Sampling temperature for both translation directions. Low, for
    /// accuracy.
    pub translation_temperature: f32,
    /// Sampling temperature for the consultation itself. Balanced, for
    /// expertise.
    pub guru_temperature: f32,
    /// Sampling temperature for the structured elemental extraction.
    pub extraction_temperature: f32,
    /// Token budget for translations and consultations.
    pub reply_max_tokens: u32,
    /// Token budget for the full profile analysis.
    pub analysis_max_tokens: u32,
    /// Per-request timeout, seconds.
    pub request_timeout_secs: u64,
    /// How long a programmatic hash write may wait for its echo before
    /// the guard expires, milliseconds.
    pub hash_guard_ttl_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay_url: "https://bazhi-backend.vercel.app/api/chat".to_string(),
            model_name: "deepseek-chat".to_string(),
            translation_temperature: 0.3,
            guru_temperature: 0.7,
            extraction_temperature: 0.2,
            reply_max_tokens: 2000,
            analysis_max_tokens: 4096,
            request_timeout_secs: 60,
            hash_guard_ttl_ms: 1500,
        }
    }
}

impl AppConfig {
    /// Loads configuration from the default path, then applies
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = GuruPaths::config_file()?;
        Ok(Self::load_from(&path)?.with_env_overrides())
    }

    /// Loads configuration from a specific file.
    ///
    /// # Returns
    ///
    /// - `Ok(AppConfig)`: Parsed config, or defaults when the file is
    ///   missing or empty
    /// - `Err(_)`: The file exists but cannot be read or parsed
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Applies environment overrides (currently just the relay URL).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(RELAY_URL_ENV) {
            if !url.trim().is_empty() {
                self.relay_url = url;
            }
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn hash_guard_ttl(&self) -> Duration {
        Duration::from_millis(self.hash_guard_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model_name, "deepseek-chat");
        assert!((config.translation_temperature - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "relay_url = \"http://localhost:8787/api/chat\"\n").unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.relay_url, "http://localhost:8787/api/chat");
        assert_eq!(config.reply_max_tokens, 2000);
        assert_eq!(config.analysis_max_tokens, 4096);
    }

    #[test]
    fn garbage_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "relay_url = [not toml").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
