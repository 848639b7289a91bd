//! Unified path management for configuration and user data.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/bazhi-guru/        # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/bazhi-guru/   # Data directory
//! └── users/                   # Per-user document files
//!     └── <user-id>.json
//! ```

use bazhi_core::error::{GuruError, Result};
use std::path::PathBuf;

const APP_DIR: &str = "bazhi-guru";

/// Unified path resolution, XDG-style on Linux/macOS.
pub struct GuruPaths;

impl GuruPaths {
    /// Returns the configuration directory, creating nothing.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: e.g. `~/.config/bazhi-guru/`
    /// - `Err(GuruError::Config)`: home directory could not be determined
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| GuruError::config("cannot find config directory"))
    }

    /// Returns the data directory (larger per-user documents live here).
    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| GuruError::config("cannot find data directory"))
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the directory holding per-user document files.
    pub fn users_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("users"))
    }
}
