//! # Configuration Module
//!
//! This module handles configuration management and data directory setup for
//! the catalog tools.
//!
//! ## Data Storage
//!
//! The catalog database lives in the platform-standard data directory:
//! - Linux: `~/.local/share/mutopia/catalog.db`
//! - macOS: `~/Library/Application Support/mutopia/catalog.db`
//! - Windows: `%APPDATA%\mutopia\catalog.db`
//!
//! ## Runtime Configuration
//!
//! Everything else is read from an optional TOML file. Missing keys fall back
//! to their defaults:
//!
//! ```toml
//! db_path = "/srv/mutopia/catalog.db"
//! base_url = "http://www.mutopiaproject.org/ftp"
//! connect_timeout_secs = 10
//! read_timeout_secs = 30
//! min_instrument_token_len = 3
//! instrument_separator = '\W+'
//! ```

use crate::instruments::{MIN_TOKEN_LEN, TOKEN_SEPARATOR};
use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root of the published archive that descriptors are fetched from.
pub const DEFAULT_BASE_URL: &str = "http://www.mutopiaproject.org/ftp";

/// Returns the platform-appropriate database file path.
///
/// The `mutopia` subdirectory of the system data directory is created if it
/// doesn't exist.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The mutopia subdirectory cannot be created due to permissions
pub fn get_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let catalog_dir = data_dir.join("mutopia");
    fs::create_dir_all(&catalog_dir).with_context(|| {
        format!(
            "Failed to create catalog data directory at {}. Please check file permissions.",
            catalog_dir.display()
        )
    })?;

    Ok(catalog_dir.join("catalog.db"))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Root URL of the published archive
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Instrument tokens shorter than this are ignored
    pub min_instrument_token_len: usize,
    /// Regex separating instrument tokens in raw instrument text
    pub instrument_separator: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: get_db_path().unwrap_or_else(|_| PathBuf::from("catalog.db")),
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            min_instrument_token_len: MIN_TOKEN_LEN,
            instrument_separator: TOKEN_SEPARATOR.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file, or the defaults when `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid
    /// configuration. A missing file is an error too; only `None` falls back
    /// to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("Invalid config file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration text. Keys that are absent keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid TOML or a value of the wrong type.
    ///
    /// # Examples
    ///
    /// ```
    /// use mutopia::config::RuntimeConfig;
    ///
    /// let config = RuntimeConfig::from_toml("read_timeout_secs = 5")?;
    /// assert_eq!(config.read_timeout_secs, 5);
    /// assert_eq!(config.min_instrument_token_len, 3);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Create configuration with explicit database path
    #[must_use]
    pub fn with_db_path(mut self, db_path: &Path) -> Self {
        self.db_path = db_path
            .absolutize()
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| db_path.to_path_buf());
        self
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_db_path_returns_valid_path() {
        let path = get_db_path().expect("data directory should be available");
        assert_eq!(path.file_name().unwrap(), "catalog.db");

        let parent = path.parent().expect("Database path should have parent");
        assert_eq!(parent.file_name().unwrap(), "mutopia");
        assert!(parent.is_dir());
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.min_instrument_token_len, 3);
        assert_eq!(config.instrument_separator, r"\W+");
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml(
            "base_url = \"http://mirror.test/ftp\"\nmin_instrument_token_len = 4\n",
        )
        .unwrap();
        assert_eq!(config.base_url, "http://mirror.test/ftp");
        assert_eq!(config.min_instrument_token_len, 4);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        assert!(RuntimeConfig::from_toml("read_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn test_with_db_path_is_absolute() {
        let config = RuntimeConfig::default().with_db_path(Path::new("relative/catalog.db"));
        assert!(config.db_path.is_absolute());
        assert!(config.db_path.ends_with("relative/catalog.db"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mutopia.toml");
        fs::write(&path, "read_timeout_secs = 5\n").unwrap();
        let config = RuntimeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.read_timeout(), Duration::from_secs(5));

        assert!(RuntimeConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
