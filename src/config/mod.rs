//! Configuration management.
//!
//! Configuration resolves in three layers, weakest first: built-in
//! defaults, a TOML config file, then `FABULA_*` environment variables.

use serde::Deserialize;
use std::path::PathBuf;

/// Default similarity threshold for entity resolution.
const DEFAULT_SIMILARITY_THRESHOLD: f64 = crate::services::DEFAULT_SIMILARITY_THRESHOLD;

/// Main configuration for fabula.
#[derive(Debug, Clone)]
pub struct FabulaConfig {
    /// Path to the data directory holding the `SQLite` database.
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`.
    pub database_file: String,
    /// Entity-resolution similarity threshold, 0.0 to 1.0.
    pub similarity_threshold: f64,
    /// Emit logs as JSON instead of human-readable lines.
    pub log_json: bool,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Database file name.
    pub database_file: Option<String>,
    /// Entity-resolution similarity threshold.
    pub similarity_threshold: Option<f64>,
    /// JSON log output.
    pub log_json: Option<bool>,
}

impl Default for FabulaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fabula"),
            database_file: "fabula.db".to_string(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            log_json: false,
        }
    }
}

impl FabulaConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path, then applies env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file).with_env_overrides())
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/fabula/` on macOS)
    /// 2. XDG config dir (`~/.config/fabula/` for Unix compatibility)
    ///
    /// Returns default configuration (plus env overrides) if no config
    /// file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default().with_env_overrides();
        };

        // Check platform-specific config dir first
        let platform_config = base_dirs.config_dir().join("fabula").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        // Fall back to XDG-style ~/.config/fabula/ for Unix compatibility
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("fabula")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default().with_env_overrides()
    }

    /// Converts a `ConfigFile` to `FabulaConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Some(database_file) = file.database_file {
            config.database_file = database_file;
        }
        if let Some(threshold) = file.similarity_threshold {
            config.similarity_threshold = threshold.clamp(0.0, 1.0);
        }
        if let Some(log_json) = file.log_json {
            config.log_json = log_json;
        }

        config
    }

    /// Applies `FABULA_*` environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(data_dir) = std::env::var("FABULA_DATA_DIR") {
            if !data_dir.is_empty() {
                self.data_dir = PathBuf::from(data_dir);
            }
        }
        if let Ok(log_json) = std::env::var("FABULA_LOG_JSON") {
            self.log_json = matches!(log_json.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Full path of the database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FabulaConfig::default();
        assert_eq!(config.data_dir, PathBuf::from(".fabula"));
        assert_eq!(config.database_path(), PathBuf::from(".fabula/fabula.db"));
        assert!(!config.log_json);
    }

    #[test]
    fn test_config_file_overrides_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            data_dir = "/var/lib/fabula"
            similarity_threshold = 0.9
            log_json = true
            "#,
        )
        .expect("valid toml");
        let config = FabulaConfig::from_config_file(file);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/fabula"));
        assert!((config.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert!(config.log_json);
    }

    #[test]
    fn test_threshold_clamped() {
        let file: ConfigFile =
            toml::from_str("similarity_threshold = 3.5").expect("valid toml");
        let config = FabulaConfig::from_config_file(file);
        assert!((config.similarity_threshold - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let file: ConfigFile = toml::from_str("database_file = \"story.db\"").expect("valid toml");
        let config = FabulaConfig::from_config_file(file);
        assert_eq!(config.database_file, "story.db");
        assert_eq!(config.data_dir, PathBuf::from(".fabula"));
    }
}
