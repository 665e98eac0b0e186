//! User configuration for the command-line tool.
//!
//! Stored as INI at `<config dir>/sydesup/config.ini`:
//!
//! ```ini
//! [package]
//! temp_dir = /var/tmp/sydesup
//! compatibility_format = false
//!
//! [logging]
//! level = info
//! log_file = /var/log/sydesup.log
//! ```
//!
//! Missing files and missing keys fall back to defaults. Command-line flags
//! override whatever is configured here.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use crate::logging::DEFAULT_LOG_LEVEL;

const PACKAGE_SECTION: &str = "package";
const LOGGING_SECTION: &str = "logging";

/// Errors that can occur while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: PathBuf, source: ini::Error },

    #[error("failed to write config {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid value \"{value}\" for [{section}] {key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupConfig {
    /// Working space for staging and zipping.
    pub temp_dir: Option<PathBuf>,

    /// Write packages in the legacy directory layout.
    pub compatibility_format: bool,

    /// Log filter, `tracing-subscriber` syntax.
    pub log_level: String,

    /// Additional log file.
    pub log_file: Option<PathBuf>,
}

impl Default for SupConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            compatibility_format: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
        }
    }
}

impl SupConfig {
    /// Default configuration file location, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sydesup").join("config.ini"))
    }

    /// Load from the default location, or defaults if there is none.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let conf = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_ini(&conf)
    }

    fn from_ini(conf: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = conf.section(Some(PACKAGE_SECTION)) {
            config.temp_dir = section.get("temp_dir").and_then(non_empty_path);
            if let Some(value) = section.get("compatibility_format") {
                config.compatibility_format =
                    parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                        section: PACKAGE_SECTION,
                        key: "compatibility_format",
                        value: value.to_string(),
                    })?;
            }
        }

        if let Some(section) = conf.section(Some(LOGGING_SECTION)) {
            if let Some(level) = section.get("level").map(str::trim) {
                if !level.is_empty() {
                    config.log_level = level.to_string();
                }
            }
            config.log_file = section.get("log_file").and_then(non_empty_path);
        }

        Ok(config)
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        self.to_ini()
            .write_to_file(path)
            .map_err(|e| ConfigError::Write {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        conf.with_section(Some(PACKAGE_SECTION))
            .set(
                "temp_dir",
                self.temp_dir
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )
            .set("compatibility_format", self.compatibility_format.to_string());
        conf.with_section(Some(LOGGING_SECTION))
            .set("level", self.log_level.as_str())
            .set(
                "log_file",
                self.log_file
                    .as_deref()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        conf
    }

    /// Set the staging directory.
    pub fn with_temp_dir(mut self, path: PathBuf) -> Self {
        self.temp_dir = Some(path);
        self
    }

    /// Enable or disable the legacy directory layout.
    pub fn with_compatibility_format(mut self, enabled: bool) -> Self {
        self.compatibility_format = enabled;
        self
    }

    /// Set the log filter.
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the log file.
    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SupConfig::load(&temp.path().join("config.ini")).unwrap();
        assert_eq!(config, SupConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(
            &path,
            "[package]\ntemp_dir = /var/tmp/sup\ncompatibility_format = yes\n\n[logging]\nlevel = debug\n",
        )
        .unwrap();

        let config = SupConfig::load(&path).unwrap();
        assert_eq!(config.temp_dir, Some(PathBuf::from("/var/tmp/sup")));
        assert!(config.compatibility_format);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_file, None);
    }

    #[test]
    fn test_invalid_bool_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        std::fs::write(&path, "[package]\ncompatibility_format = maybe\n").unwrap();

        let err = SupConfig::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "compatibility_format",
                ..
            }
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.ini");
        let config = SupConfig::default()
            .with_temp_dir(PathBuf::from("/tmp/staging"))
            .with_compatibility_format(true)
            .with_log_level("sydesup=trace")
            .with_log_file(PathBuf::from("/tmp/sup.log"));

        config.save(&path).unwrap();
        assert_eq!(SupConfig::load(&path).unwrap(), config);
    }
}
