//! Mutuals configuration file handling
//!
//! Configuration is TOML. Every section is optional; missing sections and
//! fields fall back to defaults. The default location is
//! `<config dir>/mutuals/config.toml`.

use crate::fingerprint::{FingerprintError, Normalizer, DEFAULT_COUNTRY_CODE};
use crate::program::{ProgramConfig, DEFAULT_CALLBACK_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid callback_timeout '{value}': {source}")]
    InvalidTimeout {
        value: String,
        source: humantime::DurationError,
    },

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualsConfig {
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    #[serde(default)]
    pub compute: ComputeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Calling code prepended to phone numbers written without one
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeConfig {
    /// How long a party waits for a computation callback, e.g. "30s"
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_country_code() -> String {
    DEFAULT_COUNTRY_CODE.to_string()
}

fn default_callback_timeout() -> String {
    humantime::format_duration(DEFAULT_CALLBACK_TIMEOUT).to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            default_country_code: default_country_code(),
        }
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            callback_timeout: default_callback_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl MutualsConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `path` if given, else from the default location if a file
    /// exists there, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    pub fn callback_timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.compute.callback_timeout).map_err(|source| {
            ConfigError::InvalidTimeout {
                value: self.compute.callback_timeout.clone(),
                source,
            }
        })
    }

    pub fn normalizer(&self) -> Result<Normalizer, ConfigError> {
        Ok(Normalizer::new(&self.fingerprint.default_country_code)?)
    }

    pub fn program_config(&self) -> Result<ProgramConfig, ConfigError> {
        Ok(ProgramConfig {
            callback_timeout: self.callback_timeout()?,
            ..ProgramConfig::default()
        })
    }

    /// Default configuration as a commented TOML document
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Mutuals configuration

[fingerprint]
# Calling code added to phone numbers written without a leading '+'
default_country_code = "{country_code}"

[compute]
# How long to wait for the compute cluster to answer a request
callback_timeout = "{callback_timeout}"

[logging]
# Log level: trace, debug, info, warn, error
level = "{level}"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/mutuals/mutuals.log"
"#,
            country_code = DEFAULT_COUNTRY_CODE,
            callback_timeout = default_callback_timeout(),
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Write the default configuration to `config_path`
    pub fn create_default(config_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

/// `<config dir>/mutuals/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mutuals")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MutualsConfig::default();
        assert_eq!(config.fingerprint.default_country_code, "1");
        assert_eq!(config.callback_timeout().unwrap(), Duration::from_secs(30));
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = MutualsConfig::default();
        config.fingerprint.default_country_code = "44".to_string();
        config.compute.callback_timeout = "2m".to_string();
        config.save(&config_path).unwrap();

        let loaded = MutualsConfig::load(&config_path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.callback_timeout().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn test_create_default_config_loads() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        MutualsConfig::create_default(&config_path).unwrap();
        assert!(config_path.exists());

        let config = MutualsConfig::load(&config_path).unwrap();
        assert_eq!(config, MutualsConfig::default());
    }

    #[test]
    fn test_load_config_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = MutualsConfig::load(&config_path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.fingerprint.default_country_code, "1");
        assert_eq!(config.compute.callback_timeout, "30s");
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();

        assert_eq!(
            MutualsConfig::load(&config_path).unwrap(),
            MutualsConfig::default()
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = MutualsConfig::default();
        config.compute.callback_timeout = "soon".to_string();
        assert!(matches!(
            config.callback_timeout(),
            Err(ConfigError::InvalidTimeout { .. })
        ));

        let mut config = MutualsConfig::default();
        config.fingerprint.default_country_code = "abcd".to_string();
        assert!(matches!(
            config.normalizer(),
            Err(ConfigError::Fingerprint(_))
        ));
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[compute\n").unwrap();

        let err = MutualsConfig::load(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(
            MutualsConfig::load_or_default(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("mutuals/config.toml"));
    }
}
