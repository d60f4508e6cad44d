//! Configuration management for the sigauth CLI
//!
//! Configuration is stored in TOML format.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/sigauth/config.toml`
//! - Windows: `%APPDATA%\sigauth\config\config.toml`
//!
//! Precedence, highest first: command-line flags, the file given with
//! `--config`, the default file, built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// CLI configuration
///
/// # Example TOML
///
/// ```toml
/// [identity]
/// key_path = ""  # Empty = default location
///
/// [service]
/// base_url = "https://identity.sigauth.dev/api/v1"
/// timeout_seconds = 30
/// namespace = "sigauth"
///
/// [session]
/// state_path = ""  # Empty = default location
///
/// [output]
/// format = "table"  # "table" | "json" | "quiet"
/// verbose = false
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Identity key configuration
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Identity service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Session persistence configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to identity key file (empty = default location)
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

/// Identity service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL; `/nonce`, `/login` and `/token` are appended
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Namespace prefix of the signed login message
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_base_url() -> String {
    "https://identity.sigauth.dev/api/v1".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_namespace() -> String {
    sigauth_core::protocol::DEFAULT_NAMESPACE.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_seconds: default_timeout(),
            namespace: default_namespace(),
        }
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Path to the session state file (empty = default location)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output format: "table", "json", "quiet"
    #[serde(default = "default_format")]
    pub format: String,

    /// Verbose output
    #[serde(default)]
    pub verbose: bool,
}

fn default_format() -> String {
    "table".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            verbose: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self, ConfigError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = custom_path {
            Self::load(path)
        } else {
            Self::load_default()
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("dev", "sigauth", "sigauth")
    }

    /// Get default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (identity key, session state)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create default configuration file if it doesn't exist
    pub fn create_default_if_missing() -> Result<bool, ConfigError> {
        if let Some(path) = Self::default_path() {
            if !path.exists() {
                Self::default().save(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_formats = ["table", "json", "quiet"];
        if !valid_formats.contains(&self.output.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid output format '{}'. Valid values: {:?}",
                self.output.format, valid_formats
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level '{}'. Valid values: {:?}",
                self.logging.level, valid_levels
            )));
        }

        if self.service.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.service.namespace.is_empty() || self.service.namespace.contains(':') {
            return Err(ConfigError::ValidationError(
                "namespace must be non-empty and must not contain ':'".to_string(),
            ));
        }

        match url::Url::parse(&self.service.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid service URL '{}': must be an http:// or https:// URL",
                    self.service.base_url
                )));
            }
        }

        Ok(())
    }

    /// Identity key file path, falling back to the data directory
    pub fn key_path(&self) -> PathBuf {
        self.identity.key_path.clone().unwrap_or_else(|| {
            Self::data_dir()
                .map(|dir| dir.join("identity.json"))
                .unwrap_or_else(|| PathBuf::from("identity.json"))
        })
    }

    /// Session state file path, falling back to the data directory
    pub fn state_path(&self) -> PathBuf {
        self.session.state_path.clone().unwrap_or_else(|| {
            Self::data_dir()
                .map(|dir| dir.join("session.json"))
                .unwrap_or_else(|| PathBuf::from("session.json"))
        })
    }

    /// Generate a sample configuration file content
    pub fn sample_toml() -> &'static str {
        r#"# sigauth configuration

[identity]
# Path to identity key file (empty = default location)
# key_path = ""

[service]
# Identity service base URL
base_url = "https://identity.sigauth.dev/api/v1"
# Per-request timeout in seconds
timeout_seconds = 30
# Namespace prefix of the signed login message
namespace = "sigauth"

[session]
# Path to session state file (empty = default location)
# state_path = ""

[output]
# Output format: "table", "json", "quiet"
format = "table"
# Enable verbose output
verbose = false

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
level = "warn"
"#
    }
}

/// CLI configuration overrides
///
/// Command-line arguments take precedence over config file values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Output format override
    pub output_format: Option<String>,
    /// Verbose flag override
    pub verbose: Option<bool>,
    /// Debug flag override
    pub debug: Option<bool>,
    /// Identity service URL override
    pub service_url: Option<String>,
}

impl Config {
    /// Apply CLI overrides to configuration
    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref format) = overrides.output_format {
            self.output.format = format.clone();
        }
        if let Some(verbose) = overrides.verbose {
            self.output.verbose = verbose;
        }
        if let Some(true) = overrides.debug {
            self.logging.level = "debug".to_string();
        }
        if let Some(ref url) = overrides.service_url {
            if !url.is_empty() {
                self.service.base_url = url.clone();
            }
        }
        self
    }
}
