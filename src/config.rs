use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::doc_processor::MAX_UPLOAD_BYTES;

pub const DEFAULT_CHART_ENDPOINT: &str = "http://localhost:5000/chart-data";
pub const ENDPOINT_ENV: &str = "CHART_CHAT_ENDPOINT";

/// Setting keys accepted by [`Config::set`].
pub const SETTING_KEYS: &[&str] = &[
    "chart_endpoint",
    "max_upload_bytes",
    "upload_format",
    "request_timeout_secs",
];

/// How the attachment table is encoded in the `file` part of a chart request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for UploadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadFormat::Json => f.write_str("json"),
            UploadFormat::Csv => f.write_str("csv"),
        }
    }
}

impl FromStr for UploadFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(UploadFormat::Json),
            "csv" => Ok(UploadFormat::Csv),
            other => Err(ConfigError::InvalidValue {
                key: "upload_format".into(),
                value: other.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chart_endpoint: String,
    pub max_upload_bytes: u64,
    pub upload_format: UploadFormat,
    /// `None` leaves the HTTP client's default in place.
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chart_endpoint: DEFAULT_CHART_ENDPOINT.to_string(),
            max_upload_bytes: MAX_UPLOAD_BYTES,
            upload_format: UploadFormat::default(),
            request_timeout_secs: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
    #[error("Unknown setting key: {0}")]
    UnknownKey(String),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// `<config dir>/chart-chat/config.json`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::NoConfigDir)?
        .join("chart-chat")
        .join("config.json"))
}

impl Config {
    /// Load from `path`, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                self.chart_endpoint = endpoint.trim().to_string();
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        match key {
            "chart_endpoint" => Ok(self.chart_endpoint.clone()),
            "max_upload_bytes" => Ok(self.max_upload_bytes.to_string()),
            "upload_format" => Ok(self.upload_format.to_string()),
            "request_timeout_secs" => Ok(self
                .request_timeout_secs
                .map(|secs| secs.to_string())
                .unwrap_or_default()),
            _ => Err(ConfigError::UnknownKey(key.to_string())),
        }
    }

    /// Validate and apply a single setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();

        match key {
            "chart_endpoint" => {
                if !(value.starts_with("http://") || value.starts_with("https://")) {
                    return Err(invalid());
                }
                self.chart_endpoint = value.to_string();
            }
            "max_upload_bytes" => {
                let bytes: u64 = value.parse().map_err(|_| invalid())?;
                if bytes == 0 {
                    return Err(invalid());
                }
                self.max_upload_bytes = bytes;
            }
            "upload_format" => self.upload_format = value.parse()?,
            "request_timeout_secs" => {
                self.request_timeout_secs = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| invalid())?)
                };
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }
}
