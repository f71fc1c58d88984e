//! Configuration loader and validator for the QR Hub service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub renderer: Renderer,
    pub uploads: Uploads,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub data_dir: String,
    pub session_ttl_hours: i64,
}

/// External QR rendering API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Renderer {
    pub base_url: String,
    /// Background color as six hex digits, no `#`.
    pub background: String,
}

/// External upload service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Uploads {
    pub base_url: String,
    pub token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.session_ttl_hours <= 0 {
        return Err(ConfigError::Invalid("app.session_ttl_hours must be > 0"));
    }

    if url::Url::parse(&cfg.renderer.base_url).is_err() {
        return Err(ConfigError::Invalid("renderer.base_url must be a valid URL"));
    }
    let bg = &cfg.renderer.background;
    if bg.len() != 6 || !bg.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::Invalid(
            "renderer.background must be six hex digits without '#'",
        ));
    }

    if url::Url::parse(&cfg.uploads.base_url).is_err() {
        return Err(ConfigError::Invalid("uploads.base_url must be a valid URL"));
    }
    if cfg.uploads.token.trim().is_empty() {
        return Err(ConfigError::Invalid("uploads.token must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, used in docs and tests.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "127.0.0.1:8080"
  data_dir: "./data"
  session_ttl_hours: 168

renderer:
  base_url: "https://api.qrserver.com/v1/create-qr-code/"
  background: "F0F0F0"

uploads:
  base_url: "https://uploads.example.com/api/files"
  token: "YOUR_UPLOAD_SERVICE_TOKEN"
"#
}
