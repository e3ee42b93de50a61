//! Configuration loader and validator for the adlink service and operator CLI.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
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

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub server: Server,
    /// Screen-management platform; mirror sync is disabled when absent.
    #[serde(default)]
    pub yodeck: Option<Yodeck>,
    #[serde(default)]
    pub matching: Matching,
    #[serde(default)]
    pub client: Option<Client>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

impl App {
    /// Expand a leading `~/` using `$HOME`.
    pub fn resolved_data_dir(&self) -> String {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.data_dir.clone(),
            },
            None => self.data_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub bind: String,
}

/// Screen-management platform API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Yodeck {
    pub base_url: String,
    pub api_label: String,
    pub api_token: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub sync_interval_secs: u64,
}

fn default_page_size() -> u32 {
    100
}

/// Suggestion engine tuning. The high-confidence threshold is fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Matching {
    pub min_score: u8,
    pub max_suggestions: usize,
    pub auto_link_on_sync: bool,
}

impl Default for Matching {
    fn default() -> Self {
        Self {
            min_score: 50,
            max_suggestions: 5,
            auto_link_on_sync: false,
        }
    }
}

/// Operator CLI settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub base_url: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        let dir = self.app.resolved_data_dir();
        if dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(dir)
    }

    /// `DATABASE_URL` wins over the file in `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/adlink.db", self.app.resolved_data_dir()))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be a socket address"))
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
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    cfg.bind_addr()?;

    if let Some(yodeck) = &cfg.yodeck {
        if Url::parse(&yodeck.base_url).is_err() {
            return Err(ConfigError::Invalid("yodeck.base_url must be an absolute URL"));
        }
        if yodeck.api_label.trim().is_empty() {
            return Err(ConfigError::Invalid("yodeck.api_label must be non-empty"));
        }
        if yodeck.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid("yodeck.api_token must be non-empty"));
        }
        if yodeck.page_size == 0 {
            return Err(ConfigError::Invalid("yodeck.page_size must be > 0"));
        }
        if yodeck.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid("yodeck.sync_interval_secs must be > 0"));
        }
    }

    if cfg.matching.min_score > 100 {
        return Err(ConfigError::Invalid("matching.min_score must be <= 100"));
    }
    if cfg.matching.max_suggestions == 0 {
        return Err(ConfigError::Invalid("matching.max_suggestions must be > 0"));
    }

    if let Some(client) = &cfg.client {
        if Url::parse(&client.base_url).is_err() {
            return Err(ConfigError::Invalid("client.base_url must be an absolute URL"));
        }
    }

    Ok(())
}

/// Returns the documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

server:
  bind: "127.0.0.1:8080"

yodeck:
  base_url: "https://app.yodeck.com/"
  api_label: "adlink"
  api_token: "YOUR_YODECK_API_TOKEN"
  page_size: 100
  sync_interval_secs: 900

matching:
  min_score: 50
  max_suggestions: 5
  auto_link_on_sync: false

client:
  base_url: "http://127.0.0.1:8080/"
"#
}
