//! Configuration loading and management.
//!
//! Sources, lowest to highest priority:
//! 1. Built-in defaults
//! 2. YAML file (`--config`, `./task-manager.yaml`, or
//!    `<config dir>/task-manager/config.yaml`)
//! 3. Environment variables (`TASK_MANAGER_*`, `PORT`, `FRONTEND_URL`)
//! 4. CLI flags (applied by the binary)

use crate::access::RelationPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Required length of the JWT signing secret, in bytes.
pub const JWT_SECRET_LEN: usize = 32;

/// Longest accepted access token lifetime (30 days).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Project-local config file name.
pub const LOCAL_CONFIG_FILE: &str = "task-manager.yaml";

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Deployment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Dev,
    Prod,
}

impl std::str::FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Stage::Dev),
            "prod" => Ok(Stage::Prod),
            other => Err(ConfigError::InvalidStage(other.to_string())),
        }
    }
}

/// HTTP server and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub stage: Stage,

    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            stage: Stage::default(),
            db_path: default_db_path(),
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".task-manager/tasks.db")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

/// Token and authorization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret; must be exactly 32 bytes.
    #[serde(default)]
    pub jwt_secret: String,

    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,

    /// Who may create or remove parent/child relations.
    #[serde(default)]
    pub relation_policy: RelationPolicy,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_seconds: default_token_ttl(),
            relation_policy: RelationPolicy::default(),
        }
    }
}

fn default_token_ttl() -> u64 {
    3600
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level name: trace/verbose, debug, info/log, warn, error/fatal, or a
    /// full `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Configuration validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("stage must be 'dev' or 'prod', got '{0}'")]
    InvalidStage(String),

    #[error("jwt secret must be exactly 32 bytes, got {0}")]
    InvalidJwtSecret(usize),

    #[error("token ttl must be between 1 and 2592000 seconds, got {0}")]
    InvalidTokenTtl(u64),

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Candidate config file locations, highest priority first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("task-manager").join("config.yaml"));
        }
        paths
    }

    /// Load from an explicit path, or the first existing search path, or
    /// defaults; then apply environment overrides.
    ///
    /// Returns the config and the file it came from, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let (mut config, source) = match explicit {
            Some(path) => (Self::load(path)?, Some(path.to_path_buf())),
            None => match Self::search_paths().into_iter().find(|p| p.is_file()) {
                Some(path) => (Self::load(&path)?, Some(path)),
                None => (Self::default(), None),
            },
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok((config, source))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> std::result::Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(stage) = lookup("TASK_MANAGER_STAGE") {
            self.server.stage = stage.parse()?;
        }

        if let Some(db_path) = lookup("TASK_MANAGER_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "PORT",
                value: port.clone(),
            })?;
        }

        if let Some(origins) = lookup("FRONTEND_URL") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(secret) = lookup("TASK_MANAGER_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }

        if let Some(ttl) = lookup("TASK_MANAGER_TOKEN_TTL") {
            self.auth.token_ttl_seconds = ttl.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "TASK_MANAGER_TOKEN_TTL",
                value: ttl.clone(),
            })?;
        }

        if let Some(policy) = lookup("TASK_MANAGER_RELATION_POLICY") {
            self.auth.relation_policy =
                policy.parse().map_err(|_| ConfigError::InvalidEnv {
                    name: "TASK_MANAGER_RELATION_POLICY",
                    value: policy.clone(),
                })?;
        }

        if let Some(level) = lookup("TASK_MANAGER_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Check the settings the server cannot run without.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let secret_len = self.auth.jwt_secret.len();
        if secret_len != JWT_SECRET_LEN {
            return Err(ConfigError::InvalidJwtSecret(secret_len));
        }
        let ttl = self.auth.token_ttl_seconds;
        if ttl == 0 || ttl > MAX_TOKEN_TTL_SECONDS {
            return Err(ConfigError::InvalidTokenTtl(ttl));
        }
        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.server.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
