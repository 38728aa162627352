//! Bridge configuration.
//!
//! One TOML file describes the remote Odoo instance, the connection retry
//! policy, the operator notification hook, local storage and the list of
//! mirrored models:
//!
//! ```toml
//! [odoo]
//! host = "http://localhost"
//! port = 8069
//! db = "prod"
//! user = "admin"
//! password = "admin"
//! lang = "fr-be"
//!
//! [retry]
//! max_attempts = 3
//! delay_secs = 5
//!
//! [storage]
//! data_dir = "/var/lib/odoo-mirror"
//!
//! [[models]]
//! name = "partner"
//! remote = "res.partner"
//! fields = ["name", "email", "parent_id"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse: {0}")]
    Parse(String),

    #[error("invalid: {0}")]
    Invalid(String),
}

/// Connection settings for the remote Odoo instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OdooConfig {
    /// Scheme and host, e.g. `http://localhost`.
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub db: String,
    pub user: String,
    pub password: String,
    /// Language used in the default RPC context, e.g. `en-us`.
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl OdooConfig {
    /// Base URL of the JSON-RPC endpoint host: `{host}:{port}`.
    pub fn base_url(&self) -> String {
        format!("{}:{}", self.host.trim_end_matches('/'), self.port)
    }
}

fn default_port() -> u16 {
    8069
}

fn default_lang() -> String {
    "en-us".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Startup connection retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Wait between attempts.
    #[serde(default = "default_delay")]
    pub delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_secs: default_delay(),
        }
    }
}

/// Where to report a failed startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// HTTP endpoint receiving a JSON failure report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    /// SQLite file holding the mirrored rows.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("mirror.sqlite")
    }

    /// redb file holding the credential cache.
    pub fn kv_path(&self) -> PathBuf {
        self.data_dir.join("credentials.redb")
    }
}

/// One mirrored model declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Local table name.
    pub name: String,
    /// Remote model name, e.g. `res.partner`.
    pub remote: String,
    /// Allow-list of remote fields. All fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_fields: Vec<String>,
    /// Refuse to push references to rows never synced to the remote side.
    #[serde(default)]
    pub strict_references: bool,
}

/// Complete configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub odoo: OdooConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl MirrorConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Reject configurations the bridge cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.odoo.host.is_empty() {
            return Err(ConfigError::Invalid("odoo.host is empty".into()));
        }
        if self.odoo.db.is_empty() {
            return Err(ConfigError::Invalid("odoo.db is empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for model in &self.models {
            if !seen.insert(model.remote.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "model {} declared twice",
                    model.remote
                )));
            }
            if model.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "model {} has no local name",
                    model.remote
                )));
            }
        }
        Ok(())
    }
}
