pub mod config;

pub use config::{
    ConfigError, ModelConfig, MirrorConfig, NotifyConfig, OdooConfig, RetryConfig, StorageConfig,
};

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
