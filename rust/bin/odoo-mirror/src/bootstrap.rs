//! Bootstrap — connect to Odoo, open storage and finalize configured models.
//!
//! When a command starts:
//! 1. Connect to Odoo, retrying per `[retry]`; on exhaustion notify the
//!    operator and abort.
//! 2. Open the local SQLite store.
//! 3. Finalize every `[[models]]` entry and log relations whose target
//!    model was never declared.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use mirror_core::{MirrorConfig, ModelConfig};
use mirror_model::{ModelSpec, Registry};
use mirror_rpc::{
    connect_with_retry, ConnectionInfo, LogNotifier, Notifier, OdooClient, RemoteClient,
    RetryPolicy, WebhookNotifier,
};
use mirror_sql::{SQLStore, SqliteStore};

pub fn model_spec(model: &ModelConfig) -> ModelSpec {
    ModelSpec {
        name: model.name.clone(),
        remote: model.remote.clone(),
        fields: model.fields.clone(),
        ignore_fields: model.ignore_fields.clone(),
        strict_references: model.strict_references,
        ..Default::default()
    }
}

pub fn notifier(config: &MirrorConfig) -> Box<dyn Notifier> {
    match &config.notify.webhook {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())),
        None => Box::new(LogNotifier),
    }
}

pub fn retry_policy(config: &MirrorConfig) -> RetryPolicy {
    RetryPolicy {
        max_retries: config.retry.max_attempts,
        delay: Duration::from_secs(config.retry.delay_secs),
    }
}

/// Log in as the configured service user.
pub fn connect(config: &MirrorConfig) -> anyhow::Result<Arc<dyn RemoteClient>> {
    let odoo = &config.odoo;
    let info = ConnectionInfo {
        url: odoo.base_url(),
        db: odoo.db.clone(),
        user: odoo.user.clone(),
    };
    let notifier = notifier(config);
    let client = connect_with_retry(&retry_policy(config), &info, notifier.as_ref(), || {
        OdooClient::login(
            &info.url,
            &odoo.db,
            &odoo.user,
            &odoo.password,
            Some(&odoo.lang),
            Duration::from_secs(odoo.timeout_secs),
        )
    })
    .map_err(|e| anyhow::anyhow!("unable to connect to Odoo at {}: {}", info.url, e))?;
    Ok(Arc::new(client))
}

pub fn open_sql(config: &MirrorConfig) -> anyhow::Result<Arc<dyn SQLStore>> {
    let path = config.storage.sqlite_path();
    let sql = SqliteStore::open(&path)
        .map_err(|e| anyhow::anyhow!("failed to open SQL store {}: {}", path.display(), e))?;
    Ok(Arc::new(sql))
}

/// Finalize every configured model against `client`.
pub fn build_registry(
    config: &MirrorConfig,
    client: Arc<dyn RemoteClient>,
    sql: Arc<dyn SQLStore>,
) -> anyhow::Result<Registry> {
    let registry = Registry::new(client, sql, &config.odoo.lang);
    for model in &config.models {
        registry
            .finalize(model_spec(model))
            .map_err(|e| anyhow::anyhow!("failed to finalize {}: {}", model.remote, e))?;
    }
    for dangling in registry.validate() {
        warn!(%dangling, "relation target is not a mirrored model, field not attached");
    }
    info!(models = config.models.len(), "registry ready");
    Ok(registry)
}

/// Full startup: connect, open storage, finalize.
pub fn start(config: &MirrorConfig) -> anyhow::Result<Registry> {
    let client = connect(config)?;
    let sql = open_sql(config)?;
    build_registry(config, client, sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_rpc::MemoryRemote;
    use serde_json::json;

    const CONFIG: &str = r#"
        [odoo]
        host = "http://localhost"
        db = "prod"
        user = "admin"
        password = "admin"

        [retry]
        max_attempts = 0
        delay_secs = 0

        [storage]
        data_dir = "/tmp/unused"

        [[models]]
        name = "partner"
        remote = "res.partner"
        fields = ["name", "country_id"]
        strict_references = true
    "#;

    #[test]
    fn model_spec_from_config() {
        let config = MirrorConfig::parse(CONFIG).unwrap();
        let spec = model_spec(&config.models[0]);
        assert_eq!(spec.name, "partner");
        assert_eq!(spec.fields, Some(vec!["name".to_string(), "country_id".to_string()]));
        assert!(spec.strict_references);
        assert_eq!(retry_policy(&config).max_retries, 0);
    }

    #[test]
    fn registry_is_built_with_dangling_relations_logged() {
        let config = MirrorConfig::parse(CONFIG).unwrap();
        let remote = MemoryRemote::new();
        remote.define_model(
            "res.partner",
            json!({
                "name": {"type": "char"},
                "country_id": {"type": "many2one", "relation": "res.country"},
            }),
        );
        let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let registry = build_registry(&config, Arc::new(remote), sql).unwrap();
        assert_eq!(registry.validate().len(), 1);
        assert_eq!(
            registry.model("res.partner").unwrap().field_names(),
            vec!["name".to_string()]
        );
    }

    #[test]
    fn unreachable_server_aborts_startup() {
        let mut config = MirrorConfig::parse(CONFIG).unwrap();
        config.odoo.host = "http://127.0.0.1".into();
        config.odoo.port = 9;
        config.odoo.timeout_secs = 1;
        assert!(connect(&config).is_err());
    }
}
