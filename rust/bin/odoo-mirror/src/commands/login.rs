//! `odoo-mirror login` — verify a user against Odoo and cache the credentials.

use std::sync::Arc;

use anyhow::Result;

use mirror_auth::{OdooAuthBackend, OdooConnector};
use mirror_core::MirrorConfig;
use mirror_kv::{KVStore, RedbStore};

use crate::bootstrap;

pub fn run(config: &MirrorConfig, username: &str, password: &str) -> Result<()> {
    let path = config.storage.kv_path();
    let kv: Arc<dyn KVStore> = Arc::new(
        RedbStore::open(&path)
            .map_err(|e| anyhow::anyhow!("failed to open KV store {}: {}", path.display(), e))?,
    );
    let sql = bootstrap::open_sql(config)?;
    let backend = OdooAuthBackend::new(sql, kv, Arc::new(OdooConnector::from_config(&config.odoo)))?;

    match backend.authenticate(username, password)? {
        Some(user) => {
            println!("Logged in as {} (local user {}).", user.username, user.id);
            Ok(())
        }
        None => anyhow::bail!("Odoo refused the credentials for {}.", username),
    }
}
