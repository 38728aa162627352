pub mod credentials;
pub mod login;
pub mod schema;
pub mod user;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use mirror_core::OdooConfig;
use mirror_kv::KVStore;
use mirror_rpc::{OdooClient, RemoteClient, RpcError};
use mirror_sql::{SQLStore, Value};

use crate::service::credentials::CredentialCache;

/// Auth service error type.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("remote: {0}")]
    Remote(#[from] RpcError),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Opens a remote session for one set of credentials.
pub trait Connector: Send + Sync {
    /// Log in and return the remote user id with a client acting as that user.
    fn connect(&self, login: &str, password: &str) -> Result<(i64, Arc<dyn RemoteClient>), RpcError>;
}

/// [`Connector`] for a live Odoo server.
#[derive(Debug, Clone)]
pub struct OdooConnector {
    base_url: String,
    db: String,
    lang: String,
    timeout: Duration,
}

impl OdooConnector {
    pub fn from_config(config: &OdooConfig) -> Self {
        Self {
            base_url: config.base_url(),
            db: config.db.clone(),
            lang: config.lang.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Connector for OdooConnector {
    fn connect(&self, login: &str, password: &str) -> Result<(i64, Arc<dyn RemoteClient>), RpcError> {
        let client = OdooClient::login(
            &self.base_url,
            &self.db,
            login,
            password,
            Some(&self.lang),
            self.timeout,
        )?;
        Ok((client.uid(), Arc::new(client)))
    }
}

/// Authenticates local users against Odoo. Holds storage backends and the
/// connector used to reach the remote side.
pub struct OdooAuthBackend {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) credentials: CredentialCache,
    pub(crate) connector: Arc<dyn Connector>,
}

impl OdooAuthBackend {
    /// Create the backend, initializing the DB schema.
    pub fn new(
        sql: Arc<dyn SQLStore>,
        kv: Arc<dyn KVStore>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, AuthError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Self {
            sql,
            credentials: CredentialCache::new(kv),
            connector,
        })
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    // ── Generic record helpers ──

    /// Insert a record as JSON into a table with indexed columns. Returns
    /// the new rowid.
    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<i64, AuthError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        let mut cols = vec!["data"];
        let mut placeholders = vec!["?1".to_string()];
        let mut params = vec![Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 2));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );

        self.sql.insert(&sql, &params).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("UNIQUE constraint") {
                AuthError::Conflict(msg)
            } else {
                AuthError::Storage(msg)
            }
        })
    }

    /// First record matching `column = value`, deserializing the JSON `data` column.
    pub(crate) fn find_record<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: Value,
    ) -> Result<Option<T>, AuthError> {
        let sql = format!("SELECT data FROM {} WHERE {} = ?1", table, column);
        let rows = self
            .sql
            .query(&sql, &[value])
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let data = row
            .get_str("data")
            .ok_or_else(|| AuthError::Internal("missing data column".into()))?;
        serde_json::from_str(data)
            .map(Some)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Replace a record's JSON data.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: i64,
        record: &T,
    ) -> Result<(), AuthError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let affected = self
            .sql
            .exec(
                &format!("UPDATE {} SET data = ?1 WHERE id = ?2", table),
                &[Value::Text(json), Value::Integer(id)],
            )
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        if affected == 0 {
            return Err(AuthError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }
}
