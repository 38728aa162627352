//! JSON-RPC client for a running Odoo server.
//!
//! Every call is a blocking POST to `{base_url}/jsonrpc`. Authentication is
//! a `common.login` call made once at construction; the resulting uid and
//! the password are sent with every `object.execute_kw` call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::{Domain, SearchOptions};
use crate::error::RpcError;
use crate::traits::{RemoteClient, RemoteRecord};

/// Convert a caller language tag to the `xx_YY` form Odoo expects.
///
/// `en-us` → `en_US`, `fr_be` → `fr_BE`, `nl` → `nl`. Everything after the
/// first separator is the region subtag and is uppercased.
pub fn normalize_lang(lang: &str) -> String {
    let lang = lang.replace('-', "_");
    match lang.split_once('_') {
        Some((language, region)) => format!("{}_{}", language, region.to_uppercase()),
        None => lang,
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<RpcErrorData>,
}

#[derive(Deserialize)]
struct RpcErrorData {
    #[serde(default)]
    message: String,
}

/// Authenticated connection to one Odoo database as one user.
pub struct OdooClient {
    http: reqwest::blocking::Client,
    endpoint: String,
    db: String,
    uid: i64,
    password: String,
    context: Map<String, Value>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for OdooClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdooClient")
            .field("endpoint", &self.endpoint)
            .field("db", &self.db)
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

impl OdooClient {
    /// Connect and log in. Fails with [`RpcError::Auth`] when the server
    /// rejects the credentials.
    pub fn login(
        base_url: &str,
        db: &str,
        user: &str,
        password: &str,
        lang: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;

        let mut context = Map::new();
        if let Some(lang) = lang {
            context.insert("lang".into(), Value::String(normalize_lang(lang)));
        }

        let mut client = Self {
            http,
            endpoint: format!("{}/jsonrpc", base_url.trim_end_matches('/')),
            db: db.to_string(),
            uid: 0,
            password: password.to_string(),
            context,
            next_id: AtomicU64::new(1),
        };

        let uid = client.call("common", "login", json!([db, user, password]))?;
        client.uid = match uid {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| RpcError::Decode(format!("login uid: {n}")))?,
            _ => {
                return Err(RpcError::Auth(format!(
                    "login refused for {user} on database {db}"
                )))
            }
        };

        debug!(uid = client.uid, db, "logged in to odoo");
        Ok(client)
    }

    pub fn uid(&self) -> i64 {
        self.uid
    }

    /// One JSON-RPC round trip.
    fn call(&self, service: &str, method: &str, args: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": { "service": service, "method": method, "args": args },
            "id": id,
        });

        let resp = self.http.post(&self.endpoint).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(RpcError::Server {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let parsed: RpcResponse = resp
            .json()
            .map_err(|e| RpcError::Decode(format!("response body: {e}")))?;

        if let Some(err) = parsed.error {
            let message = match err.data {
                Some(data) if !data.message.is_empty() => data.message,
                _ => err.message,
            };
            return Err(RpcError::Server {
                code: err.code,
                message,
            });
        }
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    /// `object.execute_kw` with the client's default context merged into `kwargs`.
    pub fn execute_kw(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        mut kwargs: Map<String, Value>,
    ) -> Result<Value, RpcError> {
        let context = kwargs
            .entry("context")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ctx) = context {
            for (k, v) in &self.context {
                ctx.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        debug!(model, method, "execute_kw");
        self.call(
            "object",
            "execute_kw",
            json!([self.db, self.uid, self.password, model, method, args, kwargs]),
        )
    }
}

fn expect_object(value: Value, what: &str) -> Result<RemoteRecord, RpcError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(RpcError::Decode(format!("{what}: expected object, got {other}"))),
    }
}

impl RemoteClient for OdooClient {
    fn fields(
        &self,
        model: &str,
        names: Option<&[String]>,
        lang: Option<&str>,
    ) -> Result<RemoteRecord, RpcError> {
        let names = names.map(|n| json!(n)).unwrap_or_else(|| json!([]));
        let mut kwargs = Map::new();
        if let Some(lang) = lang {
            kwargs.insert("context".into(), json!({ "lang": normalize_lang(lang) }));
        }
        let result = self.execute_kw(model, "fields_get", vec![names], kwargs)?;
        expect_object(result, "fields_get")
    }

    fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>, RpcError> {
        let result = self.execute_kw(model, "read", vec![json!(ids), json!(fields)], Map::new())?;
        let Value::Array(records) = result else {
            return Err(RpcError::Decode("read: expected list".into()));
        };
        records
            .into_iter()
            .map(|r| expect_object(r, "read"))
            .collect()
    }

    fn write(&self, model: &str, ids: &[i64], values: &RemoteRecord) -> Result<bool, RpcError> {
        let result = self.execute_kw(
            model,
            "write",
            vec![json!(ids), Value::Object(values.clone())],
            Map::new(),
        )?;
        Ok(result.as_bool().unwrap_or(false))
    }

    fn create(&self, model: &str, values: &RemoteRecord) -> Result<i64, RpcError> {
        let result =
            self.execute_kw(model, "create", vec![Value::Object(values.clone())], Map::new())?;
        match result {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| RpcError::Decode(format!("create: bad id {n}"))),
            // Newer servers answer batch-style.
            Value::Array(ids) if ids.len() == 1 => ids[0]
                .as_i64()
                .ok_or_else(|| RpcError::Decode("create: bad id".into())),
            other => Err(RpcError::Decode(format!("create: unexpected {other}"))),
        }
    }

    fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<i64>, RpcError> {
        let mut kwargs = Map::new();
        kwargs.insert("offset".into(), json!(options.offset));
        if let Some(limit) = options.limit {
            kwargs.insert("limit".into(), json!(limit));
        }
        if let Some(order) = &options.order {
            kwargs.insert("order".into(), json!(order));
        }
        let result = self.execute_kw(model, "search", vec![json!(domain)], kwargs)?;
        let Value::Array(ids) = result else {
            return Err(RpcError::Decode("search: expected list".into()));
        };
        ids.iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| RpcError::Decode(format!("search: bad id {v}")))
            })
            .collect()
    }
}
