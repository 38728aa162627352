#![allow(dead_code)]

use std::sync::Arc;

use mirror_model::{ModelSpec, Registry};
use mirror_rpc::{MemoryRemote, RemoteCall};
use mirror_sql::SqliteStore;
use serde_json::json;

pub struct Fixture {
    pub remote: Arc<MemoryRemote>,
    pub sql: Arc<SqliteStore>,
    pub registry: Registry,
}

pub fn remote() -> MemoryRemote {
    let remote = MemoryRemote::new();
    remote.define_model(
        "res.country",
        json!({
            "name": {"type": "char", "string": "Country Name", "required": true, "translate": true},
            "code": {"type": "char", "string": "Country Code", "size": 2},
        }),
    );
    remote.define_model(
        "res.partner",
        json!({
            "name": {"type": "char", "string": "Name", "required": true},
            "email": {"type": "char", "string": "Email"},
            "is_company": {"type": "boolean", "string": "Is a Company"},
            "credit": {"type": "monetary", "string": "Credit", "digits": [16, 2]},
            "logo": {"type": "binary", "string": "Logo"},
            "birthday": {"type": "date", "string": "Birthday"},
            "state": {
                "type": "selection",
                "string": "State",
                "selection": [["draft", "Draft"], ["open", "Open"], ["done", "Done"]],
            },
            "country_id": {"type": "many2one", "string": "Country", "relation": "res.country"},
            "parent_id": {"type": "many2one", "string": "Related Company", "relation": "res.partner"},
            "child_ids": {
                "type": "one2many",
                "string": "Contacts",
                "relation": "res.partner",
                "relation_field": "parent_id",
            },
            "category_id": {"type": "many2many", "string": "Tags", "relation": "res.partner.category"},
        }),
    );
    remote
}

pub fn fixture_with(remote: MemoryRemote) -> Fixture {
    let remote = Arc::new(remote);
    let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
    let registry = Registry::new(remote.clone(), sql.clone(), "en_US");
    Fixture { remote, sql, registry }
}

/// Both models finalized, partner first.
pub fn fixture() -> Fixture {
    let fx = fixture_with(remote());
    fx.registry
        .finalize(ModelSpec::new("partner", "res.partner"))
        .unwrap();
    fx.registry
        .finalize(ModelSpec::new("country", "res.country"))
        .unwrap();
    fx.remote.clear_calls();
    fx
}

pub fn reads(calls: &[RemoteCall], model: &str) -> Vec<Vec<i64>> {
    calls
        .iter()
        .filter_map(|call| match call {
            RemoteCall::Read { model: m, ids, .. } if m == model => Some(ids.clone()),
            _ => None,
        })
        .collect()
}
