//! In-process [`RemoteClient`].
//!
//! Holds model metadata, per-language translated metadata and records in
//! memory and logs every call, so callers can assert on the exact remote
//! traffic a bridge operation produced.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::domain::{Domain, SearchOptions};
use crate::error::RpcError;
use crate::odoo::normalize_lang;
use crate::traits::{RemoteClient, RemoteRecord};

/// One call received by a [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Fields {
        model: String,
        names: Option<Vec<String>>,
        lang: Option<String>,
    },
    Read {
        model: String,
        ids: Vec<i64>,
        fields: Vec<String>,
    },
    Write {
        model: String,
        ids: Vec<i64>,
        values: RemoteRecord,
    },
    Create {
        model: String,
        values: RemoteRecord,
    },
    Search {
        model: String,
        domain: Domain,
        options: SearchOptions,
    },
}

#[derive(Default)]
struct MemoryModel {
    fields: RemoteRecord,
    translations: HashMap<String, RemoteRecord>,
    records: BTreeMap<i64, RemoteRecord>,
}

#[derive(Default)]
struct MemoryState {
    models: HashMap<String, MemoryModel>,
    calls: Vec<RemoteCall>,
    refuse_writes: bool,
}

#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare a model with its `fields_get` answer (field name → descriptor).
    pub fn define_model(&self, model: &str, fields: Value) {
        let mut state = self.lock();
        let entry = state.models.entry(model.to_string()).or_default();
        entry.fields = into_object(fields);
    }

    /// Register translated descriptors answered for `lang`. Languages
    /// without registered translations answer no descriptors at all.
    pub fn add_translation(&self, model: &str, lang: &str, fields: Value) {
        let mut state = self.lock();
        let entry = state.models.entry(model.to_string()).or_default();
        entry
            .translations
            .insert(normalize_lang(lang), into_object(fields));
    }

    /// Store a record under `id`, replacing any previous one.
    pub fn insert_record(&self, model: &str, id: i64, record: Value) {
        let mut state = self.lock();
        let entry = state.models.entry(model.to_string()).or_default();
        let mut record = into_object(record);
        record.insert("id".into(), Value::from(id));
        entry.records.insert(id, record);
    }

    pub fn record(&self, model: &str, id: i64) -> Option<RemoteRecord> {
        let state = self.lock();
        state.models.get(model)?.records.get(&id).cloned()
    }

    /// Every call received so far, oldest first.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Answer `false` to every following `write` without applying it.
    pub fn refuse_writes(&self, refuse: bool) {
        self.lock().refuse_writes = refuse;
    }
}

fn into_object(value: Value) -> RemoteRecord {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn unknown_model(model: &str) -> RpcError {
    RpcError::Server {
        code: 200,
        message: format!("Object {model} doesn't exist"),
    }
}

fn project(source: &RemoteRecord, names: Option<&[String]>) -> RemoteRecord {
    match names {
        None => source.clone(),
        Some(names) if names.is_empty() => source.clone(),
        Some(names) => names
            .iter()
            .filter_map(|n| source.get(n).map(|v| (n.clone(), v.clone())))
            .collect(),
    }
}

impl RemoteClient for MemoryRemote {
    fn fields(
        &self,
        model: &str,
        names: Option<&[String]>,
        lang: Option<&str>,
    ) -> Result<RemoteRecord, RpcError> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Fields {
            model: model.to_string(),
            names: names.map(<[String]>::to_vec),
            lang: lang.map(str::to_string),
        });

        let m = state.models.get(model).ok_or_else(|| unknown_model(model))?;
        let source = match lang {
            None => &m.fields,
            Some(lang) => match m.translations.get(&normalize_lang(lang)) {
                Some(translated) => translated,
                None => return Ok(Map::new()),
            },
        };
        Ok(project(source, names))
    }

    fn read(
        &self,
        model: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>, RpcError> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Read {
            model: model.to_string(),
            ids: ids.to_vec(),
            fields: fields.to_vec(),
        });

        let m = state.models.get(model).ok_or_else(|| unknown_model(model))?;
        Ok(ids
            .iter()
            .filter_map(|id| m.records.get(id))
            .map(|record| {
                let mut out = project(record, Some(fields));
                out.insert("id".into(), record["id"].clone());
                out
            })
            .collect())
    }

    fn write(&self, model: &str, ids: &[i64], values: &RemoteRecord) -> Result<bool, RpcError> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Write {
            model: model.to_string(),
            ids: ids.to_vec(),
            values: values.clone(),
        });
        let refuse = state.refuse_writes;

        let m = state
            .models
            .get_mut(model)
            .ok_or_else(|| unknown_model(model))?;
        if let Some(missing) = ids.iter().find(|id| !m.records.contains_key(id)) {
            return Err(RpcError::Server {
                code: 200,
                message: format!("Record {model}({missing}) does not exist"),
            });
        }
        if refuse {
            return Ok(false);
        }
        for id in ids {
            if let Some(record) = m.records.get_mut(id) {
                for (k, v) in values {
                    record.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(true)
    }

    fn create(&self, model: &str, values: &RemoteRecord) -> Result<i64, RpcError> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Create {
            model: model.to_string(),
            values: values.clone(),
        });

        let m = state
            .models
            .get_mut(model)
            .ok_or_else(|| unknown_model(model))?;
        let id = m.records.keys().next_back().copied().unwrap_or(0) + 1;
        let mut record = values.clone();
        record.insert("id".into(), Value::from(id));
        m.records.insert(id, record);
        Ok(id)
    }

    fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<i64>, RpcError> {
        let mut state = self.lock();
        state.calls.push(RemoteCall::Search {
            model: model.to_string(),
            domain: domain.clone(),
            options: options.clone(),
        });

        let m = state.models.get(model).ok_or_else(|| unknown_model(model))?;
        let mut matched = Vec::new();
        for record in m.records.values() {
            if matches_domain(domain.terms(), record)? {
                matched.push(record);
            }
        }

        if let Some(order) = &options.order {
            let mut parts = order.split_whitespace();
            let field = parts.next().unwrap_or("id").to_string();
            let descending = parts
                .next()
                .is_some_and(|d| d.eq_ignore_ascii_case("desc"));
            matched.sort_by(|a, b| {
                let ord = compare(a.get(&field), b.get(&field)).unwrap_or(Ordering::Equal);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let ids = matched
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .filter_map(|r| r.get("id").and_then(Value::as_i64))
            .collect();
        Ok(ids)
    }
}

// ── Domain evaluation ───────────────────────────────────────────────

fn matches_domain(terms: &[Value], record: &RemoteRecord) -> Result<bool, RpcError> {
    let mut pos = 0;
    let mut result = true;
    // Top-level terms are implicitly AND-ed.
    while pos < terms.len() {
        let (value, next) = eval_term(terms, pos, record)?;
        result = result && value;
        pos = next;
    }
    Ok(result)
}

fn eval_term(terms: &[Value], pos: usize, record: &RemoteRecord) -> Result<(bool, usize), RpcError> {
    let term = terms
        .get(pos)
        .ok_or_else(|| RpcError::Decode("domain: missing operand".into()))?;
    match term {
        Value::String(op) if op == "!" => {
            let (v, next) = eval_term(terms, pos + 1, record)?;
            Ok((!v, next))
        }
        Value::String(op) if op == "&" || op == "|" => {
            let (left, mid) = eval_term(terms, pos + 1, record)?;
            let (right, next) = eval_term(terms, mid, record)?;
            let v = if op == "&" { left && right } else { left || right };
            Ok((v, next))
        }
        Value::Array(leaf) if leaf.len() == 3 => {
            let field = leaf[0].as_str().unwrap_or_default();
            let op = leaf[1].as_str().unwrap_or_default();
            Ok((eval_leaf(record.get(field), op, &leaf[2])?, pos + 1))
        }
        other => Err(RpcError::Decode(format!("domain: invalid term {other}"))),
    }
}

fn eval_leaf(actual: Option<&Value>, op: &str, expected: &Value) -> Result<bool, RpcError> {
    let absent = Value::Bool(false);
    let actual = actual.unwrap_or(&absent);
    // Many-to-one values are stored as [id, label]; compare on the id.
    let actual = match actual {
        Value::Array(pair) if pair.len() == 2 && pair[0].is_i64() => &pair[0],
        other => other,
    };
    let ord = compare(Some(actual), Some(expected));
    Ok(match op {
        "=" => loose_eq(actual, expected),
        "!=" => !loose_eq(actual, expected),
        "<" => ord == Some(Ordering::Less),
        "<=" => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
        ">" => ord == Some(Ordering::Greater),
        ">=" => matches!(ord, Some(Ordering::Greater | Ordering::Equal)),
        "in" | "not in" => {
            let Value::Array(options) = expected else {
                return Err(RpcError::Decode(format!("domain: {op} expects a list")));
            };
            let found = options.iter().any(|o| loose_eq(actual, o));
            if op == "in" {
                found
            } else {
                !found
            }
        }
        "like" | "ilike" => {
            let (Some(haystack), Some(needle)) = (actual.as_str(), expected.as_str()) else {
                return Ok(false);
            };
            if op == "ilike" {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            } else {
                haystack.contains(needle)
            }
        }
        other => return Err(RpcError::Decode(format!("domain: unsupported operator {other}"))),
    })
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a?, b?) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (x, y) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}
