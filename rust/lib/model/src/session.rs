//! CRUD bridge between mirrored models and the remote side.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use mirror_rpc::{Domain, RemoteClient, RemoteRecord, SearchOptions};
use mirror_sql::Value as SqlValue;
use serde_json::Value;
use tracing::{debug, warn};

use crate::convert::RefResolver;
use crate::error::MirrorError;
use crate::field::LocalKind;
use crate::model::MirrorModel;
use crate::registry::Registry;
use crate::store;
use crate::value::{FieldValue, Record};

/// Runs load/search/write/push against one remote client.
///
/// Obtained from [`Registry::session`] or [`Registry::session_as`].
pub struct Session<'r> {
    registry: &'r Registry,
    client: Arc<dyn RemoteClient>,
    /// Remote records currently being loaded, to break reference cycles.
    loading: RefCell<HashSet<(String, i64)>>,
}

impl<'r> Session<'r> {
    pub(crate) fn new(registry: &'r Registry, client: Arc<dyn RemoteClient>) -> Self {
        Self {
            registry,
            client,
            loading: RefCell::new(HashSet::new()),
        }
    }

    pub fn client(&self) -> &dyn RemoteClient {
        self.client.as_ref()
    }

    /// Read `ids` remotely and upsert them locally. Rows come back in the
    /// order the remote side answered.
    pub fn load(&self, model: &str, ids: &[i64]) -> Result<Vec<Record>, MirrorError> {
        let m = self.registry.model(model)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let names = m.field_names();
        let raw = self.client.read(m.remote(), ids, &names)?;
        debug!(model, requested = ids.len(), received = raw.len(), "loaded remote records");

        raw.iter().map(|record| self.upsert(&m, record)).collect()
    }

    pub fn search(
        &self,
        model: &str,
        domain: &Domain,
        options: &SearchOptions,
    ) -> Result<Vec<Record>, MirrorError> {
        let m = self.registry.model(model)?;
        let ids = self.client.search(m.remote(), domain, options)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.load(model, &ids)
    }

    fn upsert(&self, m: &MirrorModel, raw: &RemoteRecord) -> Result<Record, MirrorError> {
        let remote_id = raw
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| MirrorError::Conversion {
                field: format!("{}.id", m.remote()),
                message: "remote record without id".into(),
            })?;

        let key = (m.remote().to_string(), remote_id);
        self.loading.borrow_mut().insert(key.clone());
        let converted = self.convert_record(m, raw);
        self.loading.borrow_mut().remove(&key);
        let values = converted?;

        // Looked up after conversion: converting may have created a stub for
        // this very record through a reference cycle.
        let existing = match store::find_by_remote_id(self.registry.sql(), m, remote_id) {
            Ok(found) => found,
            Err(e) => {
                warn!(model = %m.remote(), remote_id, error = %e, "local lookup failed, creating");
                None
            }
        };

        match existing {
            Some(mut record) => {
                record.values.extend(values);
                let id = record.id.unwrap_or_default();
                store::update(self.registry.sql(), m, id, &record)?;
                Ok(record)
            }
            None => {
                let mut record = Record {
                    id: None,
                    remote_id: Some(remote_id),
                    values,
                };
                record.id = Some(store::insert(self.registry.sql(), m, &record)?);
                Ok(record)
            }
        }
    }

    fn convert_record(
        &self,
        m: &MirrorModel,
        raw: &RemoteRecord,
    ) -> Result<BTreeMap<String, FieldValue>, MirrorError> {
        let mut values = BTreeMap::new();
        for field in m.fields() {
            // Fields the server left out keep their local value.
            if let Some(value) = raw.get(field.name()) {
                let converted = field.converter.convert_inbound(value, self)?;
                values.insert(field.name().to_string(), converted);
            }
        }
        Ok(values)
    }

    fn outbound(
        &self,
        m: &MirrorModel,
        field: &str,
        value: &FieldValue,
    ) -> Result<Value, MirrorError> {
        let target = m.field(field).ok_or_else(|| m.unknown(field))?;
        match target.converter.convert_outbound(value, self) {
            Err(MirrorError::Unresolvable { model, id }) if !m.spec().strict_references => {
                warn!(
                    model = %m.remote(),
                    field,
                    target = %model,
                    id,
                    "referenced row was never pushed, sending false"
                );
                Ok(Value::Bool(false))
            }
            other => other,
        }
    }

    /// Write `changes` to every row of `rows` that has a remote id, then
    /// mirror the same changes locally.
    ///
    /// Only attached fields are sent; rows never pushed are left out. When
    /// the remote write succeeds but the local update fails, the error is
    /// [`MirrorError::Diverged`].
    pub fn write(
        &self,
        model: &str,
        rows: &[Record],
        changes: &BTreeMap<String, FieldValue>,
    ) -> Result<Vec<Record>, MirrorError> {
        let m = self.registry.model(model)?;
        let mut values = RemoteRecord::new();
        let mut local = BTreeMap::new();
        for (name, value) in changes {
            if m.field(name).is_none() {
                debug!(model, field = %name, "not a mirrored field, not written");
                continue;
            }
            values.insert(name.clone(), self.outbound(&m, name, value)?);
            local.insert(name.clone(), value.clone());
        }

        let targets: Vec<&Record> = rows.iter().filter(|r| r.remote_id.is_some()).collect();
        let remote_ids: Vec<i64> = targets.iter().filter_map(|r| r.remote_id).collect();
        if remote_ids.is_empty() || values.is_empty() {
            return Ok(targets.into_iter().cloned().collect());
        }

        self.remote_write(model, m.remote(), &remote_ids, &values)?;

        let mut written = Vec::with_capacity(targets.len());
        for row in targets {
            let mut row = row.clone();
            row.values.extend(local.clone());
            if let Some(id) = row.id {
                store::update(self.registry.sql(), &m, id, &row).map_err(|e| MirrorError::Diverged {
                    model: model.to_string(),
                    remote_ids: remote_ids.clone(),
                    message: e.to_string(),
                })?;
            }
            written.push(row);
        }
        Ok(written)
    }

    /// Send `record` to the remote side: an update when it has a remote id,
    /// a create otherwise. Returns the remote id; the local row is not
    /// touched (see [`Session::push_record`]).
    ///
    /// With `fields` unset every attached field the record carries is sent.
    pub fn push(&self, model: &str, record: &Record, fields: Option<&[&str]>) -> Result<i64, MirrorError> {
        let m = self.registry.model(model)?;
        let mut values = RemoteRecord::new();
        match fields {
            Some(names) => {
                for name in names {
                    if m.field(name).is_none() {
                        debug!(model, field = %name, "not a mirrored field, not pushed");
                        continue;
                    }
                    let value = record.get(name).cloned().unwrap_or(FieldValue::Null);
                    values.insert(name.to_string(), self.outbound(&m, name, &value)?);
                }
            }
            None => {
                for field in m.fields() {
                    if let Some(value) = record.get(field.name()) {
                        values.insert(field.name().to_string(), self.outbound(&m, field.name(), value)?);
                    }
                }
            }
        }

        match record.remote_id {
            Some(remote_id) => {
                self.remote_write(model, m.remote(), &[remote_id], &values)?;
                debug!(model, remote_id, "pushed update");
                Ok(remote_id)
            }
            None => {
                let remote_id = self.client.create(m.remote(), &values)?;
                debug!(model, remote_id, "pushed create");
                Ok(remote_id)
            }
        }
    }

    fn remote_write(
        &self,
        model: &str,
        remote: &str,
        remote_ids: &[i64],
        values: &RemoteRecord,
    ) -> Result<(), MirrorError> {
        if self.client.write(remote, remote_ids, values)? {
            Ok(())
        } else {
            Err(MirrorError::Refused {
                model: model.to_string(),
                remote_ids: remote_ids.to_vec(),
            })
        }
    }

    /// [`Session::push`], then record the remote id on the local row,
    /// saving the record if it was never saved. A record never saved is
    /// checked before anything is sent.
    pub fn push_record(
        &self,
        model: &str,
        record: &mut Record,
        fields: Option<&[&str]>,
    ) -> Result<i64, MirrorError> {
        if record.id.is_none() {
            let m = self.registry.model(model)?;
            Self::prepare(&m, record)?;
        }
        let remote_id = self.push(model, record, fields)?;
        record.remote_id = Some(remote_id);
        let stored = match record.id {
            Some(id) => self
                .registry
                .model(model)
                .and_then(|m| store::update(self.registry.sql(), &m, id, record)),
            None => self.save(model, record).map(|_| ()),
        };
        stored.map_err(|e| MirrorError::Diverged {
            model: model.to_string(),
            remote_ids: vec![remote_id],
            message: e.to_string(),
        })?;
        Ok(remote_id)
    }

    /// Reject unknown fields, fill defaults and creation timestamps when
    /// `record` is new, then validate every value.
    fn prepare(m: &MirrorModel, record: &mut Record) -> Result<(), MirrorError> {
        if let Some(unknown) = record.values.keys().find(|k| m.field(k).is_none()) {
            return Err(m.unknown(unknown));
        }

        let creating = record.id.is_none();
        let now = Utc::now().naive_utc();
        for field in m.fields() {
            let name = field.name();
            let missing = record.get(name).map_or(true, FieldValue::is_null);
            if creating && missing && field.local.auto_now_add {
                let stamp = match field.local.kind {
                    LocalKind::Date => FieldValue::Date(now.date()),
                    LocalKind::Time => FieldValue::Time(now.time()),
                    _ => FieldValue::DateTime(now),
                };
                record.set(name, stamp);
            } else if creating && record.get(name).is_none() {
                if let Some(default) = &field.local.default {
                    record.set(name, default.clone());
                }
            }
            field.local.validate(record.get(name).unwrap_or(&FieldValue::Null))?;
        }
        Ok(())
    }

    /// Insert or update `record` locally, after filling defaults and
    /// creation timestamps and validating every value.
    pub fn save(&self, model: &str, record: &mut Record) -> Result<i64, MirrorError> {
        let m = self.registry.model(model)?;
        Self::prepare(&m, record)?;

        let id = match record.id {
            Some(id) => {
                store::update(self.registry.sql(), &m, id, record)?;
                id
            }
            None => store::insert(self.registry.sql(), &m, record)?,
        };
        record.id = Some(id);
        Ok(id)
    }

    pub fn get(&self, model: &str, id: i64) -> Result<Option<Record>, MirrorError> {
        let m = self.registry.model(model)?;
        store::get(self.registry.sql(), &m, id)
    }

    pub fn find_by_remote_id(&self, model: &str, remote_id: i64) -> Result<Option<Record>, MirrorError> {
        let m = self.registry.model(model)?;
        store::find_by_remote_id(self.registry.sql(), &m, remote_id)
    }

    /// Rows reaching `record` of `model` through the reverse accessor
    /// `accessor` (a one-to-many name or the default `{table}_set`).
    pub fn related(&self, model: &str, record: &Record, accessor: &str) -> Result<Vec<Record>, MirrorError> {
        self.registry.model(model)?;
        let (source, field) = self
            .registry
            .reverse_accessor(model, accessor)
            .ok_or_else(|| MirrorError::UnknownField {
                model: model.to_string(),
                field: accessor.to_string(),
            })?;
        let Some(id) = record.id else {
            return Ok(Vec::new());
        };
        store::select_where(self.registry.sql(), &source, &field, SqlValue::Integer(id))
    }

    pub fn label(&self, model: &str, field: &str, lang: &str) -> Result<String, MirrorError> {
        self.registry.model(model)?.label(self.client(), field, lang)
    }

    pub fn help(&self, model: &str, field: &str, lang: &str) -> Result<String, MirrorError> {
        self.registry.model(model)?.help(self.client(), field, lang)
    }

    pub fn choices(&self, model: &str, field: &str, lang: &str) -> Result<Vec<(String, String)>, MirrorError> {
        self.registry.model(model)?.choices(self.client(), field, lang)
    }
}

impl RefResolver for Session<'_> {
    fn resolve_inbound(&self, model: &str, remote_id: i64) -> Result<i64, MirrorError> {
        let m = self.registry.model(model)?;
        match store::find_by_remote_id(self.registry.sql(), &m, remote_id) {
            Ok(Some(Record { id: Some(id), .. })) => return Ok(id),
            Ok(_) => {}
            Err(e) => warn!(model, remote_id, error = %e, "local lookup failed"),
        }

        if self.loading.borrow().contains(&(model.to_string(), remote_id)) {
            // Reference cycle: hand out a stub that the outer load fills in.
            let stub = Record {
                remote_id: Some(remote_id),
                ..Default::default()
            };
            return store::insert(self.registry.sql(), &m, &stub);
        }

        debug!(model, remote_id, "referenced record not mirrored, fetching");
        self.load(model, &[remote_id])?
            .into_iter()
            .next()
            .and_then(|r| r.id)
            .ok_or_else(|| MirrorError::NotFound(format!("{model} remote id {remote_id}")))
    }

    fn remote_id_of(&self, model: &str, id: i64) -> Result<Option<i64>, MirrorError> {
        let m = self.registry.model(model)?;
        let record = store::get(self.registry.sql(), &m, id)?
            .ok_or_else(|| MirrorError::NotFound(format!("{model} row {id}")))?;
        Ok(record.remote_id)
    }
}
