//! Model registry: schema sync and deferred relation resolution.
//!
//! Models are finalized one at a time. A relational field whose target
//! model is not registered yet is queued under the target's remote name and
//! attached to its originating model as soon as the target is finalized, so
//! the declaration order of mutually referencing models does not matter.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use mirror_rpc::RemoteClient;
use mirror_sql::SQLStore;
use tracing::{debug, info, warn};

use crate::convert::{Converter, ConverterKind, Mapping};
use crate::error::MirrorError;
use crate::meta::FieldMeta;
use crate::model::{MirrorModel, MirroredField, ModelSpec};
use crate::session::Session;
use crate::store;

/// Local names that are never mirrored from the remote side.
pub const RESERVED_FIELDS: &[&str] = &["id", "remote_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Many2One,
    One2Many,
}

/// A relational field still waiting for its target model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingRelation {
    /// Remote model declaring the field.
    pub origin: String,
    pub field: String,
    /// Remote model that was never finalized.
    pub target: String,
    pub kind: RelationKind,
}

impl fmt::Display for DanglingRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RelationKind::Many2One => "many2one",
            RelationKind::One2Many => "one2many",
        };
        write!(f, "{}.{} ({kind}) -> {}", self.origin, self.field, self.target)
    }
}

/// Queued descriptors keyed by target remote model.
#[derive(Default)]
struct Deferred {
    many2one: HashMap<String, Vec<FieldMeta>>,
    one2many: HashMap<String, Vec<FieldMeta>>,
}

pub struct Registry {
    client: Arc<dyn RemoteClient>,
    sql: Arc<dyn SQLStore>,
    lang: String,
    models: RwLock<HashMap<String, Arc<MirrorModel>>>,
    deferred: Mutex<Deferred>,
}

impl Registry {
    /// `lang` is the language used for labels materialized at finalization
    /// and the default for translated lookups.
    pub fn new(client: Arc<dyn RemoteClient>, sql: Arc<dyn SQLStore>, lang: &str) -> Self {
        Self {
            client,
            sql,
            lang: lang.to_string(),
            models: RwLock::new(HashMap::new()),
            deferred: Mutex::new(Deferred::default()),
        }
    }

    pub fn client(&self) -> &Arc<dyn RemoteClient> {
        &self.client
    }

    pub(crate) fn sql(&self) -> &dyn SQLStore {
        self.sql.as_ref()
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Finalized model by remote name.
    pub fn model(&self, remote: &str) -> Result<Arc<MirrorModel>, MirrorError> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(remote)
            .cloned()
            .ok_or_else(|| MirrorError::UnknownModel(remote.to_string()))
    }

    fn lookup(&self, remote: &str) -> Option<Arc<MirrorModel>> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(remote)
            .cloned()
    }

    /// Finalized models sorted by remote name.
    pub fn models(&self) -> Vec<Arc<MirrorModel>> {
        let mut models: Vec<_> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        models.sort_by(|a, b| a.remote().cmp(b.remote()));
        models
    }

    /// Sync `spec` with the remote schema and register it.
    pub fn finalize(&self, spec: ModelSpec) -> Result<Arc<MirrorModel>, MirrorError> {
        if spec.name.is_empty() || spec.remote.is_empty() {
            return Err(MirrorError::Validation("model name and remote name are required".into()));
        }
        if self.lookup(&spec.remote).is_some() {
            return Err(MirrorError::AlreadyFinalized(spec.remote));
        }
        let remote = spec.remote.clone();

        let wanted = spec.effective_fields();
        let answer = self.client.fields(&remote, wanted.as_deref(), None)?;
        let order: Vec<String> = match &wanted {
            Some(names) => names.clone(),
            None => answer.keys().cloned().collect(),
        };
        let mut metas = Vec::new();
        for name in order {
            if spec.ignore_fields.contains(&name) || RESERVED_FIELDS.contains(&name.as_str()) {
                continue;
            }
            match answer.get(&name) {
                Some(raw) => metas.push(FieldMeta::from_remote(&remote, &name, raw)?),
                None => warn!(model = %remote, field = %name, "field not known to the remote side"),
            }
        }

        store::ensure_table(self.sql(), &spec.name)?;
        let model = Arc::new(MirrorModel::new(spec));
        {
            let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
            if models.contains_key(&remote) {
                return Err(MirrorError::AlreadyFinalized(remote));
            }
            models.insert(remote.clone(), Arc::clone(&model));
        }

        // Fields of earlier models that were waiting for this one.
        let waiting = self.take_deferred(&remote, RelationKind::Many2One);
        for meta in waiting {
            let origin = self.model(&meta.model)?;
            debug!(origin = %meta.model, field = %meta.name, target = %remote, "attaching deferred many2one");
            self.attach(&origin, meta, Some(model.table()))?;
        }

        // Columns first so a one2many on this model can find a many2one
        // pointing back at it.
        let mut reverse = Vec::new();
        for meta in metas {
            match Mapping::for_tag(&meta.field_type) {
                None => debug!(model = %remote, field = %meta.name, field_type = %meta.field_type, "unsupported field type, skipped"),
                Some(Mapping::Reverse) => reverse.push(meta),
                Some(Mapping::Column(ConverterKind::Many2One)) => self.many2one(&model, meta)?,
                Some(Mapping::Column(_)) => self.attach(&model, meta, None)?,
            }
        }
        for meta in reverse {
            self.one2many(meta);
        }

        for meta in self.take_deferred(&remote, RelationKind::One2Many) {
            self.link_reverse(&meta, &model);
        }

        info!(model = %remote, table = %model.table(), fields = model.fields().len(), "model finalized");
        Ok(model)
    }

    fn take_deferred(&self, target: &str, kind: RelationKind) -> Vec<FieldMeta> {
        let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = match kind {
            RelationKind::Many2One => &mut deferred.many2one,
            RelationKind::One2Many => &mut deferred.one2many,
        };
        queue.remove(target).unwrap_or_default()
    }

    fn defer(&self, meta: FieldMeta, target: &str, kind: RelationKind) {
        debug!(origin = %meta.model, field = %meta.name, %target, ?kind, "target not registered, deferring");
        let mut deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = match kind {
            RelationKind::Many2One => &mut deferred.many2one,
            RelationKind::One2Many => &mut deferred.one2many,
        };
        queue.entry(target.to_string()).or_default().push(meta);
    }

    fn many2one(&self, model: &Arc<MirrorModel>, meta: FieldMeta) -> Result<(), MirrorError> {
        let Some(target) = meta.relation.clone() else {
            warn!(model = %meta.model, field = %meta.name, "many2one without relation, skipped");
            return Ok(());
        };
        match self.lookup(&target) {
            Some(target_model) => self.attach(model, meta, Some(target_model.table())),
            None => {
                self.defer(meta, &target, RelationKind::Many2One);
                Ok(())
            }
        }
    }

    fn one2many(&self, meta: FieldMeta) {
        let Some(target) = meta.relation.clone() else {
            warn!(model = %meta.model, field = %meta.name, "one2many without relation, skipped");
            return;
        };
        match self.lookup(&target) {
            Some(related) => self.link_reverse(&meta, &related),
            None => self.defer(meta, &target, RelationKind::One2Many),
        }
    }

    /// Name the reverse accessor of `related`'s many-to-one after the
    /// one-to-many `meta`.
    fn link_reverse(&self, meta: &FieldMeta, related: &MirrorModel) {
        let Some(inverse) = meta.relation_field.as_deref() else {
            warn!(model = %meta.model, field = %meta.name, "one2many without relation_field, skipped");
            return;
        };
        match related.field(inverse) {
            Some(_) => {
                debug!(model = %related.remote(), field = inverse, accessor = %meta.name, "reverse accessor renamed");
                related.set_related_name(inverse, &meta.name);
            }
            None => warn!(
                model = %meta.model,
                field = %meta.name,
                inverse,
                related = %related.remote(),
                "inverse many2one is not mirrored, one2many skipped"
            ),
        }
    }

    fn attach(&self, model: &MirrorModel, meta: FieldMeta, target: Option<&str>) -> Result<(), MirrorError> {
        let name = meta.name.clone();
        let Some(converter) = Converter::new(meta) else {
            return Ok(());
        };
        let local = converter.materialize(target, Some(&self.lang), model.spec().overrides.get(&name));
        store::add_column(self.sql(), model.table(), &local)?;
        model.attach(MirroredField { local, converter });
        Ok(())
    }

    /// Deferred relations whose target was never finalized.
    pub fn validate(&self) -> Vec<DanglingRelation> {
        let deferred = self.deferred.lock().unwrap_or_else(PoisonError::into_inner);
        let mut dangling: Vec<DanglingRelation> = deferred
            .many2one
            .iter()
            .map(|(target, metas)| (target, metas, RelationKind::Many2One))
            .chain(
                deferred
                    .one2many
                    .iter()
                    .map(|(target, metas)| (target, metas, RelationKind::One2Many)),
            )
            .flat_map(|(target, metas, kind)| {
                metas.iter().map(move |meta| DanglingRelation {
                    origin: meta.model.clone(),
                    field: meta.name.clone(),
                    target: target.clone(),
                    kind,
                })
            })
            .collect();
        dangling.sort_by(|a, b| (&a.origin, &a.field).cmp(&(&b.origin, &b.field)));
        dangling
    }

    /// Model and many-to-one field behind the reverse accessor `accessor`
    /// of rows of `target`.
    pub fn reverse_accessor(&self, target: &str, accessor: &str) -> Option<(Arc<MirrorModel>, String)> {
        self.models().into_iter().find_map(|model| {
            model
                .fields()
                .iter()
                .filter(|f| f.converter.meta().relation.as_deref() == Some(target))
                .filter(|f| f.converter.kind() == ConverterKind::Many2One)
                .find(|f| model.related_name(f.name()) == accessor)
                .map(|f| (Arc::clone(&model), f.name().to_string()))
        })
    }

    /// CRUD bridge using the registry's own client.
    pub fn session(&self) -> Session<'_> {
        Session::new(self, Arc::clone(&self.client))
    }

    /// CRUD bridge calling the remote side through `client`, e.g. one
    /// logged in as the end user.
    pub fn session_as(&self, client: Arc<dyn RemoteClient>) -> Session<'_> {
        Session::new(self, client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_rpc::{MemoryRemote, RemoteCall};
    use mirror_sql::SqliteStore;
    use serde_json::json;

    fn setup() -> (Arc<MemoryRemote>, Registry) {
        let remote = Arc::new(MemoryRemote::new());
        remote.define_model(
            "res.partner",
            json!({
                "name": {"type": "char", "string": "Name", "required": true},
                "country_id": {"type": "many2one", "relation": "res.country", "string": "Country"},
                "category_id": {"type": "many2many", "relation": "res.partner.category"},
                "id": {"type": "integer"},
            }),
        );
        remote.define_model(
            "res.country",
            json!({
                "name": {"type": "char", "string": "Country Name"},
                "partner_ids": {
                    "type": "one2many",
                    "relation": "res.partner",
                    "relation_field": "country_id",
                },
            }),
        );
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let registry = Registry::new(remote.clone(), sql, "en_US");
        (remote, registry)
    }

    #[test]
    fn unsupported_and_reserved_fields_are_omitted() {
        let (_, registry) = setup();
        registry.finalize(ModelSpec::new("country", "res.country")).unwrap();
        let partner = registry.finalize(ModelSpec::new("partner", "res.partner")).unwrap();
        assert_eq!(partner.field_names(), vec!["country_id".to_string(), "name".to_string()]);
    }

    #[test]
    fn finalize_twice_is_an_error() {
        let (_, registry) = setup();
        registry.finalize(ModelSpec::new("country", "res.country")).unwrap();
        let err = registry.finalize(ModelSpec::new("country2", "res.country")).unwrap_err();
        assert!(matches!(err, MirrorError::AlreadyFinalized(_)));
    }

    #[test]
    fn allow_list_is_requested_exactly() {
        let (remote, registry) = setup();
        registry
            .finalize(
                ModelSpec::new("partner", "res.partner")
                    .with_fields(&["name", "country_id"])
                    .ignore(&["country_id"]),
            )
            .unwrap();
        assert_eq!(
            remote.calls(),
            vec![RemoteCall::Fields {
                model: "res.partner".into(),
                names: Some(vec!["name".into()]),
                lang: None,
            }]
        );
    }

    #[test]
    fn many2one_waits_for_its_target() {
        let (_, registry) = setup();
        let partner = registry.finalize(ModelSpec::new("partner", "res.partner")).unwrap();
        assert!(partner.field("country_id").is_none());
        assert_eq!(
            registry.validate(),
            vec![DanglingRelation {
                origin: "res.partner".into(),
                field: "country_id".into(),
                target: "res.country".into(),
                kind: RelationKind::Many2One,
            }]
        );

        registry.finalize(ModelSpec::new("country", "res.country")).unwrap();
        assert!(partner.field("country_id").is_some());
        assert!(registry.validate().is_empty());
        assert_eq!(partner.related_name("country_id"), "partner_ids");

        let (model, field) = registry.reverse_accessor("res.country", "partner_ids").unwrap();
        assert_eq!(model.remote(), "res.partner");
        assert_eq!(field, "country_id");
    }

    #[test]
    fn one2many_waits_for_its_related_model() {
        let (_, registry) = setup();
        registry.finalize(ModelSpec::new("country", "res.country")).unwrap();
        assert_eq!(registry.validate()[0].kind, RelationKind::One2Many);
        assert_eq!(registry.validate()[0].to_string(), "res.country.partner_ids (one2many) -> res.partner");

        let partner = registry.finalize(ModelSpec::new("partner", "res.partner")).unwrap();
        assert_eq!(partner.related_name("country_id"), "partner_ids");
        assert!(registry.validate().is_empty());
    }

    #[test]
    fn unknown_model() {
        let (_, registry) = setup();
        assert!(matches!(registry.model("res.users"), Err(MirrorError::UnknownModel(_))));
        assert!(registry.finalize(ModelSpec::new("users", "res.users")).is_err());
        assert!(registry.models().is_empty());
    }
}
