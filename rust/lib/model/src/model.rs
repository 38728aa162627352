//! Mirrored model declarations and their attached fields.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use mirror_rpc::{normalize_lang, RemoteClient};
use tracing::debug;

use crate::convert::Converter;
use crate::error::MirrorError;
use crate::field::{FieldOverride, LocalField};
use crate::meta::FieldMeta;
use crate::translate::resolve_choices;
use crate::value::Record;

/// Declaration of a model to mirror, handed to `Registry::finalize`.
#[derive(Debug, Clone, Default)]
pub struct ModelSpec {
    /// Local table name.
    pub name: String,
    /// Remote model name, e.g. `res.partner`.
    pub remote: String,
    /// Allow-list of remote fields; `None` mirrors every supported field.
    pub fields: Option<Vec<String>>,
    pub ignore_fields: Vec<String>,
    pub overrides: HashMap<String, FieldOverride>,
    /// Fail pushes that reference rows never pushed instead of sending `false`.
    pub strict_references: bool,
}

impl ModelSpec {
    pub fn new(name: &str, remote: &str) -> Self {
        Self {
            name: name.to_string(),
            remote: remote.to_string(),
            ..Default::default()
        }
    }

    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn ignore(mut self, fields: &[&str]) -> Self {
        self.ignore_fields.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn override_field(mut self, field: &str, overrides: FieldOverride) -> Self {
        self.overrides.insert(field.to_string(), overrides);
        self
    }

    pub fn strict_references(mut self, strict: bool) -> Self {
        self.strict_references = strict;
        self
    }

    /// Remote fields to request: the allow-list minus the ignore-list, or
    /// `None` for all of them.
    pub fn effective_fields(&self) -> Option<Vec<String>> {
        self.fields.as_ref().map(|fields| {
            fields
                .iter()
                .filter(|f| !self.ignore_fields.contains(f))
                .cloned()
                .collect()
        })
    }
}

/// A local column together with the converter that produced it.
#[derive(Debug)]
pub struct MirroredField {
    pub local: LocalField,
    pub converter: Converter,
}

impl MirroredField {
    pub fn name(&self) -> &str {
        &self.local.name
    }
}

/// A finalized mirrored model.
#[derive(Debug)]
pub struct MirrorModel {
    spec: ModelSpec,
    fields: RwLock<Vec<Arc<MirroredField>>>,
    /// Many-to-one field on this model → reverse accessor name on the target.
    related_names: RwLock<HashMap<String, String>>,
    /// Languages already fetched for the current field set. Held while
    /// fetching, which serializes refreshes per model.
    refreshed: Mutex<HashSet<String>>,
}

impl MirrorModel {
    pub(crate) fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            fields: RwLock::new(Vec::new()),
            related_names: RwLock::new(HashMap::new()),
            refreshed: Mutex::new(HashSet::new()),
        }
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn remote(&self) -> &str {
        &self.spec.remote
    }

    pub fn table(&self) -> &str {
        &self.spec.name
    }

    /// Attached fields in attachment order.
    pub fn fields(&self) -> Vec<Arc<MirroredField>> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn field(&self, name: &str) -> Option<Arc<MirroredField>> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|f| f.name() == name)
            .cloned()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|f| f.name().to_string())
            .collect()
    }

    pub(crate) fn attach(&self, field: MirroredField) {
        self.fields
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(field));
        // The new field has no translations yet.
        self.refreshed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub(crate) fn set_related_name(&self, field: &str, accessor: &str) {
        self.related_names
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(field.to_string(), accessor.to_string());
    }

    /// Name under which the target of many-to-one `field` reaches this
    /// model's rows; `{table}_set` unless a one-to-many renamed it.
    pub fn related_name(&self, field: &str) -> String {
        self.related_names
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(field)
            .cloned()
            .unwrap_or_else(|| format!("{}_set", self.spec.name))
    }

    /// Descriptor of `field` translated into `lang`.
    ///
    /// On a cache miss the whole model is fetched once for `lang` and every
    /// attached field's cache is filled; fields the server did not
    /// translate fall back to the untranslated descriptor.
    pub fn translated(
        &self,
        client: &dyn RemoteClient,
        field: &str,
        lang: &str,
    ) -> Result<Arc<FieldMeta>, MirrorError> {
        let target = self.field(field).ok_or_else(|| self.unknown(field))?;
        if let Some(meta) = target.converter.translations().get(lang) {
            return Ok(meta);
        }

        let lang = normalize_lang(lang);
        let mut refreshed = self.refreshed.lock().unwrap_or_else(PoisonError::into_inner);
        if !refreshed.contains(&lang) {
            let fields = self.fields();
            let names: Vec<String> = fields.iter().map(|f| f.name().to_string()).collect();
            debug!(model = %self.spec.remote, %lang, count = names.len(), "refreshing translations");
            let answer = client.fields(&self.spec.remote, Some(&names), Some(&lang))?;
            for f in &fields {
                if let Some(raw) = answer.get(f.name()) {
                    let meta = FieldMeta::from_remote(&self.spec.remote, f.name(), raw)?;
                    f.converter.translations().insert(&lang, meta);
                }
            }
            refreshed.insert(lang.clone());
        }
        drop(refreshed);

        Ok(target
            .converter
            .translations()
            .get(&lang)
            .unwrap_or_else(|| Arc::clone(target.converter.meta())))
    }

    pub fn label(&self, client: &dyn RemoteClient, field: &str, lang: &str) -> Result<String, MirrorError> {
        Ok(self.translated(client, field, lang)?.string.clone())
    }

    pub fn help(&self, client: &dyn RemoteClient, field: &str, lang: &str) -> Result<String, MirrorError> {
        Ok(self.translated(client, field, lang)?.help.clone())
    }

    /// Selection options of `field` with labels in `lang`, in remote order.
    pub fn choices(
        &self,
        client: &dyn RemoteClient,
        field: &str,
        lang: &str,
    ) -> Result<Vec<(String, String)>, MirrorError> {
        let translated = self.translated(client, field, lang)?;
        let target = self.field(field).ok_or_else(|| self.unknown(field))?;
        Ok(resolve_choices(target.converter.meta(), &translated))
    }

    /// Unsaved record carrying every field default.
    pub fn new_record(&self) -> Record {
        let mut record = Record::new();
        for f in self.fields() {
            if let Some(default) = &f.local.default {
                record.values.insert(f.name().to_string(), default.clone());
            }
        }
        record
    }

    pub(crate) fn unknown(&self, field: &str) -> MirrorError {
        MirrorError::UnknownField {
            model: self.spec.remote.clone(),
            field: field.to_string(),
        }
    }
}
