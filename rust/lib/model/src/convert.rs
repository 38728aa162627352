//! Remote field type tags → converters.
//!
//! A [`Converter`] owns one remote field descriptor. It produces the local
//! column for that field ([`Converter::materialize`]) and moves values
//! across the wire in both directions ([`Converter::convert_inbound`],
//! [`Converter::convert_outbound`]).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

use crate::error::MirrorError;
use crate::field::{FieldOverride, LocalField, LocalKind};
use crate::meta::FieldMeta;
use crate::translate::{resolve_choices, TranslationCache};
use crate::value::FieldValue;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const TIME_FORMAT: &str = "%H:%M:%S";

const DEFAULT_CHAR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConverterKind {
    Char,
    Text,
    Boolean,
    Integer,
    Float,
    Date,
    DateTime,
    Time,
    Binary,
    Selection,
    Many2One,
}

/// How a remote field shows up locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// A column on the owning model.
    Column(ConverterKind),
    /// No column; names the reverse accessor of a many-to-one on the related model.
    Reverse,
}

const TAGS: &[(&str, Mapping)] = &[
    ("char", Mapping::Column(ConverterKind::Char)),
    ("text", Mapping::Column(ConverterKind::Text)),
    ("html", Mapping::Column(ConverterKind::Text)),
    ("boolean", Mapping::Column(ConverterKind::Boolean)),
    ("integer", Mapping::Column(ConverterKind::Integer)),
    ("float", Mapping::Column(ConverterKind::Float)),
    ("monetary", Mapping::Column(ConverterKind::Float)),
    ("date", Mapping::Column(ConverterKind::Date)),
    ("datetime", Mapping::Column(ConverterKind::DateTime)),
    ("time", Mapping::Column(ConverterKind::Time)),
    ("binary", Mapping::Column(ConverterKind::Binary)),
    ("selection", Mapping::Column(ConverterKind::Selection)),
    ("many2one", Mapping::Column(ConverterKind::Many2One)),
    ("one2many", Mapping::Reverse),
];

impl Mapping {
    /// `None` for tags that are not mirrored (`many2many`, `reference`, ...).
    pub fn for_tag(tag: &str) -> Option<Mapping> {
        TAGS.iter().find(|(t, _)| *t == tag).map(|(_, m)| *m)
    }
}

/// Maps many-to-one references between remote ids and local rows.
pub trait RefResolver {
    /// Local row id for `remote_id` of `model`, fetching the record when it
    /// is not mirrored yet.
    fn resolve_inbound(&self, model: &str, remote_id: i64) -> Result<i64, MirrorError>;

    /// Remote id of the local row `id` of `model`, `None` if never pushed.
    fn remote_id_of(&self, model: &str, id: i64) -> Result<Option<i64>, MirrorError>;
}

#[derive(Debug)]
pub struct Converter {
    meta: Arc<FieldMeta>,
    kind: ConverterKind,
    translations: TranslationCache,
}

impl Converter {
    /// `None` when the descriptor's type is unsupported or has no column.
    pub fn new(meta: FieldMeta) -> Option<Self> {
        match Mapping::for_tag(&meta.field_type)? {
            Mapping::Column(kind) => Some(Self {
                meta: Arc::new(meta),
                kind,
                translations: TranslationCache::new(),
            }),
            Mapping::Reverse => None,
        }
    }

    pub fn meta(&self) -> &Arc<FieldMeta> {
        &self.meta
    }

    pub fn kind(&self) -> ConverterKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn translations(&self) -> &TranslationCache {
        &self.translations
    }

    fn field_label(&self) -> String {
        format!("{}.{}", self.meta.model, self.meta.name)
    }

    /// Build the local column.
    ///
    /// `target` is the local table of a many-to-one target; `lang` picks an
    /// already cached translation for label, help and choices.
    pub fn materialize(
        &self,
        target: Option<&str>,
        lang: Option<&str>,
        overrides: Option<&FieldOverride>,
    ) -> LocalField {
        let meta = &self.meta;
        let shown = lang
            .and_then(|l| self.translations.get(l))
            .unwrap_or_else(|| Arc::clone(meta));
        let required = meta.required;

        let kind = match self.kind {
            ConverterKind::Char | ConverterKind::Selection => LocalKind::Char {
                max_length: meta
                    .size
                    .map(|s| s as usize)
                    .filter(|s| *s > 0)
                    .unwrap_or(DEFAULT_CHAR_SIZE),
            },
            ConverterKind::Text => LocalKind::Text,
            ConverterKind::Boolean => LocalKind::Boolean,
            ConverterKind::Integer => LocalKind::Integer,
            ConverterKind::Float => LocalKind::Decimal { digits: meta.digits },
            ConverterKind::Date => LocalKind::Date,
            ConverterKind::DateTime => LocalKind::DateTime,
            ConverterKind::Time => LocalKind::Time,
            ConverterKind::Binary => LocalKind::Binary,
            ConverterKind::Many2One => {
                let remote = meta.relation.clone().unwrap_or_default();
                LocalKind::ForeignKey {
                    target: target.unwrap_or(&remote).to_string(),
                    self_ref: remote == meta.model,
                    remote,
                }
            }
        };

        let mut field = LocalField::new(&meta.name, kind);
        field.label = shown.string.clone();
        field.help = shown.help.clone();
        field.nullable = !required;
        field.editable = !meta.readonly;

        match self.kind {
            ConverterKind::Char | ConverterKind::Text if required => {
                field.default = Some(FieldValue::from(""));
            }
            ConverterKind::Boolean => field.default = Some(FieldValue::Bool(false)),
            ConverterKind::Integer if required => field.default = Some(FieldValue::Integer(0)),
            ConverterKind::Float if required => field.default = Some(FieldValue::Float(0.0)),
            ConverterKind::Date | ConverterKind::DateTime | ConverterKind::Time => {
                field.auto_now_add = required;
            }
            ConverterKind::Selection => {
                // No empty-string default: it would not be a valid choice.
                field.choices = Some(resolve_choices(meta, &shown));
            }
            _ => {}
        }

        if let Some(overrides) = overrides {
            overrides.apply(&mut field);
        }
        field
    }

    /// Remote wire value → local value.
    pub fn convert_inbound(
        &self,
        raw: &Value,
        refs: &dyn RefResolver,
    ) -> Result<FieldValue, MirrorError> {
        if matches!(raw, Value::Null | Value::Bool(false)) {
            return Ok(match self.kind {
                ConverterKind::Boolean => FieldValue::Bool(false),
                _ => FieldValue::Null,
            });
        }

        let value = match (self.kind, raw) {
            (ConverterKind::Boolean, Value::Bool(b)) => FieldValue::Bool(*b),
            (ConverterKind::Char | ConverterKind::Text, Value::String(s)) => FieldValue::from(s.as_str()),
            (ConverterKind::Selection, Value::String(s)) => FieldValue::from(s.as_str()),
            (ConverterKind::Selection, Value::Number(n)) => FieldValue::Text(n.to_string()),
            (ConverterKind::Integer, Value::Number(n)) => {
                FieldValue::Integer(n.as_i64().ok_or_else(|| self.mismatch(raw))?)
            }
            (ConverterKind::Float, Value::Number(n)) => {
                FieldValue::Float(n.as_f64().ok_or_else(|| self.mismatch(raw))?)
            }
            (ConverterKind::Date, Value::String(s)) => FieldValue::Date(
                NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| self.error(e))?,
            ),
            (ConverterKind::DateTime, Value::String(s)) => FieldValue::DateTime(
                NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                    .map_err(|e| self.error(e))?,
            ),
            (ConverterKind::Time, Value::String(s)) => FieldValue::Time(
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|e| self.error(e))?,
            ),
            (ConverterKind::Binary, Value::String(s)) => {
                let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
                FieldValue::Bytes(STANDARD.decode(compact).map_err(|e| self.error(e))?)
            }
            (ConverterKind::Many2One, Value::Array(pair)) if !pair.is_empty() => {
                let remote_id = pair[0].as_i64().ok_or_else(|| self.mismatch(raw))?;
                FieldValue::Ref(refs.resolve_inbound(self.relation()?, remote_id)?)
            }
            (ConverterKind::Many2One, Value::Number(n)) => {
                let remote_id = n.as_i64().ok_or_else(|| self.mismatch(raw))?;
                FieldValue::Ref(refs.resolve_inbound(self.relation()?, remote_id)?)
            }
            _ => return Err(self.mismatch(raw)),
        };
        Ok(value)
    }

    /// Local value → remote wire value. Absent values encode as `false`.
    ///
    /// A many-to-one whose target row was never pushed fails with
    /// [`MirrorError::Unresolvable`]; referents are not pushed implicitly.
    pub fn convert_outbound(
        &self,
        value: &FieldValue,
        refs: &dyn RefResolver,
    ) -> Result<Value, MirrorError> {
        let raw = match (self.kind, value) {
            (_, FieldValue::Null) => Value::Bool(false),
            (ConverterKind::Boolean, FieldValue::Bool(b)) => Value::Bool(*b),
            (ConverterKind::Selection, FieldValue::Text(s)) if self.meta.numeric_selection => {
                Value::from(s.parse::<i64>().map_err(|e| self.error(e))?)
            }
            (
                ConverterKind::Char | ConverterKind::Text | ConverterKind::Selection,
                FieldValue::Text(s),
            ) => Value::String(s.clone()),
            (ConverterKind::Integer, FieldValue::Integer(i)) => Value::from(*i),
            (ConverterKind::Float, FieldValue::Float(f)) => Value::from(*f),
            (ConverterKind::Float, FieldValue::Integer(i)) => Value::from(*i as f64),
            (ConverterKind::Date, FieldValue::Date(d)) => {
                Value::String(d.format(DATE_FORMAT).to_string())
            }
            (ConverterKind::DateTime, FieldValue::DateTime(dt)) => {
                Value::String(dt.format(DATETIME_FORMAT).to_string())
            }
            (ConverterKind::Time, FieldValue::Time(t)) => {
                Value::String(t.format(TIME_FORMAT).to_string())
            }
            (ConverterKind::Binary, FieldValue::Bytes(b)) => Value::String(STANDARD.encode(b)),
            (ConverterKind::Many2One, FieldValue::Ref(id)) => {
                let target = self.relation()?;
                match refs.remote_id_of(target, *id)? {
                    Some(remote_id) => Value::from(remote_id),
                    None => {
                        return Err(MirrorError::Unresolvable {
                            model: target.to_string(),
                            id: *id,
                        })
                    }
                }
            }
            _ => {
                return Err(MirrorError::Conversion {
                    field: self.field_label(),
                    message: format!("{value:?} does not fit a {:?} field", self.kind),
                })
            }
        };
        Ok(raw)
    }

    fn relation(&self) -> Result<&str, MirrorError> {
        self.meta
            .relation
            .as_deref()
            .ok_or_else(|| MirrorError::Conversion {
                field: self.field_label(),
                message: "many2one without relation".into(),
            })
    }

    fn mismatch(&self, raw: &Value) -> MirrorError {
        MirrorError::Conversion {
            field: self.field_label(),
            message: format!("unexpected {raw} for a {:?} field", self.kind),
        }
    }

    fn error(&self, e: impl std::fmt::Display) -> MirrorError {
        MirrorError::Conversion {
            field: self.field_label(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// Local id = remote id + 1000; rows above 2000 were never pushed.
    #[derive(Default)]
    struct Offset {
        inbound: RefCell<Vec<(String, i64)>>,
    }

    impl RefResolver for Offset {
        fn resolve_inbound(&self, model: &str, remote_id: i64) -> Result<i64, MirrorError> {
            self.inbound.borrow_mut().push((model.to_string(), remote_id));
            Ok(remote_id + 1000)
        }

        fn remote_id_of(&self, _model: &str, id: i64) -> Result<Option<i64>, MirrorError> {
            Ok((id < 2000).then(|| id - 1000))
        }
    }

    fn converter(name: &str, descriptor: Value) -> Converter {
        let meta = FieldMeta::from_remote("res.partner", name, &descriptor).unwrap();
        Converter::new(meta).unwrap()
    }

    const SUPPORTED: &[&str] = &[
        "char", "text", "html", "boolean", "integer", "float", "monetary", "date", "datetime",
        "time", "binary", "selection", "many2one",
    ];

    #[test]
    fn tag_table() {
        for tag in SUPPORTED {
            assert!(matches!(Mapping::for_tag(tag), Some(Mapping::Column(_))), "{tag}");
        }
        assert_eq!(Mapping::for_tag("one2many"), Some(Mapping::Reverse));
        assert_eq!(Mapping::for_tag("many2many"), None);
        assert_eq!(Mapping::for_tag("reference"), None);
        assert_eq!(Mapping::for_tag("html"), Some(Mapping::Column(ConverterKind::Text)));
        assert_eq!(Mapping::for_tag("monetary"), Some(Mapping::Column(ConverterKind::Float)));
    }

    #[test]
    fn one2many_and_unsupported_have_no_converter() {
        let o2m = FieldMeta::from_remote(
            "res.partner",
            "child_ids",
            &json!({"type": "one2many", "relation": "res.partner", "relation_field": "parent_id"}),
        )
        .unwrap();
        assert!(Converter::new(o2m).is_none());
        let m2m = FieldMeta::from_remote("res.partner", "tags", &json!({"type": "many2many"})).unwrap();
        assert!(Converter::new(m2m).is_none());
    }

    #[test]
    fn nullable_mirrors_required_for_every_kind() {
        for tag in SUPPORTED {
            for required in [true, false] {
                let c = converter(
                    "f",
                    json!({"type": tag, "required": required, "relation": "res.country"}),
                );
                let field = c.materialize(Some("country"), None, None);
                assert_eq!(field.nullable, !required, "{tag}");
            }
        }
    }

    #[test]
    fn materialize_variant_specifics() {
        let name = converter("name", json!({"type": "char", "required": true, "string": "Name"}));
        let field = name.materialize(None, None, None);
        assert_eq!(field.kind, LocalKind::Char { max_length: 512 });
        assert_eq!(field.default, Some(FieldValue::from("")));
        assert_eq!(field.label, "Name");

        let code = converter("code", json!({"type": "char", "size": 8, "readonly": true}));
        let field = code.materialize(None, None, None);
        assert_eq!(field.kind, LocalKind::Char { max_length: 8 });
        assert!(!field.editable);
        assert_eq!(field.default, None);

        let active = converter("active", json!({"type": "boolean"}));
        assert_eq!(active.materialize(None, None, None).default, Some(FieldValue::Bool(false)));

        let amount = converter("amount", json!({"type": "monetary", "digits": [16, 2], "required": true}));
        let field = amount.materialize(None, None, None);
        assert_eq!(field.kind, LocalKind::Decimal { digits: Some((16, 2)) });
        assert_eq!(field.default, Some(FieldValue::Float(0.0)));

        let created = converter("created", json!({"type": "datetime", "required": true}));
        assert!(created.materialize(None, None, None).auto_now_add);

        let parent = converter("parent_id", json!({"type": "many2one", "relation": "res.partner"}));
        assert_eq!(
            parent.materialize(Some("partner"), None, None).kind,
            LocalKind::ForeignKey {
                target: "partner".into(),
                remote: "res.partner".into(),
                self_ref: true,
            }
        );
    }

    #[test]
    fn selection_uses_cached_translation_and_overrides() {
        let state = converter(
            "state",
            json!({"type": "selection", "string": "State", "selection": [["a", "Alpha"], ["b", "Beta"]]}),
        );
        let untranslated = state.materialize(None, Some("fr_FR"), None);
        assert_eq!(
            untranslated.choices,
            Some(vec![("a".into(), "Alpha".into()), ("b".into(), "Beta".into())])
        );

        let fr = FieldMeta::from_remote(
            "res.partner",
            "state",
            &json!({"type": "selection", "string": "État", "selection": [["b", "Bêta"]]}),
        )
        .unwrap();
        state.translations().insert("fr-fr", fr);
        let overrides = FieldOverride {
            help: Some("Lifecycle".into()),
            ..Default::default()
        };
        let field = state.materialize(None, Some("fr_FR"), Some(&overrides));
        assert_eq!(field.label, "État");
        assert_eq!(field.help, "Lifecycle");
        assert_eq!(
            field.choices,
            Some(vec![("a".into(), "Alpha".into()), ("b".into(), "Bêta".into())])
        );
    }

    #[test]
    fn false_is_absent_except_for_booleans() {
        let refs = Offset::default();
        let name = converter("name", json!({"type": "char"}));
        assert_eq!(name.convert_inbound(&json!(false), &refs).unwrap(), FieldValue::Null);
        assert_eq!(name.convert_inbound(&json!(""), &refs).unwrap(), FieldValue::from(""));
        let count = converter("count", json!({"type": "integer"}));
        assert_eq!(count.convert_inbound(&json!(0), &refs).unwrap(), FieldValue::Integer(0));
        let active = converter("active", json!({"type": "boolean"}));
        assert_eq!(active.convert_inbound(&json!(false), &refs).unwrap(), FieldValue::Bool(false));
        assert_eq!(active.convert_inbound(&Value::Null, &refs).unwrap(), FieldValue::Bool(false));
        assert_eq!(name.convert_outbound(&FieldValue::Null, &refs).unwrap(), json!(false));
    }

    #[test]
    fn binary_base64_both_ways() {
        let refs = Offset::default();
        let logo = converter("logo", json!({"type": "binary"}));
        assert_eq!(
            logo.convert_inbound(&json!("aGVs\nbG8="), &refs).unwrap(),
            FieldValue::Bytes(b"hello".to_vec())
        );
        assert_eq!(
            logo.convert_outbound(&FieldValue::Bytes(b"hello".to_vec()), &refs).unwrap(),
            json!("aGVsbG8=")
        );
        assert!(logo.convert_inbound(&json!("***"), &refs).is_err());
    }

    #[test]
    fn round_trips() {
        let refs = Offset::default();
        let cases = [
            (converter("a", json!({"type": "boolean"})), FieldValue::Bool(true)),
            (converter("b", json!({"type": "boolean"})), FieldValue::Bool(false)),
            (converter("c", json!({"type": "integer"})), FieldValue::Integer(-7)),
            (converter("d", json!({"type": "text"})), FieldValue::from("multi\nline")),
            (converter("e", json!({"type": "binary"})), FieldValue::Bytes(vec![0, 255, 7])),
            (converter("f", json!({"type": "binary"})), FieldValue::Bytes(Vec::new())),
        ];
        for (c, value) in cases {
            let wire = c.convert_outbound(&value, &refs).unwrap();
            assert_eq!(c.convert_inbound(&wire, &refs).unwrap(), value, "{}", c.name());
        }
    }

    #[test]
    fn integer_selection_keys_go_back_as_numbers() {
        let refs = Offset::default();
        let priority = converter(
            "priority",
            json!({"type": "selection", "selection": [[1, "Low"], [2, "High"]]}),
        );
        let local = priority.convert_inbound(&json!(2), &refs).unwrap();
        assert_eq!(local, FieldValue::from("2"));
        assert_eq!(priority.convert_outbound(&local, &refs).unwrap(), json!(2));
        assert!(priority.convert_outbound(&FieldValue::from("high"), &refs).is_err());

        let state = converter("state", json!({"type": "selection", "selection": [["2", "Two"]]}));
        assert_eq!(state.convert_outbound(&FieldValue::from("2"), &refs).unwrap(), json!("2"));
    }

    #[test]
    fn dates_use_wire_formats() {
        let refs = Offset::default();
        let day = converter("day", json!({"type": "date"}));
        let at = converter("at", json!({"type": "datetime"}));
        let time = converter("time", json!({"type": "time"}));

        let d = day.convert_inbound(&json!("2024-02-29"), &refs).unwrap();
        assert_eq!(d, FieldValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        assert_eq!(day.convert_outbound(&d, &refs).unwrap(), json!("2024-02-29"));

        let dt = at.convert_inbound(&json!("2024-02-29 13:45:00"), &refs).unwrap();
        assert_eq!(at.convert_outbound(&dt, &refs).unwrap(), json!("2024-02-29 13:45:00"));

        let t = time.convert_inbound(&json!("08:30:15"), &refs).unwrap();
        assert_eq!(t, FieldValue::Time(NaiveTime::from_hms_opt(8, 30, 15).unwrap()));

        assert!(day.convert_inbound(&json!("29/02/2024"), &refs).is_err());
    }

    #[test]
    fn many2one_goes_through_resolver() {
        let refs = Offset::default();
        let country = converter("country_id", json!({"type": "many2one", "relation": "res.country"}));
        assert_eq!(
            country.convert_inbound(&json!([42, "Belgium"]), &refs).unwrap(),
            FieldValue::Ref(1042)
        );
        assert_eq!(*refs.inbound.borrow(), vec![("res.country".to_string(), 42)]);

        assert_eq!(country.convert_outbound(&FieldValue::Ref(1042), &refs).unwrap(), json!(42));
        let err = country.convert_outbound(&FieldValue::Ref(2500), &refs).unwrap_err();
        assert!(matches!(err, MirrorError::Unresolvable { id: 2500, .. }));
    }

    #[test]
    fn kind_mismatch_is_a_conversion_error() {
        let refs = Offset::default();
        let count = converter("count", json!({"type": "integer"}));
        assert!(matches!(
            count.convert_inbound(&json!("seven"), &refs),
            Err(MirrorError::Conversion { .. })
        ));
        assert!(count.convert_outbound(&FieldValue::from("seven"), &refs).is_err());
    }
}
