//! Local field descriptors produced by converters.

use crate::error::MirrorError;
use crate::value::FieldValue;

/// Column kind of a local field.
#[derive(Debug, Clone, PartialEq)]
pub enum LocalKind {
    Char { max_length: usize },
    Text,
    Boolean,
    Integer,
    /// `(precision, scale)` when the remote side declares digits.
    Decimal { digits: Option<(u32, u32)> },
    Date,
    DateTime,
    Time,
    Binary,
    /// Reference to a row of another mirrored model.
    ForeignKey {
        /// Local table of the target.
        target: String,
        /// Remote model name of the target.
        remote: String,
        self_ref: bool,
    },
}

impl LocalKind {
    /// SQLite column declaration.
    ///
    /// Columns are always nullable in SQL because they are attached with
    /// `ALTER TABLE ... ADD COLUMN` after the table exists; nullability and
    /// the other constraints are checked by [`LocalField::validate`].
    pub fn sql_type(&self) -> String {
        match self {
            LocalKind::Char { .. } | LocalKind::Text => "TEXT".to_string(),
            LocalKind::Date | LocalKind::DateTime | LocalKind::Time => "TEXT".to_string(),
            LocalKind::Boolean | LocalKind::Integer => "INTEGER".to_string(),
            LocalKind::Decimal { .. } => "REAL".to_string(),
            LocalKind::Binary => "BLOB".to_string(),
            LocalKind::ForeignKey { target, .. } => {
                format!("INTEGER REFERENCES {}(id)", mirror_sql::quote_ident(target))
            }
        }
    }

    fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (LocalKind::Char { .. } | LocalKind::Text, FieldValue::Text(_))
                | (LocalKind::Boolean, FieldValue::Bool(_))
                | (LocalKind::Integer, FieldValue::Integer(_))
                | (LocalKind::Decimal { .. }, FieldValue::Float(_) | FieldValue::Integer(_))
                | (LocalKind::Date, FieldValue::Date(_))
                | (LocalKind::DateTime, FieldValue::DateTime(_))
                | (LocalKind::Time, FieldValue::Time(_))
                | (LocalKind::Binary, FieldValue::Bytes(_))
                | (LocalKind::ForeignKey { .. }, FieldValue::Ref(_))
        )
    }
}

/// A column of a mirrored model, with its constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalField {
    pub name: String,
    pub kind: LocalKind,
    pub label: String,
    pub help: String,
    pub nullable: bool,
    pub editable: bool,
    pub default: Option<FieldValue>,
    /// `(value, label)` pairs for selection fields.
    pub choices: Option<Vec<(String, String)>>,
    /// Filled with the current date/time when a row is first saved.
    pub auto_now_add: bool,
}

impl LocalField {
    pub fn new(name: &str, kind: LocalKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            label: String::new(),
            help: String::new(),
            nullable: true,
            editable: true,
            default: None,
            choices: None,
            auto_now_add: false,
        }
    }

    /// Check `value` against the field's kind and constraints.
    pub fn validate(&self, value: &FieldValue) -> Result<(), MirrorError> {
        if !self.kind.accepts(value) {
            return Err(MirrorError::Validation(format!(
                "{}: {:?} does not fit a {:?} column",
                self.name, value, self.kind
            )));
        }
        if value.is_null() {
            if self.nullable {
                return Ok(());
            }
            return Err(MirrorError::Validation(format!("{} may not be null", self.name)));
        }
        if let (LocalKind::Char { max_length }, FieldValue::Text(s)) = (&self.kind, value) {
            if s.chars().count() > *max_length {
                return Err(MirrorError::Validation(format!(
                    "{} is longer than {} characters",
                    self.name, max_length
                )));
            }
        }
        if let (Some(choices), FieldValue::Text(s)) = (&self.choices, value) {
            if !choices.iter().any(|(v, _)| v == s) {
                return Err(MirrorError::Validation(format!(
                    "{:?} is not a valid choice for {}",
                    s, self.name
                )));
            }
        }
        Ok(())
    }
}

/// Caller adjustments applied on top of what a converter materializes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldOverride {
    pub label: Option<String>,
    pub help: Option<String>,
    pub nullable: Option<bool>,
    pub editable: Option<bool>,
    pub default: Option<FieldValue>,
}

impl FieldOverride {
    pub fn apply(&self, field: &mut LocalField) {
        if let Some(label) = &self.label {
            field.label = label.clone();
        }
        if let Some(help) = &self.help {
            field.help = help.clone();
        }
        if let Some(nullable) = self.nullable {
            field.nullable = nullable;
        }
        if let Some(editable) = self.editable {
            field.editable = editable;
        }
        if let Some(default) = &self.default {
            field.default = Some(default.clone());
        }
    }
}
