//! Remote field descriptors as answered by `fields_get`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::MirrorError;

/// Snapshot of one remote field's metadata.
///
/// Odoo sends `false` for every attribute that does not apply to a field
/// (`"help": false`, `"digits": false`, ...); those decode as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    /// Field name. Not part of the wire descriptor; filled from the map key.
    #[serde(default)]
    pub name: String,
    /// Owning remote model. Filled by the registry.
    #[serde(default)]
    pub model: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, deserialize_with = "flag")]
    pub required: bool,
    #[serde(default, deserialize_with = "flag")]
    pub readonly: bool,
    #[serde(default, deserialize_with = "flag")]
    pub translate: bool,
    #[serde(default, deserialize_with = "falsy")]
    pub size: Option<u32>,
    /// `(precision, scale)`.
    #[serde(default, deserialize_with = "falsy")]
    pub digits: Option<(u32, u32)>,
    #[serde(default, deserialize_with = "falsy")]
    pub relation: Option<String>,
    #[serde(default, deserialize_with = "falsy")]
    pub relation_field: Option<String>,
    /// `(value, label)` pairs in server order.
    #[serde(default, deserialize_with = "selection")]
    pub selection: Vec<(String, String)>,
    /// Selection keys are integers on the wire.
    #[serde(skip)]
    pub numeric_selection: bool,
    /// Label.
    #[serde(default, deserialize_with = "text")]
    pub string: String,
    #[serde(default, deserialize_with = "text")]
    pub help: String,
}

impl FieldMeta {
    /// Decode the descriptor of `name` on `model`.
    pub fn from_remote(model: &str, name: &str, raw: &Value) -> Result<Self, MirrorError> {
        let mut meta = FieldMeta::deserialize(raw).map_err(|e| MirrorError::Conversion {
            field: format!("{model}.{name}"),
            message: format!("bad field descriptor: {e}"),
        })?;
        meta.name = name.to_string();
        meta.model = model.to_string();
        meta.numeric_selection = numeric_keys(raw.get("selection"));
        Ok(meta)
    }

    /// Label of a selection value, if the value is part of the selection.
    pub fn selection_label(&self, value: &str) -> Option<&str> {
        self.selection
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, label)| label.as_str())
    }
}

fn falsy<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(d)? {
        Value::Null | Value::Bool(false) => Ok(None),
        other => T::deserialize(other).map(Some).map_err(D::Error::custom),
    }
}

fn flag<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(d)?, Value::Bool(true)))
}

fn text<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(falsy::<D, String>(d)?.unwrap_or_default())
}

fn numeric_keys(selection: Option<&Value>) -> bool {
    let Some(Value::Array(items)) = selection else {
        return false;
    };
    let keys: Vec<&Value> = items
        .iter()
        .filter_map(|item| item.as_array().filter(|pair| pair.len() == 2).map(|pair| &pair[0]))
        .collect();
    !keys.is_empty() && keys.iter().all(|k| k.is_i64())
}

fn selection<'de, D>(d: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    // Computed selections may come back as a method name; keep only literal pairs.
    let Value::Array(items) = Value::deserialize(d)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::Array(pair) if pair.len() == 2 => {
                let key = match &pair[0] {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let label = pair[1].as_str().unwrap_or_default().to_string();
                Some((key, label))
            }
            _ => None,
        })
        .collect())
}
