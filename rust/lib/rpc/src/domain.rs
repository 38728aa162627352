//! Odoo search domains.
//!
//! A domain is a list in prefix (Polish) notation: leaves are
//! `[field, operator, value]` triples, `"&"`, `"|"` and `"!"` combine the
//! terms that follow them. Consecutive terms are implicitly AND-ed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RpcError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(Vec<Value>);

impl Domain {
    /// The empty domain, matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `[field, op, value]` leaf.
    pub fn leaf(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        self.0.push(json!([field, op, value.into()]));
        self
    }

    /// Prefix operator: OR of the next two terms.
    pub fn or(mut self) -> Self {
        self.0.push(Value::String("|".into()));
        self
    }

    /// Prefix operator: AND of the next two terms.
    pub fn and(mut self) -> Self {
        self.0.push(Value::String("&".into()));
        self
    }

    /// Prefix operator: negation of the next term.
    pub fn not(mut self) -> Self {
        self.0.push(Value::String("!".into()));
        self
    }

    pub fn terms(&self) -> &[Value] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a domain given as JSON, e.g. from the command line.
    pub fn from_json(text: &str) -> Result<Self, RpcError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| RpcError::Decode(format!("domain: {e}")))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Value::Array(terms) = value else {
            return Err(RpcError::Decode("domain must be a list".into()));
        };
        for term in &terms {
            match term {
                Value::String(op) if matches!(op.as_str(), "&" | "|" | "!") => {}
                Value::Array(leaf) if leaf.len() == 3 && leaf[0].is_string() && leaf[1].is_string() => {}
                other => {
                    return Err(RpcError::Decode(format!("invalid domain term: {other}")));
                }
            }
        }
        Ok(Self(terms))
    }
}

impl From<Domain> for Value {
    fn from(domain: Domain) -> Self {
        Value::Array(domain.0)
    }
}

/// Paging and ordering for `search`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Odoo order clause, e.g. `"name desc"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}
