//! SQL persistence of mirrored rows.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use mirror_sql::{quote_ident, Row, SQLStore, Value};
use tracing::debug;

use crate::error::MirrorError;
use crate::field::{LocalField, LocalKind};
use crate::model::MirrorModel;
use crate::value::{FieldValue, Record};

pub(crate) fn ensure_table(sql: &dyn SQLStore, table: &str) -> Result<(), MirrorError> {
    sql.exec(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id INTEGER PRIMARY KEY AUTOINCREMENT, \
             remote_id INTEGER UNIQUE)",
            quote_ident(table)
        ),
        &[],
    )?;
    Ok(())
}

/// Add the column for `field` unless a previous run already did.
pub(crate) fn add_column(sql: &dyn SQLStore, table: &str, field: &LocalField) -> Result<(), MirrorError> {
    let existing = sql.query(&format!("PRAGMA table_info({})", quote_ident(table)), &[])?;
    if existing.iter().any(|row| row.get_str("name") == Some(field.name.as_str())) {
        return Ok(());
    }
    debug!(table, column = %field.name, "adding column");
    sql.exec(
        &format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table),
            quote_ident(&field.name),
            field.kind.sql_type()
        ),
        &[],
    )?;
    Ok(())
}

fn encode(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Integer(i64::from(*b)),
        FieldValue::Integer(i) | FieldValue::Ref(i) => Value::Integer(*i),
        FieldValue::Float(f) => Value::Real(*f),
        FieldValue::Text(s) => Value::Text(s.clone()),
        FieldValue::Bytes(b) => Value::Blob(b.clone()),
        FieldValue::Date(d) => Value::Text(d.to_string()),
        FieldValue::DateTime(dt) => Value::Text(dt.to_string()),
        FieldValue::Time(t) => Value::Text(t.to_string()),
    }
}

fn decode(field: &LocalField, value: &Value) -> Result<FieldValue, MirrorError> {
    let bad = |what: &str| MirrorError::Storage(format!("column {} holds {what}", field.name));
    let decoded = match (&field.kind, value) {
        (_, Value::Null) => FieldValue::Null,
        (LocalKind::Char { .. } | LocalKind::Text, Value::Text(s)) => FieldValue::Text(s.clone()),
        (LocalKind::Boolean, Value::Integer(i)) => FieldValue::Bool(*i != 0),
        (LocalKind::Integer, Value::Integer(i)) => FieldValue::Integer(*i),
        (LocalKind::Decimal { .. }, Value::Real(f)) => FieldValue::Float(*f),
        (LocalKind::Decimal { .. }, Value::Integer(i)) => FieldValue::Float(*i as f64),
        (LocalKind::Date, Value::Text(s)) => FieldValue::Date(
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| bad("a malformed date"))?,
        ),
        (LocalKind::DateTime, Value::Text(s)) => FieldValue::DateTime(
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                .map_err(|_| bad("a malformed datetime"))?,
        ),
        (LocalKind::Time, Value::Text(s)) => FieldValue::Time(
            NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| bad("a malformed time"))?,
        ),
        (LocalKind::Binary, Value::Blob(b)) => FieldValue::Bytes(b.clone()),
        (LocalKind::ForeignKey { .. }, Value::Integer(i)) => FieldValue::Ref(*i),
        (_, other) => return Err(bad(&format!("{other:?}"))),
    };
    Ok(decoded)
}

fn columns(model: &MirrorModel) -> String {
    let mut cols = vec!["id".to_string(), "remote_id".to_string()];
    cols.extend(model.field_names().iter().map(|n| quote_ident(n)));
    cols.join(", ")
}

fn from_row(model: &MirrorModel, row: &Row) -> Result<Record, MirrorError> {
    let mut record = Record {
        id: row.get_i64("id"),
        remote_id: row.get_i64("remote_id"),
        ..Default::default()
    };
    for field in model.fields() {
        let value = match row.get(field.name()) {
            Some(v) => decode(&field.local, v)?,
            None => FieldValue::Null,
        };
        record.values.insert(field.name().to_string(), value);
    }
    Ok(record)
}

pub(crate) fn select_where(
    sql: &dyn SQLStore,
    model: &MirrorModel,
    column: &str,
    value: Value,
) -> Result<Vec<Record>, MirrorError> {
    let rows = sql.query(
        &format!(
            "SELECT {} FROM {} WHERE {} = ?1 ORDER BY id",
            columns(model),
            quote_ident(model.table()),
            quote_ident(column)
        ),
        &[value],
    )?;
    rows.iter().map(|row| from_row(model, row)).collect()
}

pub(crate) fn get(sql: &dyn SQLStore, model: &MirrorModel, id: i64) -> Result<Option<Record>, MirrorError> {
    Ok(select_where(sql, model, "id", Value::Integer(id))?.into_iter().next())
}

pub(crate) fn find_by_remote_id(
    sql: &dyn SQLStore,
    model: &MirrorModel,
    remote_id: i64,
) -> Result<Option<Record>, MirrorError> {
    Ok(select_where(sql, model, "remote_id", Value::Integer(remote_id))?
        .into_iter()
        .next())
}

/// Insert `record` and return the new row id. Values for unattached
/// fields are ignored.
pub(crate) fn insert(sql: &dyn SQLStore, model: &MirrorModel, record: &Record) -> Result<i64, MirrorError> {
    let mut names = vec!["remote_id".to_string()];
    let mut params = vec![record.remote_id.map(Value::Integer).unwrap_or(Value::Null)];
    for field in model.fields() {
        if let Some(value) = record.get(field.name()) {
            names.push(quote_ident(field.name()));
            params.push(encode(value));
        }
    }
    let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
    let id = sql.insert(
        &format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(model.table()),
            names.join(", "),
            placeholders.join(", ")
        ),
        &params,
    )?;
    Ok(id)
}

/// Write `record`'s remote id and attached values onto row `id`.
pub(crate) fn update(sql: &dyn SQLStore, model: &MirrorModel, id: i64, record: &Record) -> Result<(), MirrorError> {
    let mut sets = vec!["remote_id = ?1".to_string()];
    let mut params = vec![record.remote_id.map(Value::Integer).unwrap_or(Value::Null)];
    for field in model.fields() {
        if let Some(value) = record.get(field.name()) {
            params.push(encode(value));
            sets.push(format!("{} = ?{}", quote_ident(field.name()), params.len()));
        }
    }
    params.push(Value::Integer(id));
    let affected = sql.exec(
        &format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            quote_ident(model.table()),
            sets.join(", "),
            params.len()
        ),
        &params,
    )?;
    if affected == 0 {
        return Err(MirrorError::NotFound(format!("{} row {id}", model.remote())));
    }
    Ok(())
}
