//! `load`, `search` and `push` — CRUD bridge commands.

use anyhow::{Context, Result};
use tracing::info;

use mirror_core::MirrorConfig;
use mirror_model::{Record, Session};
use mirror_rpc::{Domain, SearchOptions};

use crate::bootstrap;

fn print_records(records: &[Record]) -> Result<()> {
    let json: Vec<serde_json::Value> = records.iter().map(Record::to_json).collect();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub fn load(config: &MirrorConfig, model: &str, ids: &[i64]) -> Result<()> {
    let registry = bootstrap::start(config)?;
    let records = registry.session().load(model, ids)?;
    info!(model, count = records.len(), "loaded");
    print_records(&records)
}

pub fn search(
    config: &MirrorConfig,
    model: &str,
    domain: &str,
    offset: usize,
    limit: Option<usize>,
    order: Option<String>,
) -> Result<()> {
    let domain = Domain::from_json(domain).context("invalid --domain")?;
    let options = SearchOptions { offset, limit, order };
    let registry = bootstrap::start(config)?;
    let records = registry.session().search(model, &domain, &options)?;
    info!(model, count = records.len(), "searched");
    print_records(&records)
}

/// Push local row `id` and record the remote id it ends up with.
pub fn push_row(session: &Session<'_>, model: &str, id: i64, fields: Option<&[String]>) -> Result<i64> {
    let mut record = session
        .get(model, id)?
        .with_context(|| format!("{model} has no local row {id}"))?;
    let names: Option<Vec<&str>> = fields.map(|f| f.iter().map(String::as_str).collect());
    let remote_id = session.push_record(model, &mut record, names.as_deref())?;
    Ok(remote_id)
}

pub fn push(config: &MirrorConfig, model: &str, id: i64, fields: Option<&[String]>) -> Result<()> {
    let registry = bootstrap::start(config)?;
    let remote_id = push_row(&registry.session(), model, id, fields)?;
    println!("{model} {id} -> remote id {remote_id}");
    Ok(())
}
