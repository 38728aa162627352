//! `odoo-mirror schema` — print what each configured model mirrors.

use anyhow::Result;

use mirror_core::MirrorConfig;
use mirror_model::{LocalKind, MirrorModel, Registry};

use crate::bootstrap;

pub fn run(config: &MirrorConfig) -> Result<()> {
    let registry = bootstrap::start(config)?;
    print!("{}", render(&registry));
    Ok(())
}

fn kind_name(kind: &LocalKind) -> String {
    match kind {
        LocalKind::Char { max_length } => format!("char({max_length})"),
        LocalKind::Text => "text".into(),
        LocalKind::Boolean => "boolean".into(),
        LocalKind::Integer => "integer".into(),
        LocalKind::Decimal { digits: Some((p, s)) } => format!("decimal({p},{s})"),
        LocalKind::Decimal { digits: None } => "decimal".into(),
        LocalKind::Date => "date".into(),
        LocalKind::DateTime => "datetime".into(),
        LocalKind::Time => "time".into(),
        LocalKind::Binary => "binary".into(),
        LocalKind::ForeignKey { remote, .. } => format!("-> {remote}"),
    }
}

fn render_model(out: &mut String, model: &MirrorModel) {
    out.push_str(&format!("{} (table {})\n", model.remote(), model.table()));
    for field in model.fields() {
        let local = &field.local;
        let mut flags = Vec::new();
        if !local.nullable {
            flags.push("required".to_string());
        }
        if !local.editable {
            flags.push("readonly".to_string());
        }
        if local.auto_now_add {
            flags.push("auto".to_string());
        }
        if let LocalKind::ForeignKey { .. } = local.kind {
            flags.push(format!("reverse {}", model.related_name(&local.name)));
        }
        out.push_str(&format!(
            "  {:<24} {:<16} {:<32} {}\n",
            local.name,
            kind_name(&local.kind),
            local.label,
            flags.join(", ")
        ));
    }
}

pub fn render(registry: &Registry) -> String {
    let mut out = String::new();
    for model in registry.models() {
        render_model(&mut out, &model);
    }
    let dangling = registry.validate();
    if !dangling.is_empty() {
        out.push_str("unresolved relations:\n");
        for d in dangling {
            out.push_str(&format!("  {d}\n"));
        }
    }
    out
}
