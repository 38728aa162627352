mod common;

use std::collections::BTreeMap;

use mirror_model::{FieldOverride, LocalField, LocalKind, MirrorError, ModelSpec, RelationKind};
use mirror_rpc::RemoteCall;
use serde_json::json;

use common::{fixture, fixture_with, remote};

fn columns(fx: &common::Fixture, model: &str) -> BTreeMap<String, LocalField> {
    fx.registry
        .model(model)
        .unwrap()
        .fields()
        .iter()
        .map(|f| (f.name().to_string(), f.local.clone()))
        .collect()
}

#[test]
fn definition_order_does_not_matter() {
    let partner_first = fixture();

    let country_first = fixture_with(remote());
    country_first
        .registry
        .finalize(ModelSpec::new("country", "res.country"))
        .unwrap();
    country_first
        .registry
        .finalize(ModelSpec::new("partner", "res.partner"))
        .unwrap();

    for model in ["res.partner", "res.country"] {
        assert_eq!(columns(&partner_first, model), columns(&country_first, model), "{model}");
    }
    for fx in [&partner_first, &country_first] {
        assert!(fx.registry.validate().is_empty());
        let partner = fx.registry.model("res.partner").unwrap();
        assert_eq!(partner.related_name("parent_id"), "child_ids");
        assert_eq!(partner.related_name("country_id"), "partner_set");
    }
}

#[test]
fn mirrored_columns_follow_remote_metadata() {
    let fx = fixture();
    let cols = columns(&fx, "res.partner");

    let names: Vec<&str> = cols.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["birthday", "country_id", "credit", "email", "is_company", "logo", "name", "parent_id", "state"]
    );

    assert!(!cols["name"].nullable);
    assert_eq!(cols["name"].label, "Name");
    assert!(cols["email"].nullable);
    assert_eq!(cols["credit"].kind, LocalKind::Decimal { digits: Some((16, 2)) });
    assert_eq!(
        cols["parent_id"].kind,
        LocalKind::ForeignKey {
            target: "partner".into(),
            remote: "res.partner".into(),
            self_ref: true,
        }
    );
    assert_eq!(
        cols["country_id"].kind,
        LocalKind::ForeignKey {
            target: "country".into(),
            remote: "res.country".into(),
            self_ref: false,
        }
    );
    assert_eq!(
        cols["state"].choices.as_ref().unwrap().iter().map(|(v, _)| v.as_str()).collect::<Vec<_>>(),
        vec!["draft", "open", "done"]
    );
}

#[test]
fn allow_list_ignore_list_and_overrides() {
    let fx = fixture_with(remote());
    let partner = fx
        .registry
        .finalize(
            ModelSpec::new("partner", "res.partner")
                .with_fields(&["name", "email", "logo", "id"])
                .ignore(&["logo"])
                .override_field(
                    "email",
                    FieldOverride {
                        label: Some("E-mail".into()),
                        nullable: Some(false),
                        ..Default::default()
                    },
                ),
        )
        .unwrap();

    assert_eq!(partner.field_names(), vec!["name".to_string(), "email".to_string()]);
    let email = partner.field("email").unwrap();
    assert_eq!(email.local.label, "E-mail");
    assert!(!email.local.nullable);

    assert_eq!(
        fx.remote.calls(),
        vec![RemoteCall::Fields {
            model: "res.partner".into(),
            names: Some(vec!["name".into(), "email".into(), "id".into()]),
            lang: None,
        }]
    );
}

#[test]
fn dangling_relations_are_reported() {
    let fx = fixture_with(remote());
    fx.registry
        .finalize(ModelSpec::new("partner", "res.partner"))
        .unwrap();

    let dangling = fx.registry.validate();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].origin, "res.partner");
    assert_eq!(dangling[0].field, "country_id");
    assert_eq!(dangling[0].target, "res.country");
    assert_eq!(dangling[0].kind, RelationKind::Many2One);
}

#[test]
fn crud_requires_a_finalized_model() {
    let fx = fixture_with(remote());
    let err = fx.registry.session().load("res.partner", &[1]).unwrap_err();
    assert!(matches!(err, MirrorError::UnknownModel(_)));
}

#[test]
fn columns_survive_a_second_bootstrap_on_the_same_database() {
    let fx = fixture();
    let remote = std::sync::Arc::new(remote());
    let again = mirror_model::Registry::new(remote, fx.sql.clone(), "en_US");
    again.finalize(ModelSpec::new("country", "res.country")).unwrap();
    again.finalize(ModelSpec::new("partner", "res.partner")).unwrap();
    assert!(again.validate().is_empty());
}

#[test]
fn translated_labels_are_fetched_once_per_language() {
    let remote = remote();
    remote.add_translation(
        "res.partner",
        "fr_FR",
        json!({
            "name": {"type": "char", "string": "Nom"},
            "state": {
                "type": "selection",
                "string": "Statut",
                "selection": [["done", "Terminé"], ["draft", "Brouillon"]],
            },
        }),
    );
    let fx = fixture_with(remote);
    fx.registry.finalize(ModelSpec::new("partner", "res.partner")).unwrap();
    fx.remote.clear_calls();
    let session = fx.registry.session();

    assert_eq!(session.label("res.partner", "name", "fr-fr").unwrap(), "Nom");
    // Not translated by the server: untranslated label.
    assert_eq!(session.label("res.partner", "email", "fr_FR").unwrap(), "Email");
    assert_eq!(
        session.choices("res.partner", "state", "fr_FR").unwrap(),
        vec![
            ("draft".to_string(), "Brouillon".to_string()),
            ("open".to_string(), "Open".to_string()),
            ("done".to_string(), "Terminé".to_string()),
        ]
    );
    let fetches = fx
        .remote
        .calls()
        .iter()
        .filter(|c| matches!(c, RemoteCall::Fields { lang: Some(_), .. }))
        .count();
    assert_eq!(fetches, 1);

    // No translation at all for German: original labels and order.
    assert_eq!(session.help("res.partner", "name", "de_DE").unwrap(), "");
    assert_eq!(
        session.choices("res.partner", "state", "de-de").unwrap(),
        vec![
            ("draft".to_string(), "Draft".to_string()),
            ("open".to_string(), "Open".to_string()),
            ("done".to_string(), "Done".to_string()),
        ]
    );
    assert!(matches!(
        session.label("res.partner", "nope", "fr_FR"),
        Err(MirrorError::UnknownField { .. })
    ));
}
