//! Per-field cache of translated descriptors.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use mirror_rpc::normalize_lang;

use crate::meta::FieldMeta;

/// Language → translated descriptor for one field.
///
/// Keys are normalized (`fr-be` and `fr_BE` share an entry). Filling the
/// cache is the owning model's job, see `MirrorModel::translated`.
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RwLock<HashMap<String, Arc<FieldMeta>>>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, lang: &str) -> Option<Arc<FieldMeta>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&normalize_lang(lang)).cloned()
    }

    pub fn insert(&self, lang: &str, meta: FieldMeta) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(normalize_lang(lang), Arc::new(meta));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Selection options of `base` with labels taken from `translated`.
///
/// The order and values are always those of `base`; a value the translated
/// descriptor does not know keeps its original label.
pub fn resolve_choices(base: &FieldMeta, translated: &FieldMeta) -> Vec<(String, String)> {
    base.selection
        .iter()
        .map(|(value, label)| {
            let label = translated.selection_label(value).unwrap_or(label);
            (value.clone(), label.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(selection: serde_json::Value) -> FieldMeta {
        FieldMeta::from_remote(
            "sale.order",
            "state",
            &json!({"type": "selection", "string": "State", "selection": selection}),
        )
        .unwrap()
    }

    #[test]
    fn keys_are_normalized() {
        let cache = TranslationCache::new();
        assert!(cache.is_empty());
        cache.insert("fr-be", state(json!([])));
        assert!(cache.get("fr_BE").is_some());
        assert!(cache.get("FR_be").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn choices_keep_base_order_and_fall_back() {
        let base = state(json!([["draft", "Draft"], ["sent", "Sent"], ["done", "Done"]]));
        let fr = state(json!([["done", "Terminé"], ["draft", "Brouillon"]]));
        assert_eq!(
            resolve_choices(&base, &fr),
            vec![
                ("draft".to_string(), "Brouillon".to_string()),
                ("sent".to_string(), "Sent".to_string()),
                ("done".to_string(), "Terminé".to_string()),
            ]
        );
    }
}
