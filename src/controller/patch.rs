//! Merge-patch construction (RFC 7396) for persisting annotation changes.

use std::collections::BTreeMap;

use serde_json::{json, Value as Json};

/// Builds a `metadata.annotations` merge-patch body diffing `original`
/// against `updated`. Keys removed from `updated` are set to `null`
/// (merge-patch delete); unchanged keys are omitted entirely. Returns `None`
/// when there is nothing to persist.
#[must_use]
pub fn build_annotation_patch(
    original: &BTreeMap<String, String>,
    updated: &BTreeMap<String, String>,
) -> Option<Json> {
    if original == updated {
        return None;
    }

    let mut annotations = serde_json::Map::new();
    for (key, value) in updated {
        if original.get(key) != Some(value) {
            annotations.insert(key.clone(), Json::String(value.clone()));
        }
    }
    for key in original.keys() {
        if !updated.contains_key(key) {
            annotations.insert(key.clone(), Json::Null);
        }
    }

    if annotations.is_empty() {
        return None;
    }

    Some(json!({
        "metadata": {
            "annotations": Json::Object(annotations)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_maps_produce_no_patch() {
        let m = BTreeMap::from([("a".to_string(), "1".to_string())]);
        assert_eq!(build_annotation_patch(&m, &m), None);
    }

    #[test]
    fn added_and_changed_keys_are_set() {
        let original = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let updated = BTreeMap::from([
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "new".to_string()),
        ]);
        let patch = build_annotation_patch(&original, &updated).unwrap();
        let annotations = &patch["metadata"]["annotations"];
        assert_eq!(annotations["a"], json!("2"));
        assert_eq!(annotations["b"], json!("new"));
    }

    #[test]
    fn removed_keys_are_nulled() {
        let original = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let updated = BTreeMap::new();
        let patch = build_annotation_patch(&original, &updated).unwrap();
        assert_eq!(patch["metadata"]["annotations"]["a"], Json::Null);
    }

    #[test]
    fn validates_against_json_patch_merge_semantics() {
        let original = BTreeMap::from([("a".to_string(), "1".to_string()), ("c".to_string(), "keep".to_string())]);
        let updated = BTreeMap::from([("a".to_string(), "2".to_string()), ("c".to_string(), "keep".to_string())]);
        let patch = build_annotation_patch(&original, &updated).unwrap();

        let mut doc = json!({"metadata": {"annotations": {"a": "1", "c": "keep"}}});
        json_patch::merge(&mut doc, &patch);
        assert_eq!(doc["metadata"]["annotations"]["a"], json!("2"));
        assert_eq!(doc["metadata"]["annotations"]["c"], json!("keep"));
    }
}
