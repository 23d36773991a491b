use std::collections::BTreeMap;

use serde_json::Value;

/// Truncate `s` to `max_length` chars, appending `"..."` when
/// `max_length >= 4` (spec.md §4.2.5 step 3).
pub fn truncate_string(s: &str, max_length: usize) -> String {
    if s.chars().count() <= max_length {
        return s.to_string();
    }
    if max_length >= 4 {
        let keep = max_length - 3;
        let mut out: String = s.chars().take(keep).collect();
        out.push_str("...");
        out
    } else {
        s.chars().take(max_length).collect()
    }
}

fn value_to_entry_string(value: &Value, max_length: usize) -> String {
    match value {
        Value::String(s) => truncate_string(s, max_length),
        other => truncate_string(&other.to_string(), max_length),
    }
}

/// Normalize raw (LLM-produced, possibly malformed) JSON into
/// `mapping<category, list<string>>` (spec.md §4.2.5 step 3, ported from
/// `original_source/chat_record/memory.py`'s `_normalize_memory_value`):
/// scalars become single-element lists; non-serializable/odd shapes
/// become their string form; every string is truncated.
pub fn normalize_memory_value(raw: &Value, max_length: usize) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    let Some(obj) = raw.as_object() else {
        out.insert(
            "summary".to_string(),
            vec![value_to_entry_string(raw, max_length)],
        );
        return out;
    };
    for (category, value) in obj {
        let entries = match value {
            Value::Array(items) => items
                .iter()
                .map(|v| value_to_entry_string(v, max_length))
                .collect(),
            other => vec![value_to_entry_string(other, max_length)],
        };
        out.insert(category.clone(), entries);
    }
    out
}

fn map_to_value(map: &BTreeMap<String, Vec<String>>) -> Value {
    serde_json::to_value(map).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Enforce the total serialized length of a normalized memory mapping
/// (spec.md §4.2.5 step 4, ported from
/// `original_source/chat_record/memory.py`'s `_trim_memory_entries` /
/// `_enforce_memory_length`): drop entries from the largest-by-count
/// category first (stable/deterministic, unlike age — category ordering
/// carries no semantics per spec.md §9) until the compact serialization
/// fits, or collapse to a single `summary` field if it still doesn't.
pub fn enforce_memory_length(mut map: BTreeMap<String, Vec<String>>, max_length: usize) -> Value {
    loop {
        let serialized = serde_json::to_string(&map).unwrap_or_default();
        if serialized.len() <= max_length {
            return map_to_value(&map);
        }
        let Some(largest_category) = map
            .iter()
            .max_by_key(|(_, entries)| entries.len())
            .map(|(k, _)| k.clone())
        else {
            break;
        };
        if let Some(entries) = map.get_mut(&largest_category) {
            entries.pop();
            if entries.is_empty() {
                map.remove(&largest_category);
            }
        }
        if map.is_empty() {
            break;
        }
    }

    let serialized = serde_json::to_string(&map).unwrap_or_default();
    let summary = if serialized.len() > max_length {
        truncate_string(&serialized, max_length)
    } else {
        serialized
    };
    serde_json::json!({ "summary": summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_scalar_and_list() {
        let raw = json!({"facts": ["likes tea", "lives in Oslo"], "mood": "curious"});
        let normalized = normalize_memory_value(&raw, 4000);
        assert_eq!(normalized["facts"].len(), 2);
        assert_eq!(normalized["mood"], vec!["curious".to_string()]);
    }

    #[test]
    fn non_object_wraps_as_summary() {
        let raw = json!("just some raw text");
        let normalized = normalize_memory_value(&raw, 4000);
        assert_eq!(normalized.len(), 1);
        assert!(normalized.contains_key("summary"));
    }

    #[test]
    fn enforce_length_fits_within_limit() {
        let mut map = BTreeMap::new();
        map.insert("facts".to_string(), vec!["a".repeat(50); 10]);
        let value = enforce_memory_length(map, 100);
        let serialized = serde_json::to_string(&value).unwrap();
        assert!(serialized.len() <= 100 || value.get("summary").is_some());
    }

    #[test]
    fn drops_from_largest_category_first() {
        let mut map = BTreeMap::new();
        map.insert("big".to_string(), vec!["x".to_string(); 5]);
        map.insert("small".to_string(), vec!["y".to_string(); 1]);
        let value = enforce_memory_length(map, 30);
        let obj = value.as_object().unwrap();
        if let Some(big) = obj.get("big") {
            assert!(big.as_array().unwrap().len() < 5);
        }
    }
}
