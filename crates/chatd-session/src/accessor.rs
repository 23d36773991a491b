use serde_json::Value;

use chatd_core::render;

/// Read-only view over an attached session's merged `agent_config` and
/// `memory_data`, exposing dotted-path lookups (SPEC_FULL §4.3, grounded
/// on `original_source/workflow_chat.py`'s `DataProxy`/`UserDataWrapper`
/// pattern). Rust has no `__getattr__` equivalent, so this is a pair of
/// plain methods rather than a dynamic-attribute proxy; template
/// rendering variables are assembled explicitly by callers instead.
#[derive(Debug, Clone)]
pub struct UserDataAccessor {
    pub config: Value,
    pub memory: Value,
}

impl UserDataAccessor {
    pub fn new(config: Value, memory: Value) -> Self {
        Self { config, memory }
    }

    /// `None` on any missing key or non-object intermediate along `path`.
    pub fn get_config(&self, path: &str) -> Option<&Value> {
        render::lookup(&self.config, path)
    }

    pub fn get_memory(&self, path: &str) -> Option<&Value> {
        render::lookup(&self.memory, path)
    }
}

/// Recursive merge of JSON objects: `overlay` wins key-by-key, nested
/// objects merge recursively, everything else (arrays, scalars, type
/// mismatches) is replaced wholesale by `overlay` (SPEC_FULL §4.3 deep
/// merge design note).
pub fn deep_merge_json(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let next = match merged.get(key) {
                    Some(base_value) => deep_merge_json(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        _ => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merges_nested_objects_overlay_wins() {
        let base = json!({"a": {"x": 1, "y": 2}, "b": "base"});
        let overlay = json!({"a": {"y": 20, "z": 3}, "b": "overlay"});
        let merged = deep_merge_json(&base, &overlay);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 20, "z": 3}, "b": "overlay"}));
    }

    #[test]
    fn array_replaced_wholesale() {
        let base = json!({"list": [1, 2, 3]});
        let overlay = json!({"list": [9]});
        assert_eq!(deep_merge_json(&base, &overlay), json!({"list": [9]}));
    }

    #[test]
    fn accessor_dotted_path_lookup() {
        let accessor = UserDataAccessor::new(
            json!({"voice": {"name": "nova"}}),
            json!({"preferences": {"likes": ["tea"]}}),
        );
        assert_eq!(
            accessor.get_config("voice.name"),
            Some(&Value::String("nova".to_string()))
        );
        assert_eq!(accessor.get_config("voice.missing"), None);
        assert_eq!(
            accessor.get_memory("preferences.likes"),
            Some(&json!(["tea"]))
        );
    }
}
