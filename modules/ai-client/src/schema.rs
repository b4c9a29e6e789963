use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types that can be requested from Claude as a forced tool call.
///
/// Claude's `input_schema` must be a self-contained object schema, so
/// `$ref`s are inlined and the `definitions` / `$schema` keys are dropped.
/// Optional fields stay optional: callers that parse leniently rely on the
/// model being allowed to omit them.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn tool_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();

        let definitions = value.get("definitions").cloned();
        if let Some(defs) = definitions {
            inline_refs(&mut value, &defs);
        }

        if let serde_json::Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
            map.remove("title");
        }

        value
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn inline_refs(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if let Some(serde_json::Value::String(ref_path)) = map.get("$ref").cloned() {
                let name = ref_path.trim_start_matches("#/definitions/");
                if let Some(def) = definitions.get(name) {
                    *value = def.clone();
                    inline_refs(value, definitions);
                    return;
                }
            }

            // schemars wraps documented nested structs as `allOf: [{$ref}]`
            if let Some(serde_json::Value::Array(all_of)) = map.get("allOf").cloned() {
                if let [single] = all_of.as_slice() {
                    *value = single.clone();
                    inline_refs(value, definitions);
                    return;
                }
            }

            for (_, v) in map.iter_mut() {
                inline_refs(v, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs(item, definitions);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct Judgment {
        id: String,
        relevance: Option<f64>,
    }

    /// Judgments for one batch.
    #[derive(Deserialize, JsonSchema)]
    struct Batch {
        items: Vec<Judgment>,
    }

    #[test]
    fn schema_is_self_contained_object() {
        let schema = Batch::tool_schema();
        let obj = schema.as_object().unwrap();

        assert_eq!(obj.get("type"), Some(&serde_json::json!("object")));
        assert!(!obj.contains_key("definitions"));
        assert!(!obj.contains_key("$schema"));

        let rendered = serde_json::to_string(&schema).unwrap();
        assert!(!rendered.contains("$ref"));
    }

    #[test]
    fn optional_fields_are_not_forced_required() {
        let schema = Batch::tool_schema();
        let item = &schema["properties"]["items"]["items"];
        let required: Vec<&str> = item["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();

        assert!(required.contains(&"id"));
        assert!(!required.contains(&"relevance"));
    }
}
