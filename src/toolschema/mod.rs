//! JSON Schema normalization for tool parameters.
//!
//! The vendor only accepts a restricted subset of JSON Schema. Client tool
//! definitions are rewritten into that subset before being attached to the
//! upstream payload: property names are sanitized to the accepted charset,
//! `anyOf`/`oneOf`/`allOf` unions collapse to a plain string, nesting past
//! two levels (or an object with too many properties) flattens to a string,
//! array items keep only their primitive type, and only a small whitelist of
//! sibling keywords survives alongside `type`/`properties`/`required`.
//! Function names themselves are validated rather than rewritten — a tool
//! whose name doesn't fit the accepted charset is dropped entirely rather
//! than silently renamed underneath the caller.

use serde_json::{json, Map, Value};

const MAX_NESTING_DEPTH: usize = 2;
const MAX_PROPERTIES: usize = 15;
const MAX_PROPERTY_NAME_LEN: usize = 64;
const ALLOWED_SIBLINGS: &[&str] = &[
    "description",
    "enum",
    "pattern",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
];
const ALLOWED_FORMATS: &[&str] = &["email", "uri", "date", "date-time"];

/// Errors raised while normalizing a tool definition.
#[derive(Debug, thiserror::Error)]
pub enum ToolSchemaError {
    #[error("tool schema root must be a JSON object")]
    NotAnObject,
}

/// True when `name` is already in the vendor-accepted charset (ASCII
/// letters, digits, underscores, hyphens) and within the length limit.
/// Function names are never rewritten, only accepted or rejected.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_PROPERTY_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validates a tool's function name. A failing tool should be dropped from
/// the request (with a warning) rather than aborting the whole call.
pub fn validate_function_name(name: &str) -> bool {
    is_valid_name(name)
}

/// Sanitizes a schema *property* name: disallowed bytes are dropped (not
/// replaced), the result is truncated to 64 characters, and an
/// all-disallowed input becomes the placeholder `param`.
fn sanitize_property_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    sanitized.truncate(MAX_PROPERTY_NAME_LEN);
    if sanitized.is_empty() {
        "param".to_string()
    } else {
        sanitized
    }
}

/// Normalizes a client-supplied JSON Schema object into the vendor-accepted
/// subset.
pub fn normalize_schema(schema: &Value) -> Result<Value, ToolSchemaError> {
    let obj = schema.as_object().ok_or(ToolSchemaError::NotAnObject)?;
    Ok(normalize_root(obj))
}

/// Entry point for the root schema: everything a nested object would do,
/// plus the root-only >15-properties affordance-preserving collapse.
fn normalize_root(obj: &Map<String, Value>) -> Value {
    if let Some(collapsed) = collapse_union(obj) {
        return collapsed;
    }
    let declared_type = obj.get("type").and_then(Value::as_str).unwrap_or("object");
    match declared_type {
        "object" => match obj.get("properties").and_then(Value::as_object) {
            Some(props) if props.len() > MAX_PROPERTIES => simplify_top_level(obj, props),
            Some(props) => normalize_object(obj, props, 0),
            None => collapse_to_string(obj),
        },
        "array" => normalize_array(obj),
        other => normalize_primitive(obj, other),
    }
}

fn normalize_node(obj: &Map<String, Value>, depth: usize) -> Value {
    if let Some(collapsed) = collapse_union(obj) {
        return collapsed;
    }
    let declared_type = obj.get("type").and_then(Value::as_str).unwrap_or("object");
    match declared_type {
        "object" => {
            if depth >= MAX_NESTING_DEPTH {
                return collapse_to_string(obj);
            }
            match obj.get("properties").and_then(Value::as_object) {
                Some(props) if props.len() > MAX_PROPERTIES => collapse_to_string(obj),
                Some(props) => normalize_object(obj, props, depth),
                None => collapse_to_string(obj),
            }
        }
        "array" => normalize_array(obj),
        other => normalize_primitive(obj, other),
    }
}

/// `anyOf`/`oneOf`/`allOf` all collapse to a plain string node, since the
/// vendor schema subset has no way to express a union or intersection.
fn collapse_union(obj: &Map<String, Value>) -> Option<Value> {
    if obj.contains_key("anyOf") || obj.contains_key("oneOf") || obj.contains_key("allOf") {
        let mut out = Map::new();
        out.insert("type".to_string(), json!("string"));
        if let Some(description) = obj.get("description") {
            out.insert("description".to_string(), description.clone());
        }
        Some(Value::Object(out))
    } else {
        None
    }
}

fn normalize_object(obj: &Map<String, Value>, props: &Map<String, Value>, depth: usize) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));

    let mut normalized_props = Map::new();
    let mut renamed: Vec<(String, String)> = Vec::new();
    for (key, value) in props {
        let clean_key = sanitize_property_name(key);
        let node = value
            .as_object()
            .map(|o| normalize_node(o, depth + 1))
            .unwrap_or_else(|| json!({ "type": "string" }));
        if normalized_props.insert(clean_key.clone(), node).is_none() {
            renamed.push((key.clone(), clean_key));
        }
    }
    out.insert("properties".to_string(), Value::Object(normalized_props));

    if let Some(required) = obj.get("required").and_then(Value::as_array) {
        let kept: Vec<Value> = required
            .iter()
            .filter_map(|r| r.as_str())
            .filter_map(|name| {
                renamed
                    .iter()
                    .find(|(orig, _)| orig == name)
                    .map(|(_, clean)| json!(clean))
            })
            .collect();
        out.insert("required".to_string(), Value::Array(kept));
    }

    copy_siblings(obj, &mut out);
    out.insert("additionalProperties".to_string(), json!(false));
    Value::Object(out)
}

fn normalize_array(obj: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("array"));
    let items_type = obj
        .get("items")
        .and_then(Value::as_object)
        .and_then(|items| items.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("string");
    out.insert("items".to_string(), json!({ "type": items_type }));
    copy_siblings(obj, &mut out);
    Value::Object(out)
}

fn normalize_primitive(obj: &Map<String, Value>, declared_type: &str) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!(declared_type));
    copy_siblings(obj, &mut out);
    Value::Object(out)
}

fn collapse_to_string(obj: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("string"));
    if let Some(description) = obj.get("description") {
        out.insert("description".to_string(), description.clone());
    }
    Value::Object(out)
}

/// Copies the sibling whitelist verbatim, plus `format` when it's one of the
/// few values the vendor actually understands.
fn copy_siblings(obj: &Map<String, Value>, out: &mut Map<String, Value>) {
    for key in ALLOWED_SIBLINGS {
        if let Some(value) = obj.get(*key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    if let Some(format) = obj.get("format").and_then(Value::as_str) {
        if ALLOWED_FORMATS.contains(&format) {
            out.insert("format".to_string(), json!(format));
        }
    }
}

/// A root object with more than 15 properties can't be flattened to a bare
/// string the way a nested one is — the model still needs *some* affordance
/// to supply arguments. Instead it gets a `data` escape hatch describing the
/// full field count, plus the first 5 original properties (sanitized) kept
/// as-is so common/required fields stay directly fillable.
fn simplify_top_level(obj: &Map<String, Value>, props: &Map<String, Value>) -> Value {
    let mut out = Map::new();
    out.insert("type".to_string(), json!("object"));

    let mut normalized_props = Map::new();
    normalized_props.insert(
        "data".to_string(),
        json!({
            "type": "string",
            "description": format!(
                "provide all {} fields as JSON string",
                props.len()
            ),
        }),
    );
    for (key, value) in props.iter().take(5) {
        let clean_key = sanitize_property_name(key);
        let node = value
            .as_object()
            .map(|o| normalize_node(o, MAX_NESTING_DEPTH))
            .unwrap_or_else(|| json!({ "type": "string" }));
        normalized_props.insert(clean_key, node);
    }
    out.insert("properties".to_string(), Value::Object(normalized_props));
    copy_siblings(obj, &mut out);
    out.insert("additionalProperties".to_string(), json!(false));
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_pass_through_unchanged() {
        assert!(validate_function_name("get_weather"));
        assert!(validate_function_name("get-weather-2"));
    }

    #[test]
    fn names_with_disallowed_characters_are_rejected() {
        assert!(!validate_function_name("get weather@city"));
        assert!(!validate_function_name(""));
    }

    #[test]
    fn overlong_names_are_rejected() {
        let name: String = std::iter::repeat('a').take(65).collect();
        assert!(!validate_function_name(&name));
    }

    #[test]
    fn sanitize_property_name_drops_disallowed_bytes() {
        assert_eq!(sanitize_property_name("user name!"), "username");
    }

    #[test]
    fn sanitize_property_name_falls_back_to_param() {
        assert_eq!(sanitize_property_name("@@@"), "param");
    }

    #[test]
    fn any_of_collapses_to_a_plain_string() {
        let schema = json!({
            "anyOf": [
                { "type": "string" },
                { "type": "integer" }
            ],
            "description": "a value"
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["type"], json!("string"));
        assert_eq!(normalized["description"], json!("a value"));
    }

    #[test]
    fn all_of_also_collapses_to_a_plain_string() {
        let schema = json!({ "allOf": [{ "type": "object" }] });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["type"], json!("string"));
    }

    #[test]
    fn deep_nesting_flattens_past_the_depth_bound() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": {
                    "type": "object",
                    "properties": {
                        "b": {
                            "type": "object",
                            "properties": {
                                "c": { "type": "string" }
                            }
                        }
                    }
                }
            }
        });
        let normalized = normalize_schema(&schema).unwrap();
        let a = &normalized["properties"]["a"];
        assert_eq!(a["type"], json!("object"));
        let b = &a["properties"]["b"];
        assert_eq!(b, &json!({ "type": "string" }));
    }

    #[test]
    fn object_without_properties_collapses_to_string() {
        let schema = json!({ "type": "object" });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized, json!({ "type": "string" }));
    }

    #[test]
    fn nested_object_with_too_many_properties_collapses_to_string() {
        let mut props = Map::new();
        for i in 0..20 {
            props.insert(format!("field{i}"), json!({ "type": "string" }));
        }
        let schema = json!({
            "type": "object",
            "properties": { "nested": { "type": "object", "properties": props } }
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["properties"]["nested"], json!({ "type": "string" }));
    }

    #[test]
    fn array_items_reduce_to_bare_primitive_type() {
        let schema = json!({
            "type": "array",
            "items": { "type": "integer", "description": "ignored on items" }
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["items"], json!({ "type": "integer" }));
    }

    #[test]
    fn required_fields_not_in_properties_are_dropped() {
        let schema = json!({
            "type": "object",
            "properties": { "x": { "type": "string" } },
            "required": ["x", "ghost"]
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["required"], json!(["x"]));
    }

    #[test]
    fn disallowed_sibling_keys_are_dropped_allowed_ones_kept() {
        let schema = json!({
            "type": "string",
            "description": "a city",
            "default": "NYC",
            "minLength": 1
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["description"], json!("a city"));
        assert_eq!(normalized["minLength"], json!(1));
        assert!(normalized.get("default").is_none());
    }

    #[test]
    fn allowed_format_is_kept_disallowed_format_is_dropped() {
        let allowed = json!({ "type": "string", "format": "email" });
        let normalized = normalize_schema(&allowed).unwrap();
        assert_eq!(normalized["format"], json!("email"));

        let disallowed = json!({ "type": "string", "format": "uuid" });
        let normalized = normalize_schema(&disallowed).unwrap();
        assert!(normalized.get("format").is_none());
    }

    #[test]
    fn root_with_too_many_properties_gets_a_data_affordance() {
        let mut props = Map::new();
        for i in 0..20 {
            props.insert(format!("field{i}"), json!({ "type": "string" }));
        }
        let schema = json!({ "type": "object", "properties": props });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["properties"]["data"]["type"], json!("string"));
        assert!(normalized["properties"]["data"]["description"]
            .as_str()
            .unwrap()
            .contains("20 fields"));
        // first 5 original fields stay directly fillable alongside `data`
        assert_eq!(normalized["properties"].as_object().unwrap().len(), 6);
    }

    #[test]
    fn additional_properties_false_is_set_on_objects() {
        let schema = json!({
            "type": "object",
            "properties": { "x": { "type": "string" } }
        });
        let normalized = normalize_schema(&schema).unwrap();
        assert_eq!(normalized["additionalProperties"], json!(false));
    }
}
