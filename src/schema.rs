//! Structural checks for pairing schemas and validation of model output.
//!
//! Pairing schemas are user-defined at runtime, so everything here works on
//! `serde_json::Value` and compiles validators with the `jsonschema` crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// How much the generated schema is trusted before it is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStrictness {
    /// Repair the shape of `required` (bool, object, missing) before checking.
    Lenient,
    /// Check the structural invariants as-is.
    #[default]
    Standard,
    /// Also demand `additionalProperties: false` and every property required.
    Strict,
}

/// Checks the pairing invariant: an object schema whose `required` entries
/// all exist in `properties`, compiling as Draft 7.
///
/// Returns the repaired schema (only differs under `Lenient`) or the list of
/// problems found.
pub fn check_pairing_schema(
    schema: &Value,
    strictness: SchemaStrictness,
) -> Result<Value, Vec<String>> {
    let mut schema = schema.clone();
    if strictness == SchemaStrictness::Lenient {
        normalize_required(&mut schema);
    }

    let mut problems = Vec::new();
    match schema.as_object() {
        Some(root) => {
            if root.get("type").and_then(Value::as_str) != Some("object") {
                problems.push("root schema must have \"type\": \"object\"".to_string());
            }
            if !root.contains_key("properties") {
                problems.push("root schema must declare \"properties\"".to_string());
            }
            check_object_schema(root, "", strictness, &mut problems);
        }
        None => problems.push("schema must be a JSON object".to_string()),
    }

    if problems.is_empty() {
        if let Err(e) = compile(&schema) {
            problems.push(e);
        }
    }

    if problems.is_empty() {
        Ok(schema)
    } else {
        Err(problems)
    }
}

fn check_object_schema(
    node: &Map<String, Value>,
    location: &str,
    strictness: SchemaStrictness,
    problems: &mut Vec<String>,
) {
    let at = |msg: String| {
        if location.is_empty() {
            msg
        } else {
            format!("at '{}': {}", location, msg)
        }
    };

    let properties = match node.get("properties") {
        None => None,
        Some(Value::Object(props)) => Some(props),
        Some(_) => {
            problems.push(at("\"properties\" must be an object".to_string()));
            return;
        }
    };

    let mut required_names: Vec<&str> = Vec::new();
    match node.get("required") {
        None => {}
        Some(Value::Array(items)) => {
            for item in items {
                match item.as_str() {
                    Some(field) if required_names.contains(&field) => {
                        problems.push(at(format!("required field '{}' listed twice", field)))
                    }
                    Some(field) => {
                        if !properties.is_some_and(|p| p.contains_key(field)) {
                            problems.push(at(format!(
                                "required field '{}' is not declared in properties",
                                field
                            )));
                        }
                        required_names.push(field);
                    }
                    None => problems.push(at(format!(
                        "\"required\" entries must be strings, found {}",
                        item
                    ))),
                }
            }
        }
        Some(other) => problems.push(at(format!(
            "\"required\" must be an array of strings, found {}",
            other
        ))),
    }

    if strictness == SchemaStrictness::Strict && properties.is_some() {
        if node.get("additionalProperties") != Some(&Value::Bool(false)) {
            problems.push(at("\"additionalProperties\" must be false".to_string()));
        }
        for name in properties.into_iter().flat_map(|p| p.keys()) {
            if !required_names.contains(&name.as_str()) {
                problems.push(at(format!("property '{}' must be required", name)));
            }
        }
    }

    for (name, sub) in properties.into_iter().flatten() {
        let child = join_location(location, name);
        match sub {
            Value::Object(sub) => check_nested(sub, &child, strictness, problems),
            Value::Bool(_) => {}
            _ => problems.push(format!("at '{}': property schema must be an object", child)),
        }
    }
}

fn check_nested(
    node: &Map<String, Value>,
    location: &str,
    strictness: SchemaStrictness,
    problems: &mut Vec<String>,
) {
    if node.contains_key("properties") || node.contains_key("required") {
        check_object_schema(node, location, strictness, problems);
    }
    if let Some(Value::Object(items)) = node.get("items") {
        check_nested(items, &format!("{}[]", location), strictness, problems);
    }
}

fn join_location(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

/// Coerces `required` into an array of property names at every object level.
///
/// Models regularly emit `"required": true` or a name→bool map instead of
/// the Draft 7 array form.
pub fn normalize_required(schema: &mut Value) {
    let Some(node) = schema.as_object_mut() else {
        return;
    };

    let property_names: Vec<String> = node
        .get("properties")
        .and_then(Value::as_object)
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();

    let repaired = match node.get("required") {
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => None,
        Some(Value::Bool(true)) => Some(property_names.clone()),
        Some(Value::Bool(false)) => Some(Vec::new()),
        Some(Value::Object(map)) => Some(
            map.iter()
                .filter(|(_, v)| v.as_bool().unwrap_or(false))
                .map(|(k, _)| k.clone())
                .collect(),
        ),
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
        ),
        Some(_) => Some(property_names.clone()),
        None if !property_names.is_empty() => Some(Vec::new()),
        None => None,
    };
    if let Some(required) = repaired {
        node.insert(
            "required".to_string(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }

    if let Some(Value::Object(props)) = node.get_mut("properties") {
        for sub in props.values_mut() {
            normalize_required(sub);
        }
    }
    if let Some(items) = node.get_mut("items") {
        normalize_required(items);
    }
}

/// Property names that runtimes mistake for schema keywords when they appear
/// inside `properties`.
pub const RESERVED_PROPERTY_NAMES: [&str; 5] =
    ["type", "properties", "required", "items", "additionalProperties"];
const RESERVED_PREFIX: &str = "_prop_";

/// Maps an escaped property name back to the name the schema declares.
pub type PropertyRenames = HashMap<String, String>;

/// Copy of `schema` with every reserved property name prefixed with
/// `_prop_`, in `properties` and in the matching `required` entries. The
/// returned map undoes the rename on the model's answer.
pub fn escape_reserved_properties(schema: &Value) -> (Value, PropertyRenames) {
    let mut escaped = schema.clone();
    let mut renames = PropertyRenames::new();
    escape_node(&mut escaped, &mut renames);
    (escaped, renames)
}

fn escape_node(node: &mut Value, renames: &mut PropertyRenames) {
    let Some(object) = node.as_object_mut() else {
        return;
    };

    let mut renamed_here = false;
    if let Some(Value::Object(props)) = object.get_mut("properties") {
        let mut escaped = Map::with_capacity(props.len());
        for (name, mut sub) in std::mem::take(props) {
            escape_node(&mut sub, renames);
            if RESERVED_PROPERTY_NAMES.contains(&name.as_str()) {
                let new_name = format!("{}{}", RESERVED_PREFIX, name);
                renames.insert(new_name.clone(), name);
                escaped.insert(new_name, sub);
                renamed_here = true;
            } else {
                escaped.insert(name, sub);
            }
        }
        *props = escaped;
    }
    if renamed_here {
        if let Some(Value::Array(required)) = object.get_mut("required") {
            for entry in required.iter_mut() {
                if let Some(name) = entry.as_str() {
                    if RESERVED_PROPERTY_NAMES.contains(&name) {
                        *entry = Value::String(format!("{}{}", RESERVED_PREFIX, name));
                    }
                }
            }
        }
    }

    match object.get_mut("items") {
        Some(Value::Array(items)) => items.iter_mut().for_each(|i| escape_node(i, renames)),
        Some(items) => escape_node(items, renames),
        None => {}
    }
    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(branches)) = object.get_mut(key) {
            branches.iter_mut().for_each(|b| escape_node(b, renames));
        }
    }
    for key in ["$defs", "definitions"] {
        if let Some(Value::Object(defs)) = object.get_mut(key) {
            defs.values_mut().for_each(|d| escape_node(d, renames));
        }
    }
}

/// Renames escaped keys in a model answer back to the declared names.
pub fn restore_reserved_properties(value: Value, renames: &PropertyRenames) -> Value {
    if renames.is_empty() {
        return value;
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let key = renames.get(&key).cloned().unwrap_or(key);
                    (key, restore_reserved_properties(v, renames))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| restore_reserved_properties(v, renames))
                .collect(),
        ),
        other => other,
    }
}

/// Compiles a Draft 7 validator. The schema itself is checked against the
/// Draft 7 meta-schema during compilation.
pub fn compile(schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::draft7::new(schema).map_err(|e| format!("not a valid Draft 7 schema: {}", e))
}

/// Validates an instance and collects every violation with its path.
pub fn validate_instance(
    validator: &jsonschema::Validator,
    value: &Value,
) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("at '{}': {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Parses model output as JSON, unwrapping a markdown code fence if the
/// runtime left one around the payload.
pub fn parse_json_output(text: &str) -> Result<Value, String> {
    let cleaned = strip_markdown_fences(text);
    serde_json::from_str(&cleaned).map_err(|e| {
        let preview: String = cleaned.chars().take(200).collect();
        format!(
            "invalid JSON at line {}, column {}: {}. Content starts with: {:?}",
            e.line(),
            e.column(),
            e,
            preview
        )
    })
}

pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();

    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip the language tag on the first line
        let content = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
        if let Some(stripped) = content.strip_suffix("```") {
            return stripped.trim().to_string();
        }
        return content.trim().to_string();
    }

    trimmed.to_string()
}
