//! Item validation
//!
//! Checks that an `{ "items": [...] }` payload is structurally consistent with
//! a schema definition. Validation never fails fast: every violation is
//! collected so callers can report all of them at once.
//!
//! ## Checks
//! - all types: every item has a non-empty `id`
//! - tree: every non-empty `parent_id` names the `path` of some item
//! - graph: every `relationships[].target_item_id` names the `id` of some item
//!
//! Strict mode adds duplicate-id detection, attribute checks (compiled to a
//! JSON Schema), tree cycle and depth checks, and relationship-name checks.

use std::collections::HashSet;

use jsonschema::{Draft, JSONSchema};
use petgraph::algo::kosaraju_scc;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, SchemaError};
use crate::schema::{AttributeDef, SchemaDefinition, SchemaType};

/// Outcome of validating a payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Convert into `Err(Validation)` when any check failed
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(SchemaError::validation(self.errors))
        }
    }
}

/// Validation switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Run the stricter checks on top of the structural ones
    #[serde(default)]
    pub strict: bool,
}

/// Validates item payloads against schema definitions
#[derive(Debug, Clone, Default)]
pub struct ItemValidator {
    options: ValidationOptions,
}

impl ItemValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ValidationOptions) -> Self {
        Self { options }
    }

    pub fn strict() -> Self {
        Self::with_options(ValidationOptions { strict: true })
    }

    pub fn options(&self) -> ValidationOptions {
        self.options
    }

    /// Validate a raw `{ "items": [...] }` payload
    pub fn validate(&self, schema: &SchemaDefinition, data: &Value) -> ValidationReport {
        match data.get("items") {
            Some(Value::Array(items)) => self.validate_items(schema, items),
            _ => ValidationReport::from_errors(vec![
                "Data must contain an 'items' array".to_string(),
            ]),
        }
    }

    /// Validate an item list
    pub fn validate_items(&self, schema: &SchemaDefinition, items: &[Value]) -> ValidationReport {
        let mut errors = Vec::new();
        let ids: Vec<Option<String>> = items.iter().map(|item| item_key(item.get("id"))).collect();

        for (index, id) in ids.iter().enumerate() {
            if id.is_none() {
                errors.push(format!("Item at index {} is missing required field 'id'", index));
            }
        }

        match schema.schema_type {
            SchemaType::Tree => check_parents(items, &mut errors),
            SchemaType::Graph => check_targets(items, &ids, &mut errors),
            SchemaType::List => {}
        }

        if self.options.strict {
            check_duplicate_ids(&ids, &mut errors);
            check_attributes(schema, items, &mut errors);
            match schema.schema_type {
                SchemaType::Tree => check_tree_shape(schema, items, &mut errors),
                SchemaType::Graph => check_relationship_names(schema, items, &mut errors),
                SchemaType::List => {}
            }
        }

        ValidationReport::from_errors(errors)
    }
}

/// Validate with the default (structural) checks
pub fn validate(schema: &SchemaDefinition, data: &Value) -> ValidationReport {
    ItemValidator::new().validate(schema, data)
}

/// Normalise an id-like value to a lookup key.
///
/// Non-empty strings are used as-is and numbers by their decimal form; anything
/// else (missing, null, empty, bool, object) has no key.
pub fn item_key(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_parents(items: &[Value], errors: &mut Vec<String>) {
    let paths: HashSet<String> = items
        .iter()
        .filter_map(|item| item_key(item.get("path")))
        .collect();

    for (index, item) in items.iter().enumerate() {
        let parent = match item.get("parent_id") {
            None | Some(Value::Null) => continue,
            Some(Value::String(s)) if s.is_empty() => continue,
            Some(parent) => parent,
        };
        let exists = item_key(Some(parent)).map_or(false, |key| paths.contains(&key));
        if !exists {
            errors.push(format!(
                "Item at index {} references parent path '{}' which does not exist",
                index,
                display_value(parent)
            ));
        }
    }
}

fn check_targets(items: &[Value], ids: &[Option<String>], errors: &mut Vec<String>) {
    let known: HashSet<&str> = ids.iter().flatten().map(String::as_str).collect();

    for (index, item) in items.iter().enumerate() {
        let Some(Value::Array(relationships)) = item.get("relationships") else {
            continue;
        };
        for relationship in relationships {
            let target = relationship.get("target_item_id");
            let exists = item_key(target).map_or(false, |key| known.contains(key.as_str()));
            if !exists {
                let shown = target.map(display_value).unwrap_or_else(|| "<missing>".to_string());
                errors.push(format!(
                    "Item at index {} has a relationship to '{}' which does not exist",
                    index, shown
                ));
            }
        }
    }
}

fn check_duplicate_ids(ids: &[Option<String>], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for (index, id) in ids.iter().enumerate() {
        if let Some(id) = id {
            if !seen.insert(id.as_str()) {
                errors.push(format!("Item at index {} duplicates id '{}'", index, id));
            }
        }
    }
}

/// JSON Schema equivalent of a list of attribute declarations
fn attribute_schema(attributes: &[AttributeDef]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for attribute in attributes {
        properties.insert(
            attribute.name.clone(),
            json!({ "type": attribute.data_type.json_type() }),
        );
        if attribute.required {
            required.push(Value::String(attribute.name.clone()));
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn check_attributes(schema: &SchemaDefinition, items: &[Value], errors: &mut Vec<String>) {
    if schema.attributes.is_empty() {
        return;
    }

    let definition = attribute_schema(&schema.attributes);
    let compiled = match JSONSchema::options().with_draft(Draft::Draft7).compile(&definition) {
        Ok(compiled) => compiled,
        Err(e) => {
            errors.push(format!(
                "Attribute declarations of schema '{}' could not be compiled: {}",
                schema.code, e
            ));
            return;
        }
    };

    for (index, item) in items.iter().enumerate() {
        if let Err(violations) = compiled.validate(item) {
            for violation in violations {
                let location = violation.instance_path.to_string();
                if location.is_empty() {
                    errors.push(format!("Item at index {}: {}", index, violation));
                } else {
                    errors.push(format!("Item at index {} at {}: {}", index, location, violation));
                }
            }
        }
    }
}

fn check_tree_shape(schema: &SchemaDefinition, items: &[Value], errors: &mut Vec<String>) {
    let paths: Vec<Option<String>> = items.iter().map(|item| item_key(item.get("path"))).collect();
    let known: HashSet<&str> = paths.iter().flatten().map(String::as_str).collect();

    // parent -> child
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for path in &known {
        graph.add_node(*path);
    }
    for (index, item) in items.iter().enumerate() {
        let Some(path) = paths[index].as_deref() else {
            continue;
        };
        let Some(parent) = item_key(item.get("parent_id")) else {
            continue;
        };
        if let Some(&parent_node) = known.get(parent.as_str()) {
            graph.add_edge(parent_node, path, ());
        }
    }

    for component in kosaraju_scc(&graph) {
        let self_loop = component.len() == 1 && graph.contains_edge(component[0], component[0]);
        if component.len() > 1 || self_loop {
            let mut members = component;
            members.sort_unstable();
            errors.push(format!(
                "Tree items form a cycle through paths: {}",
                members.join(", ")
            ));
        }
    }

    let Some(max_depth) = schema.tree_config.as_ref().and_then(|c| c.max_depth) else {
        return;
    };
    let separator = schema.separator();
    for (index, path) in paths.iter().enumerate() {
        let Some(path) = path else {
            continue;
        };
        let depth = if separator.is_empty() {
            1
        } else {
            path.split(separator).count()
        };
        if depth > max_depth {
            errors.push(format!(
                "Item at index {} has depth {} which exceeds the maximum of {}",
                index, depth, max_depth
            ));
        }
    }
}

fn check_relationship_names(schema: &SchemaDefinition, items: &[Value], errors: &mut Vec<String>) {
    for (index, item) in items.iter().enumerate() {
        let Some(Value::Array(relationships)) = item.get("relationships") else {
            continue;
        };
        for relationship in relationships {
            if let Some(name) = relationship.get("name").and_then(Value::as_str) {
                if !schema.declares_relationship(name) {
                    errors.push(format!(
                        "Item at index {} uses undeclared relationship '{}'",
                        index, name
                    ));
                }
            }
        }
    }
}
