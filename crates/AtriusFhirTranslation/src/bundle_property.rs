//! Assigning a value at a dotted path in the bundle, creating missing nodes.
//!
//! `Bundle.entry.resource.ofType(Patient).extension('https://x.org/race').valueString`
//! is split into its parts. The longest prefix that finds exactly one node is the
//! parent to build under. Prefixes finding nothing or several nodes are passed over.
//! The remaining parts, except the last, are created as new children and the last
//! part names the property that receives the value.

use atrius_fhir_path::{EvaluationContext, evaluate_expression};
use atrius_fhirpath_support::type_info::{is_integer_type, is_string_type, is_temporal_type};
use atrius_fhirpath_support::{FhirNode, ModelProvider};
use serde_json::{Map, Number, Value, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};

use crate::context::ConstantScope;
use crate::error::TranslationError;

/// Splits `path` on dots that are outside parentheses and string literals.
pub fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in path.chars() {
        if let Some(open) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '.' if depth == 0 => parts.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    parts.push(current.trim().to_string());
    parts
}

/// The url of an `extension('<url>')` part.
fn extension_url(part: &str) -> Option<&str> {
    let argument = part.strip_prefix("extension(")?.strip_suffix(')')?.trim();
    ['\'', '"']
        .iter()
        .find_map(|q| argument.strip_prefix(*q)?.strip_suffix(*q))
}

fn is_identifier(part: &str) -> bool {
    part.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Assigns `value` at `path`, evaluated relative to `focus`.
///
/// `focus` and `value` are released before `tree` is written, so the write copies
/// the tree only when something else still shares it.
///
/// Paths that cannot be used are logged and skipped: too short, naming an unknown
/// property, or needing a constant part to be created.
/// A value that cannot be stored in the target property's type is an error, as is
/// a path that would create a Bundle entry.
pub(crate) fn assign_bundle_property(
    element: &str,
    path: &str,
    value: FhirNode,
    tree: &mut Arc<Value>,
    focus: FhirNode,
    scope: &ConstantScope,
    model: &dyn ModelProvider,
) -> Result<(), TranslationError> {
    let value = value.into_owned();
    let parts = split_path(path);
    if parts.len() < 2 || parts.iter().any(String::is_empty) {
        error!(element, path, "Bundle property must be a dotted path of at least two parts");
        return Ok(());
    }
    let Some((terminal, parents)) = parts.split_last() else {
        return Ok(());
    };
    if terminal.contains('%') {
        error!(element, path, "Constants cannot name the assigned property");
        return Ok(());
    }

    let mut found = None;
    {
        let context = EvaluationContext::focused(Arc::clone(tree), focus, model).with_constants(scope);
        for depth in (1..=parents.len()).rev() {
            let prefix = parents[..depth].join(".");
            let mut nodes = evaluate_expression(&prefix, &context)
                .map_err(|e| TranslationError::evaluation(element, &prefix, e))?;
            match nodes.len() {
                1 => {
                    found = nodes
                        .pop()
                        .map(|parent| (parent.location.clone(), parent.fhir_type(), depth));
                    break;
                }
                count if parents[depth - 1].contains('%') => {
                    error!(element, path, part = %parents[depth - 1], count, "Constants cannot be used to create missing nodes");
                    return Ok(());
                }
                count => {
                    debug!(element, path = %prefix, count, "Prefix is not a single node; trying a shorter one");
                }
            }
        }
    }

    let Some((location, mut node_type, depth)) = found else {
        error!(element, path, "No part of the bundle property path exists");
        return Ok(());
    };
    let missing = &parents[depth..];
    if missing.iter().any(|part| part == "entry") {
        return Err(TranslationError::Internal(format!(
            "Element '{}' would have to create a Bundle entry for '{}'",
            element, path
        )));
    }
    let Some(location) = location else {
        error!(element, path, "Bundle property parent is a computed value");
        return Ok(());
    };
    let Some(mut node) = location.resolve_mut(Arc::make_mut(tree)) else {
        return Err(TranslationError::Internal(format!(
            "Element '{}' lost its parent node at {}",
            element, location
        )));
    };

    for part in missing {
        debug!(element, part = %part, "Creating missing node");
        let (child, child_type) = create_child(element, node, node_type.as_deref(), part, model)?;
        node = child;
        node_type = child_type;
    }
    set_property(element, node, node_type.as_deref(), terminal, &value, model)
}

fn object<'v>(
    element: &str,
    node: &'v mut Value,
    part: &str,
) -> Result<&'v mut Map<String, Value>, TranslationError> {
    match node {
        Value::Object(map) => Ok(map),
        _ => Err(TranslationError::Schema(format!(
            "Element '{}' cannot place '{}' under a non-object value",
            element, part
        ))),
    }
}

fn push_object<'v>(
    element: &str,
    slot: &'v mut Value,
    part: &str,
    child: Value,
) -> Result<&'v mut Value, TranslationError> {
    let Value::Array(items) = slot else {
        return Err(TranslationError::Schema(format!(
            "Element '{}' expected '{}' to hold a list",
            element, part
        )));
    };
    items.push(child);
    items
        .last_mut()
        .ok_or_else(|| TranslationError::Internal(format!("Element '{}' lost '{}'", element, part)))
}

fn create_child<'v>(
    element: &str,
    node: &'v mut Value,
    node_type: Option<&str>,
    part: &str,
    model: &dyn ModelProvider,
) -> Result<(&'v mut Value, Option<String>), TranslationError> {
    let map = object(element, node, part)?;

    if let Some(url) = extension_url(part) {
        let slot = map
            .entry("extension")
            .or_insert_with(|| Value::Array(Vec::new()));
        let created = push_object(element, slot, part, json!({ "url": url }))?;
        return Ok((created, Some("Extension".to_string())));
    }
    if !is_identifier(part) {
        return Err(TranslationError::Schema(format!(
            "Element '{}' cannot create a node for '{}'",
            element, part
        )));
    }

    let info = node_type.and_then(|t| model.element(t, part));
    let child_type = info
        .as_ref()
        .map(|i| i.type_name.clone())
        .filter(|t| !t.is_empty());
    let is_array = info.as_ref().is_some_and(|i| i.is_array)
        || matches!(map.get(part), Some(Value::Array(_)));

    let slot = map.entry(part.to_string()).or_insert_with(|| {
        if is_array {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        }
    });
    if is_array {
        return Ok((push_object(element, slot, part, Value::Object(Map::new()))?, child_type));
    }
    if !slot.is_object() {
        return Err(TranslationError::Schema(format!(
            "Element '{}' found a non-object value at '{}'",
            element, part
        )));
    }
    Ok((slot, child_type))
}

/// JSON form of `value` as a `target_type`, or `None` when it does not convert.
fn coerce(value: &FhirNode, target_type: &str) -> Option<Value> {
    if is_string_type(target_type) || is_temporal_type(target_type) {
        return match value.value() {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                value.as_string().map(Value::String)
            }
            _ => None,
        };
    }
    if is_integer_type(target_type) {
        let number = value.as_integer().or_else(|| match value.value() {
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })?;
        let in_range = match target_type {
            "positiveInt" => number > 0,
            "unsignedInt" => number >= 0,
            "integer" => i32::try_from(number).is_ok(),
            _ => true,
        };
        return in_range.then(|| Value::from(number));
    }
    match target_type {
        "boolean" => value.as_bool().map(Value::Bool),
        "decimal" => match value.value() {
            Value::Number(n) => Some(Value::Number(n.clone())),
            Value::String(s) => Number::from_str(s.trim()).ok().map(Value::Number),
            _ => None,
        },
        _ => value.value().is_object().then(|| value.value().clone()),
    }
}

fn set_property(
    element: &str,
    node: &mut Value,
    node_type: Option<&str>,
    name: &str,
    value: &FhirNode,
    model: &dyn ModelProvider,
) -> Result<(), TranslationError> {
    let map = object(element, node, name)?;

    let Some(parent_type) = node_type.filter(|t| model.is_known_type(t)) else {
        map.insert(name.to_string(), value.value().clone());
        return Ok(());
    };
    let Some(info) = model.element(parent_type, name) else {
        error!(element, parent_type, property = name, "Property does not exist; value not assigned");
        return Ok(());
    };

    let value_type = value.fhir_type().unwrap_or_default();
    let (key, target_type) = if info.is_choice() {
        let chosen = info
            .choice_types
            .iter()
            .find(|t| **t == value_type)
            .or_else(|| {
                is_string_type(&value_type)
                    .then(|| info.choice_types.iter().find(|t| *t == "string"))
                    .flatten()
            })
            .ok_or_else(|| {
                TranslationError::Schema(format!(
                    "Element '{}' cannot store a {} value in choice property '{}'",
                    element, value_type, name
                ))
            })?;
        for choice in &info.choice_types {
            map.remove(&info.choice_property(choice));
        }
        (info.choice_property(chosen), chosen.clone())
    } else {
        (info.name.clone(), info.type_name.clone())
    };

    let converted = coerce(value, &target_type).ok_or_else(|| {
        TranslationError::Schema(format!(
            "Element '{}' cannot convert a {} value to {} for property '{}'",
            element, value_type, target_type, name
        ))
    })?;

    if info.is_array {
        let slot = map.entry(key.clone()).or_insert_with(|| Value::Array(Vec::new()));
        push_object(element, slot, &key, converted)?;
    } else {
        map.insert(key, converted);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::R4Model;

    #[test]
    fn splits_outside_parentheses_and_quotes() {
        assert_eq!(
            split_path("Bundle.entry.resource.ofType(Patient).extension('https://x.org/a.b').valueString"),
            vec![
                "Bundle",
                "entry",
                "resource",
                "ofType(Patient)",
                "extension('https://x.org/a.b')",
                "valueString"
            ]
        );
        assert_eq!(
            split_path("%resource.where(name.family = 'a.b').id"),
            vec!["%resource", "where(name.family = 'a.b')", "id"]
        );
        assert_eq!(split_path("single"), vec!["single"]);
    }

    #[test]
    fn extension_urls_accept_either_quote() {
        assert_eq!(extension_url("extension('http://a')"), Some("http://a"));
        assert_eq!(extension_url("extension(\"http://b\")"), Some("http://b"));
        assert_eq!(extension_url("extension"), None);
        assert_eq!(extension_url("extension(url)"), None);
    }

    #[test]
    fn coercion_follows_the_target_type() {
        assert_eq!(coerce(&FhirNode::string("12"), "integer"), Some(json!(12)));
        assert_eq!(coerce(&FhirNode::string("0"), "positiveInt"), None);
        assert_eq!(coerce(&FhirNode::integer(3), "string"), Some(json!("3")));
        assert_eq!(coerce(&FhirNode::string("true"), "boolean"), Some(json!(true)));
        assert_eq!(coerce(&FhirNode::string("1.50"), "decimal"), Some(json!(1.50)));
        assert_eq!(coerce(&FhirNode::string("abc"), "CodeableConcept"), None);
        assert_eq!(
            coerce(&FhirNode::typed(json!({"text": "x"}), "CodeableConcept"), "CodeableConcept"),
            Some(json!({"text": "x"}))
        );
    }

    #[test]
    fn choice_properties_use_the_value_type() {
        let model = R4Model::new();
        let mut node = json!({"valueInteger": 1});
        set_property("e", &mut node, Some("Observation"), "value", &FhirNode::string("high"), &model)
            .unwrap();
        assert_eq!(node, json!({"valueString": "high"}));

        let error = set_property(
            "e",
            &mut node,
            Some("Observation"),
            "value",
            &FhirNode::typed(json!({"city": "x"}), "Address"),
            &model,
        )
        .unwrap_err();
        assert!(matches!(error, TranslationError::Schema(_)));
    }

    #[test]
    fn unknown_properties_are_skipped_on_known_types() {
        let model = R4Model::new();
        let mut node = json!({"resourceType": "Patient"});
        set_property("e", &mut node, Some("Patient"), "nonsense", &FhirNode::string("x"), &model)
            .unwrap();
        assert_eq!(node, json!({"resourceType": "Patient"}));

        set_property("e", &mut node, Some("Custom"), "anything", &FhirNode::string("x"), &model)
            .unwrap();
        assert_eq!(node["anything"], json!("x"));
    }
}
