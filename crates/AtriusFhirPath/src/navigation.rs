//! Member navigation over located JSON nodes.
//!
//! Element types come from the [`ModelProvider`] when the parent type is known. Choice
//! elements (`value[x]`) are reachable by their base name whether or not the parent
//! type is known: an untyped parent is searched for `<name><Type>` properties.

use atrius_fhirpath_support::type_info::{infer_type, type_from_choice_suffix};
use atrius_fhirpath_support::{FhirNode, ModelProvider, NodePath};
use serde_json::Value;

/// `name` on every node of `input`, flattened in order.
pub fn member(input: &[FhirNode], name: &str, model: &dyn ModelProvider) -> Vec<FhirNode> {
    input
        .iter()
        .flat_map(|node| member_of(node, name, model))
        .collect()
}

fn member_of(node: &FhirNode, name: &str, model: &dyn ModelProvider) -> Vec<FhirNode> {
    let Value::Object(map) = node.value() else {
        return Vec::new();
    };
    let parent_type = node.fhir_type();
    let info = parent_type
        .as_deref()
        .and_then(|parent| model.element(parent, name));

    if let Some(value) = map.get(name) {
        let declared = info
            .as_ref()
            .map(|i| i.type_name.clone())
            .filter(|t| !t.is_empty());
        return expand(node, value, declared, node.location.as_ref().map(|l| l.child(name)));
    }

    // Choice element addressed by its base name
    if let Some(info) = info.as_ref().filter(|i| i.is_choice()) {
        for choice in &info.choice_types {
            let key = info.choice_property(choice);
            if let Some(value) = map.get(&key) {
                return expand(
                    node,
                    value,
                    Some(choice.clone()),
                    node.location.as_ref().map(|l| l.child(&key)),
                );
            }
        }
        return Vec::new();
    }
    if info.is_none() {
        for (key, value) in map {
            if let Some(suffix) = key.strip_prefix(name) {
                if suffix.starts_with(|c: char| c.is_ascii_uppercase()) {
                    return expand(
                        node,
                        value,
                        Some(type_from_choice_suffix(suffix)),
                        node.location.as_ref().map(|l| l.child(key)),
                    );
                }
            }
        }
    }
    Vec::new()
}

/// Turns a property value of `parent` into nodes, one per array item.
fn expand(
    parent: &FhirNode,
    value: &Value,
    declared: Option<String>,
    location: Option<NodePath>,
) -> Vec<FhirNode> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_null())
            .map(|(i, item)| {
                child_node(parent, item, declared.clone(), location.as_ref().map(|l| l.index(i)))
            })
            .collect(),
        single => vec![child_node(parent, single, declared, location)],
    }
}

fn child_node(
    parent: &FhirNode,
    value: &Value,
    declared: Option<String>,
    location: Option<NodePath>,
) -> FhirNode {
    // Resource-typed elements (Bundle.entry.resource, contained) carry their own type
    let type_name = match declared.as_deref() {
        Some("Resource") | None => infer_type(value).or(declared),
        Some(_) => declared,
    };
    parent.descendant(value, type_name, location)
}
