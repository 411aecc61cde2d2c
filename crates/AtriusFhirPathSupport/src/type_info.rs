//! # FHIR Primitive Type Information
//!
//! Classification helpers for FHIR primitive type names and for inferring the type
//! of an untyped JSON value. Choice elements (`value[x]`) carry their type in the
//! property name suffix, so helpers here convert between `valueDateTime` style
//! suffixes and type names in both directions.

use serde_json::Value;

/// Every FHIR primitive type name, as it appears in structure definitions.
pub const PRIMITIVE_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "integer64",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "xhtml",
];

pub fn is_primitive_type(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}

/// Primitive types whose JSON form is a string without further structure.
pub fn is_string_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "string"
            | "code"
            | "id"
            | "uri"
            | "url"
            | "canonical"
            | "oid"
            | "uuid"
            | "markdown"
            | "base64Binary"
            | "xhtml"
    )
}

pub fn is_integer_type(type_name: &str) -> bool {
    matches!(
        type_name,
        "integer" | "integer64" | "positiveInt" | "unsignedInt"
    )
}

/// Date and time types, which render to the wire in a compacted form.
pub fn is_temporal_type(type_name: &str) -> bool {
    matches!(type_name, "date" | "dateTime" | "instant" | "time")
}

/// Upper-cases the first character: `dateTime` becomes `DateTime`.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Converts a choice-element suffix back to its type name.
///
/// Primitive types are written in lower camel case in structure definitions
/// (`valueDateTime` holds a `dateTime`) while complex types keep their
/// capitalisation (`valueCodeableConcept` holds a `CodeableConcept`).
pub fn type_from_choice_suffix(suffix: &str) -> String {
    let mut chars = suffix.chars();
    let lowered: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return String::new(),
    };
    if is_primitive_type(&lowered) {
        lowered
    } else {
        suffix.to_string()
    }
}

/// Best-effort type for a JSON value that arrived without structure metadata.
pub fn infer_type(value: &Value) -> Option<String> {
    match value {
        Value::Bool(_) => Some("boolean".to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer".to_string()),
        Value::Number(_) => Some("decimal".to_string()),
        Value::String(_) => Some("string".to_string()),
        Value::Object(map) => map
            .get("resourceType")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}
