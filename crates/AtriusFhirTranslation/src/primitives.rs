//! Resolution steps shared by the converter and the transformer.

use atrius_fhir_path::{EvaluationContext, evaluate_condition, evaluate_expression};
use atrius_fhirpath_support::FhirNode;
use atrius_fhirpath_support::type_info::is_temporal_type;
use tracing::{debug, warn};

use crate::datetime::to_dtm;
use crate::error::TranslationError;
use crate::schema::Element;

/// String form of a node as it is written to the wire.
///
/// Dates and times are rendered as DTM. Complex values have no string form.
pub fn wire_string(node: &FhirNode) -> Option<String> {
    let text = node.as_string()?;
    match node.fhir_type() {
        Some(type_name) if is_temporal_type(&type_name) => Some(to_dtm(&text)),
        _ => Some(text),
    }
}

/// Resolves the element's value as text.
///
/// Value expressions are tried in order and the first one yielding a non-blank
/// string wins. The result, empty or not, is then passed through the element's
/// value set; unmapped values are kept as they are.
pub fn resolve_value<T>(
    element: &Element<T>,
    context: &EvaluationContext,
) -> Result<String, TranslationError> {
    let mut raw = String::new();
    for expression in element.value_expressions() {
        if expression.trim().is_empty() {
            continue;
        }
        let result = evaluate_expression(expression, context)
            .map_err(|e| TranslationError::evaluation(&element.name, expression, e))?;
        let Some(first) = result.first() else {
            continue;
        };
        match wire_string(first) {
            Some(text) if !text.trim().is_empty() => {
                raw = text;
                break;
            }
            Some(_) => {}
            None => warn!(
                element = %element.name,
                expression = %expression,
                "Value expression resolved to a complex value; ignoring it"
            ),
        }
    }

    Ok(match element.value_set() {
        Some(value_set) if !value_set.is_empty() => value_set.resolve(&raw).unwrap_or(raw),
        _ => raw,
    })
}

/// Resolves the element's value as a node, keeping its type.
///
/// A value set hit yields a `string` node with the mapped value. On a miss the
/// original node is returned.
pub fn resolve_typed_value<T>(
    element: &Element<T>,
    context: &EvaluationContext,
) -> Result<Option<FhirNode>, TranslationError> {
    let mut found = None;
    for expression in element.value_expressions() {
        if expression.trim().is_empty() {
            continue;
        }
        let result = evaluate_expression(expression, context)
            .map_err(|e| TranslationError::evaluation(&element.name, expression, e))?;
        let blank = |node: &FhirNode| node.as_string().is_some_and(|s| s.trim().is_empty());
        if let Some(node) = result.into_iter().find(|node| !node.is_empty() && !blank(node)) {
            found = Some(node);
            break;
        }
    }

    let Some(node) = found else {
        return Ok(None);
    };
    if let Some(value_set) = element.value_set().filter(|vs| !vs.is_empty()) {
        if let Some(mapped) = node.as_string().and_then(|key| value_set.resolve(&key)) {
            return Ok(Some(FhirNode::string(mapped)));
        }
    }
    Ok(Some(node))
}

/// Resources an element applies to.
///
/// No expression means the current focus. An expression may yield any number of
/// resources; an empty result means the element does not apply.
pub fn resolve_focus_resources(
    element_name: &str,
    expression: Option<&str>,
    context: &EvaluationContext,
) -> Result<Vec<FhirNode>, TranslationError> {
    match expression.map(str::trim).filter(|e| !e.is_empty()) {
        None => Ok(vec![context.resource.clone()]),
        Some(expression) => evaluate_expression(expression, context)
            .map_err(|e| TranslationError::evaluation(element_name, expression, e)),
    }
}

/// Whether the element's condition holds.
///
/// A condition that fails to evaluate counts as false.
pub fn can_evaluate<T>(element: &Element<T>, context: &EvaluationContext) -> bool {
    let Some(condition) = element.condition.as_deref().filter(|c| !c.trim().is_empty()) else {
        return true;
    };
    match evaluate_condition(condition, context) {
        Ok(result) => {
            if !result {
                debug!(element = %element.name, condition, "Condition is false");
            }
            result
        }
        Err(e) => {
            warn!(
                element = %element.name,
                condition,
                error = %e,
                "Condition could not be evaluated; treating it as false"
            );
            false
        }
    }
}
