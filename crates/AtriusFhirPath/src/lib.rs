//! # FHIRPath Expression Engine
//!
//! Evaluates the FHIRPath subset used by translation schemas against a FHIR bundle
//! held as `serde_json::Value`.
//!
//! Results are collections of [`FhirNode`]s. Nodes found by navigation remember their
//! location in the bundle, so a caller can query for a node and then mutate the bundle
//! at that node.
//!
//! ## Usage Examples
//!
//! ```rust
//! use atrius_fhir_path::{EvaluationContext, evaluate_expression, evaluate_string};
//! use atrius_fhirpath_support::R4Model;
//! use serde_json::json;
//!
//! let bundle = json!({
//!     "resourceType": "Bundle",
//!     "entry": [{"resource": {"resourceType": "Patient", "name": [{"family": "Doe"}]}}]
//! });
//! let model = R4Model::new();
//! let context = EvaluationContext::new(&bundle, &model);
//!
//! let patients = evaluate_expression("Bundle.entry.resource.ofType(Patient)", &context)?;
//! assert_eq!(patients.len(), 1);
//! assert_eq!(
//!     patients[0].location.as_ref().map(|l| l.to_string()).as_deref(),
//!     Some("/entry/0/resource")
//! );
//!
//! let family = evaluate_string("Bundle.entry.resource.name.family", &context)?;
//! assert_eq!(family, "Doe");
//! # Ok::<(), atrius_fhirpath_support::EvaluationError>(())
//! ```
//!
//! ## Variables and Constants
//!
//! `%resource` and `%context` name the focus, `%bundle` and `%rootResource` the whole
//! tree, `%ucum` the UCUM system URL. Any other `%name` is looked up through the
//! context's [`ConstantResolver`]; the text it returns is itself an expression and is
//! evaluated against the same focus.
//!
//! ## Performance Considerations
//!
//! Parsing is the expensive step. Parsed expressions are cached process-wide, so
//! evaluating the same schema expression against many bundles parses it once.
//!
//! Navigation does not copy the tree. Result nodes hold the context's shared root and
//! read their value through their location; [`EvaluationContext::shared`] builds a
//! context over a tree the caller already holds in an `Arc`.

mod extension_function;
mod functions;
mod navigation;

pub mod evaluator;
pub mod parser;

use chumsky::Parser;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub use atrius_fhirpath_support::{EvaluationError, FhirNode, ModelProvider, R4Model};
pub use evaluator::{ConstantResolver, EvaluationContext};
pub use parser::Expression;

/// Upper bound on cached parse trees; the cache is cleared when it fills.
const PARSE_CACHE_CAPACITY: usize = 4096;

static PARSE_CACHE: Lazy<RwLock<HashMap<String, Arc<Expression>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Parses `expression`, reusing an earlier parse of the same text.
pub fn parse_expression(expression: &str) -> Result<Arc<Expression>, EvaluationError> {
    if let Some(parsed) = PARSE_CACHE.read().get(expression) {
        return Ok(Arc::clone(parsed));
    }

    let parsed = parser::parser()
        .parse(expression)
        .into_result()
        .map_err(|errors| {
            EvaluationError::ParseError(format!(
                "Failed to parse FHIRPath expression '{}': {:?}",
                expression, errors
            ))
        })?;
    let parsed = Arc::new(parsed);

    let mut cache = PARSE_CACHE.write();
    if cache.len() >= PARSE_CACHE_CAPACITY {
        cache.clear();
    }
    cache.insert(expression.to_string(), Arc::clone(&parsed));
    Ok(parsed)
}

/// Evaluates `expression` with the context's focus resource as `$this`.
pub fn evaluate_expression(
    expression: &str,
    context: &EvaluationContext,
) -> Result<Vec<FhirNode>, EvaluationError> {
    let parsed = parse_expression(expression)?;
    let focus = [context.resource.clone()];
    evaluator::evaluate(&parsed, context, &focus, None)
}

/// String form of the first item of the result.
///
/// Empty results, and results whose first item is not a primitive, give `""`.
pub fn evaluate_string(
    expression: &str,
    context: &EvaluationContext,
) -> Result<String, EvaluationError> {
    Ok(evaluate_expression(expression, context)?
        .first()
        .and_then(FhirNode::as_string)
        .unwrap_or_default())
}

/// Evaluates a boolean condition.
///
/// An empty result is `false`, a single boolean is its own value. Anything else is a
/// [`EvaluationError::TypeError`].
pub fn evaluate_condition(
    expression: &str,
    context: &EvaluationContext,
) -> Result<bool, EvaluationError> {
    let result = evaluate_expression(expression, context)?;
    match result.as_slice() {
        [] => Ok(false),
        [single] => match single.value() {
            serde_json::Value::Bool(value) => Ok(*value),
            _ => Err(EvaluationError::TypeError(format!(
                "Condition '{}' evaluated to a non-boolean {}",
                expression,
                single.fhir_type().unwrap_or_default()
            ))),
        },
        _ => Err(EvaluationError::TypeError(format!(
            "Condition '{}' evaluated to {} items",
            expression,
            result.len()
        ))),
    }
}
