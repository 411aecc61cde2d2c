//! Built-in function dispatch.
//!
//! Criteria and projection arguments (`where`, `select`, `all`, `exists`) are
//! evaluated once per input item with that item as `$this`. All other arguments are
//! evaluated against the focus the call appears in.

use atrius_fhirpath_support::{EvaluationError, FhirNode, NodePath};
use chrono::{Local, SecondsFormat};
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::evaluator::{
    EvaluationContext, boolean_result, distinct, evaluate, node_is_type, to_boolean,
};
use crate::extension_function::extension_function;
use crate::parser::{Expression, Invocation, Literal, Term};

pub fn call_function(
    name: &str,
    input: &[FhirNode],
    args: &[Expression],
    context: &EvaluationContext,
    focus: &[FhirNode],
    index: Option<usize>,
) -> Result<Vec<FhirNode>, EvaluationError> {
    let arg = |position: usize| -> Result<Vec<FhirNode>, EvaluationError> {
        match args.get(position) {
            Some(expr) => evaluate(expr, context, focus, index),
            None => Ok(Vec::new()),
        }
    };

    match name {
        "empty" => {
            check_arity(name, args, 0, 0)?;
            Ok(vec![FhirNode::boolean(input.is_empty())])
        }
        "exists" => {
            check_arity(name, args, 0, 1)?;
            let exists = match args.first() {
                None => !input.is_empty(),
                Some(criteria) => !filter_items(input, criteria, context)?.is_empty(),
            };
            Ok(vec![FhirNode::boolean(exists)])
        }
        "count" => {
            check_arity(name, args, 0, 0)?;
            Ok(vec![FhirNode::integer(input.len() as i64)])
        }
        "first" => Ok(input.first().cloned().into_iter().collect()),
        "last" => Ok(input.last().cloned().into_iter().collect()),
        "tail" => Ok(input.iter().skip(1).cloned().collect()),
        "skip" | "take" => {
            check_arity(name, args, 1, 1)?;
            let count = integer_arg(name, &arg(0)?)?.max(0) as usize;
            Ok(if name == "skip" {
                input.iter().skip(count).cloned().collect()
            } else {
                input.iter().take(count).cloned().collect()
            })
        }
        "single" => match input {
            [] | [_] => Ok(input.to_vec()),
            _ => Err(EvaluationError::SingletonEvaluationError(format!(
                "single() called on collection with {} items",
                input.len()
            ))),
        },
        "where" => {
            check_arity(name, args, 1, 1)?;
            filter_items(input, &args[0], context)
        }
        "select" => {
            check_arity(name, args, 1, 1)?;
            let mut projected = Vec::new();
            for (i, item) in input.iter().enumerate() {
                projected.extend(evaluate(&args[0], context, std::slice::from_ref(item), Some(i))?);
            }
            Ok(projected)
        }
        "all" => {
            check_arity(name, args, 1, 1)?;
            Ok(vec![FhirNode::boolean(
                filter_items(input, &args[0], context)?.len() == input.len(),
            )])
        }
        "distinct" => Ok(distinct(input.to_vec())),
        "union" => {
            let mut merged = input.to_vec();
            merged.extend(arg(0)?);
            Ok(distinct(merged))
        }
        "combine" => {
            let mut merged = input.to_vec();
            merged.extend(arg(0)?);
            Ok(merged)
        }
        "not" => Ok(boolean_result(to_boolean(input)?.map(|b| !b))),
        "hasValue" => Ok(vec![FhirNode::boolean(matches!(
            input,
            [single] if single.is_primitive() && !single.is_empty()
        ))]),
        "iif" => {
            check_arity(name, args, 2, 3)?;
            let scope = if input.is_empty() { focus } else { input };
            let criterion = to_boolean(&evaluate(&args[0], context, scope, index)?)?;
            match (criterion, args.get(2)) {
                (Some(true), _) => evaluate(&args[1], context, scope, index),
                (_, Some(otherwise)) => evaluate(otherwise, context, scope, index),
                _ => Ok(Vec::new()),
            }
        }
        "extension" => {
            check_arity(name, args, 1, 1)?;
            extension_function(input, &arg(0)?)
        }
        "ofType" => {
            check_arity(name, args, 1, 1)?;
            let type_name = type_argument(name, &args[0])?;
            Ok(input
                .iter()
                .filter(|node| node_is_type(node, &type_name, context.model))
                .cloned()
                .collect())
        }
        "is" | "as" => {
            check_arity(name, args, 1, 1)?;
            let type_name = type_argument(name, &args[0])?;
            let Some(node) = singleton(name, input)? else {
                return Ok(Vec::new());
            };
            let matches = node_is_type(node, &type_name, context.model);
            Ok(match name {
                "is" => vec![FhirNode::boolean(matches)],
                _ if matches => vec![node.clone()],
                _ => Vec::new(),
            })
        }
        "resolve" => Ok(resolve_references(input, context)),
        "toString" => Ok(singleton(name, input)?
            .and_then(FhirNode::as_string)
            .map(FhirNode::string)
            .into_iter()
            .collect()),
        "toInteger" => {
            let Some(node) = singleton(name, input)? else {
                return Ok(Vec::new());
            };
            let converted = match node.value() {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => i64::from_str(s.trim()).ok(),
                Value::Bool(b) => Some(i64::from(*b)),
                _ => None,
            };
            Ok(converted.map(FhirNode::integer).into_iter().collect())
        }
        "toDecimal" => {
            let Some(node) = singleton(name, input)? else {
                return Ok(Vec::new());
            };
            let converted = match node.value() {
                Value::String(s) => Decimal::from_str(s.trim()).ok(),
                Value::Bool(b) => Some(Decimal::from(i64::from(*b))),
                _ => node.as_decimal(),
            };
            Ok(converted.map(FhirNode::decimal).into_iter().collect())
        }
        "length" => string_function(name, input, |s| {
            vec![FhirNode::integer(s.chars().count() as i64)]
        }),
        "upper" => string_function(name, input, |s| vec![FhirNode::string(s.to_uppercase())]),
        "lower" => string_function(name, input, |s| vec![FhirNode::string(s.to_lowercase())]),
        "trim" => string_function(name, input, |s| vec![FhirNode::string(s.trim())]),
        "substring" => {
            check_arity(name, args, 1, 2)?;
            let start = integer_arg(name, &arg(0)?)?;
            let length = match args.get(1) {
                Some(_) => Some(integer_arg(name, &arg(1)?)?),
                None => None,
            };
            string_function(name, input, |s| {
                let total = s.chars().count() as i64;
                if start < 0 || start >= total {
                    return Vec::new();
                }
                let take = length.unwrap_or(total).max(0) as usize;
                vec![FhirNode::string(
                    s.chars().skip(start as usize).take(take).collect::<String>(),
                )]
            })
        }
        "startsWith" | "endsWith" | "contains" | "indexOf" => {
            check_arity(name, args, 1, 1)?;
            let Some(needle) = string_arg(name, &arg(0)?)? else {
                return Ok(Vec::new());
            };
            string_function(name, input, |s| {
                vec![match name {
                    "startsWith" => FhirNode::boolean(s.starts_with(&needle)),
                    "endsWith" => FhirNode::boolean(s.ends_with(&needle)),
                    "contains" => FhirNode::boolean(s.contains(&needle)),
                    _ => FhirNode::integer(
                        s.find(&needle)
                            .map(|byte| s[..byte].chars().count() as i64)
                            .unwrap_or(-1),
                    ),
                }]
            })
        }
        "replace" => {
            check_arity(name, args, 2, 2)?;
            let (Some(pattern), Some(substitution)) =
                (string_arg(name, &arg(0)?)?, string_arg(name, &arg(1)?)?)
            else {
                return Ok(Vec::new());
            };
            string_function(name, input, |s| {
                vec![FhirNode::string(s.replace(&pattern, &substitution))]
            })
        }
        "matches" => {
            check_arity(name, args, 1, 1)?;
            let Some(pattern) = string_arg(name, &arg(0)?)? else {
                return Ok(Vec::new());
            };
            // The whole value must match
            let regex = Regex::new(&format!("^(?:{})$", pattern))
                .map_err(|e| EvaluationError::InvalidRegex(e.to_string()))?;
            string_function(name, input, |s| vec![FhirNode::boolean(regex.is_match(s))])
        }
        "split" => {
            check_arity(name, args, 1, 1)?;
            let Some(separator) = string_arg(name, &arg(0)?)? else {
                return Ok(Vec::new());
            };
            string_function(name, input, |s| {
                s.split(separator.as_str()).map(FhirNode::string).collect()
            })
        }
        "join" => {
            check_arity(name, args, 0, 1)?;
            let separator = string_arg(name, &arg(0)?)?.unwrap_or_default();
            let parts: Vec<String> = input.iter().filter_map(FhirNode::as_string).collect();
            Ok(vec![FhirNode::string(parts.join(&separator))])
        }
        "now" => Ok(vec![FhirNode::typed(
            Value::String(Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)),
            "dateTime",
        )]),
        "today" => Ok(vec![FhirNode::typed(
            Value::String(Local::now().format("%Y-%m-%d").to_string()),
            "date",
        )]),
        _ => Err(EvaluationError::UnsupportedFunction(format!(
            "Function '{}' is not supported",
            name
        ))),
    }
}

fn check_arity(
    name: &str,
    args: &[Expression],
    min: usize,
    max: usize,
) -> Result<(), EvaluationError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(EvaluationError::InvalidArity(format!(
            "Function '{}' expects {} arguments, got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

/// Items for which `criteria` is true, with each item as `$this`.
fn filter_items(
    input: &[FhirNode],
    criteria: &Expression,
    context: &EvaluationContext,
) -> Result<Vec<FhirNode>, EvaluationError> {
    let mut kept = Vec::new();
    for (i, item) in input.iter().enumerate() {
        let result = evaluate(criteria, context, std::slice::from_ref(item), Some(i))?;
        if to_boolean(&result)? == Some(true) {
            kept.push(item.clone());
        }
    }
    Ok(kept)
}

fn singleton<'n>(name: &str, input: &'n [FhirNode]) -> Result<Option<&'n FhirNode>, EvaluationError> {
    match input {
        [] => Ok(None),
        [single] => Ok(Some(single)),
        _ => Err(EvaluationError::SingletonEvaluationError(format!(
            "{}() expects a single item, found collection with {} items",
            name,
            input.len()
        ))),
    }
}

/// Applies `f` to the single string input; empty input gives empty output.
fn string_function<F>(name: &str, input: &[FhirNode], f: F) -> Result<Vec<FhirNode>, EvaluationError>
where
    F: FnOnce(&str) -> Vec<FhirNode>,
{
    let Some(node) = singleton(name, input)? else {
        return Ok(Vec::new());
    };
    match node.as_string() {
        Some(text) => Ok(f(&text)),
        None => Err(EvaluationError::TypeError(format!(
            "{}() expects a string input, found {}",
            name,
            node.fhir_type().unwrap_or_else(|| "object".to_string())
        ))),
    }
}

fn string_arg(name: &str, value: &[FhirNode]) -> Result<Option<String>, EvaluationError> {
    match singleton(name, value)? {
        None => Ok(None),
        Some(node) => node.as_string().map(Some).ok_or_else(|| {
            EvaluationError::InvalidArgument(format!("{}() expects a string argument", name))
        }),
    }
}

fn integer_arg(name: &str, value: &[FhirNode]) -> Result<i64, EvaluationError> {
    singleton(name, value)?
        .and_then(FhirNode::as_integer)
        .ok_or_else(|| {
            EvaluationError::InvalidArgument(format!("{}() expects an integer argument", name))
        })
}

/// The type named by an `ofType`/`is`/`as` argument: `Patient`, `FHIR.Patient` or `'Patient'`.
fn type_argument(name: &str, expr: &Expression) -> Result<String, EvaluationError> {
    match expr {
        Expression::Term(Term::Invocation(Invocation::Member(type_name))) => Ok(type_name.clone()),
        Expression::Invocation(_, Invocation::Member(type_name)) => Ok(type_name.clone()),
        Expression::Term(Term::Literal(Literal::String(type_name))) => Ok(type_name.clone()),
        _ => Err(EvaluationError::InvalidArgument(format!(
            "{}() expects a type name",
            name
        ))),
    }
}

/// Follows references to resources in the same bundle, by `fullUrl` or `Type/id`.
fn resolve_references(input: &[FhirNode], context: &EvaluationContext) -> Vec<FhirNode> {
    let Some(Value::Array(entries)) = context.root.get("entry") else {
        return Vec::new();
    };
    let mut resolved = Vec::new();
    for node in input {
        let reference = match node.value() {
            Value::String(reference) => reference.as_str(),
            other => match other.get("reference").and_then(Value::as_str) {
                Some(reference) => reference,
                None => continue,
            },
        };
        let suffix = format!("/{}", reference);
        let found = entries.iter().enumerate().find(|(_, entry)| {
            let full_url = entry.get("fullUrl").and_then(Value::as_str);
            if full_url.is_some_and(|url| url == reference || url.ends_with(&suffix)) {
                return true;
            }
            let resource = entry.get("resource");
            let resource_type = resource.and_then(|r| r.get("resourceType")).and_then(Value::as_str);
            let id = resource.and_then(|r| r.get("id")).and_then(Value::as_str);
            matches!((resource_type, id), (Some(t), Some(id)) if format!("{}/{}", t, id) == reference)
        });
        if let Some((i, entry)) = found {
            if let Some(resource) = entry.get("resource") {
                resolved.push(FhirNode::shared(
                    Arc::clone(&context.root),
                    NodePath::root().child("entry").index(i).child("resource"),
                    resource
                        .get("resourceType")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                ));
            }
        }
    }
    resolved
}
