//! Expression evaluation.
//!
//! Every expression evaluates to an ordered collection of [`FhirNode`]s. Navigation
//! results keep their location in the tree; literals and computed values do not.

use atrius_fhirpath_support::{EvaluationError, FhirNode, ModelProvider};
use rust_decimal::Decimal;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::Arc;

use crate::functions;
use crate::navigation;
use crate::parser::{Expression, Invocation, Literal, Term, TypeSpecifier};

/// Nested `%constant` expansions allowed before evaluation gives up.
pub const MAX_CONSTANT_DEPTH: usize = 16;

pub const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// Supplies the expression text behind caller-defined `%constants`.
pub trait ConstantResolver {
    fn resolve_constant(&self, name: &str) -> Option<String>;
}

/// Everything an evaluation can see.
///
/// `resource` is the focus: unqualified paths start from it and `%resource` /
/// `%context` return it. `root` is the whole tree, returned by `%bundle` and
/// `%rootResource` and searched by `resolve()`. Nodes found by navigation share
/// `root` rather than copying from it.
#[derive(Clone)]
pub struct EvaluationContext<'a> {
    pub root: Arc<Value>,
    pub resource: FhirNode,
    pub model: &'a dyn ModelProvider,
    pub constants: Option<&'a dyn ConstantResolver>,
    depth: usize,
}

impl<'a> EvaluationContext<'a> {
    /// A context focused on the root of `root`, which is copied once.
    pub fn new(root: &Value, model: &'a dyn ModelProvider) -> Self {
        Self::shared(Arc::new(root.clone()), model)
    }

    /// A context focused on the root of an already shared tree.
    pub fn shared(root: Arc<Value>, model: &'a dyn ModelProvider) -> Self {
        let focus = FhirNode::shared_root(Arc::clone(&root));
        Self::focused(root, focus, model)
    }

    pub fn focused(root: Arc<Value>, focus: FhirNode, model: &'a dyn ModelProvider) -> Self {
        EvaluationContext {
            root,
            resource: focus,
            model,
            constants: None,
            depth: 0,
        }
    }

    pub fn with_focus(mut self, focus: FhirNode) -> Self {
        self.resource = focus;
        self
    }

    pub fn with_constants(mut self, constants: &'a dyn ConstantResolver) -> Self {
        self.constants = Some(constants);
        self
    }

    pub fn root_node(&self) -> FhirNode {
        FhirNode::shared_root(Arc::clone(&self.root))
    }

    fn nested(&self) -> Result<EvaluationContext<'a>, EvaluationError> {
        if self.depth >= MAX_CONSTANT_DEPTH {
            return Err(EvaluationError::RecursionLimit(format!(
                "constants nested deeper than {}",
                MAX_CONSTANT_DEPTH
            )));
        }
        let mut nested = self.clone();
        nested.depth += 1;
        Ok(nested)
    }
}

/// Evaluates `expr` with `focus` as `$this`.
///
/// `index` is the `$index` of `focus` when it is one item of an iteration.
pub fn evaluate(
    expr: &Expression,
    context: &EvaluationContext,
    focus: &[FhirNode],
    index: Option<usize>,
) -> Result<Vec<FhirNode>, EvaluationError> {
    match expr {
        Expression::Term(term) => evaluate_term(term, context, focus, index),
        Expression::Invocation(left, invocation) => {
            let base = evaluate(left, context, focus, index)?;
            match invocation {
                Invocation::Member(name) => Ok(navigation::member(&base, name, context.model)),
                Invocation::Function(name, args) => {
                    functions::call_function(name, &base, args, context, focus, index)
                }
                Invocation::This => Ok(base),
                Invocation::Index => Ok(index.map(|i| FhirNode::integer(i as i64)).into_iter().collect()),
            }
        }
        Expression::Indexer(left, index_expr) => {
            let base = evaluate(left, context, focus, index)?;
            let position = evaluate(index_expr, context, focus, index)?;
            let position = match position.as_slice() {
                [] => return Ok(Vec::new()),
                [single] => single.as_integer().ok_or_else(|| {
                    EvaluationError::InvalidIndex("Index must be an integer".to_string())
                })?,
                _ => {
                    return Err(EvaluationError::InvalidIndex(
                        "Index must be a single integer".to_string(),
                    ));
                }
            };
            if position < 0 {
                return Ok(Vec::new());
            }
            Ok(base.into_iter().nth(position as usize).into_iter().collect())
        }
        Expression::Polarity(op, operand) => {
            let value = evaluate(operand, context, focus, index)?;
            apply_polarity(*op, &value)
        }
        Expression::Multiplicative(left, op, right) | Expression::Additive(left, op, right) => {
            let left = evaluate(left, context, focus, index)?;
            let right = evaluate(right, context, focus, index)?;
            apply_arithmetic(&left, op, &right)
        }
        Expression::Type(left, op, type_spec) => {
            let value = evaluate(left, context, focus, index)?;
            apply_type_operation(&value, op, type_spec, context.model)
        }
        Expression::Union(left, right) => {
            let mut left = evaluate(left, context, focus, index)?;
            let right = evaluate(right, context, focus, index)?;
            left.extend(right);
            Ok(distinct(left))
        }
        Expression::Inequality(left, op, right) => {
            let left = evaluate(left, context, focus, index)?;
            let right = evaluate(right, context, focus, index)?;
            compare_inequality(&left, op, &right)
        }
        Expression::Equality(left, op, right) => {
            let left = evaluate(left, context, focus, index)?;
            let right = evaluate(right, context, focus, index)?;
            Ok(compare_equality(&left, op, &right))
        }
        Expression::Membership(left, op, right) => {
            let left = evaluate(left, context, focus, index)?;
            let right = evaluate(right, context, focus, index)?;
            match op.as_str() {
                "in" => check_membership(&left, &right),
                _ => check_membership(&right, &left),
            }
        }
        Expression::And(left, right) => {
            let left = to_boolean(&evaluate(left, context, focus, index)?)?;
            if left == Some(false) {
                return Ok(boolean_result(Some(false)));
            }
            let right = to_boolean(&evaluate(right, context, focus, index)?)?;
            Ok(boolean_result(match (left, right) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }))
        }
        Expression::Or(left, op, right) => {
            let left = to_boolean(&evaluate(left, context, focus, index)?)?;
            let right = to_boolean(&evaluate(right, context, focus, index)?)?;
            Ok(boolean_result(if op == "xor" {
                match (left, right) {
                    (Some(a), Some(b)) => Some(a != b),
                    _ => None,
                }
            } else {
                match (left, right) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }))
        }
        Expression::Implies(left, right) => {
            let left = to_boolean(&evaluate(left, context, focus, index)?)?;
            if left == Some(false) {
                return Ok(boolean_result(Some(true)));
            }
            let right = to_boolean(&evaluate(right, context, focus, index)?)?;
            Ok(boolean_result(match (left, right) {
                (Some(true), r) => r,
                (None, Some(true)) => Some(true),
                _ => None,
            }))
        }
    }
}

fn evaluate_term(
    term: &Term,
    context: &EvaluationContext,
    focus: &[FhirNode],
    index: Option<usize>,
) -> Result<Vec<FhirNode>, EvaluationError> {
    match term {
        Term::Literal(literal) => Ok(evaluate_literal(literal).into_iter().collect()),
        Term::ExternalConstant(name) => resolve_constant(name, context),
        Term::Parenthesized(inner) => evaluate(inner, context, focus, index),
        Term::Invocation(Invocation::Member(name)) => {
            // A leading type name selects the focus when the focus is of that type
            if starts_uppercase(name) && is_type_name(name, focus, context.model) {
                return Ok(focus
                    .iter()
                    .filter(|node| node_is_type(node, name, context.model))
                    .cloned()
                    .collect());
            }
            Ok(navigation::member(focus, name, context.model))
        }
        Term::Invocation(Invocation::Function(name, args)) => {
            functions::call_function(name, focus, args, context, focus, index)
        }
        Term::Invocation(Invocation::This) => Ok(focus.to_vec()),
        Term::Invocation(Invocation::Index) => {
            Ok(index.map(|i| FhirNode::integer(i as i64)).into_iter().collect())
        }
    }
}

fn evaluate_literal(literal: &Literal) -> Option<FhirNode> {
    match literal {
        Literal::Null => None,
        Literal::Boolean(b) => Some(FhirNode::boolean(*b)),
        Literal::String(s) => Some(FhirNode::string(s.clone())),
        Literal::Number(d) => Some(FhirNode::decimal(*d)),
        Literal::Integer(n) => Some(FhirNode::integer(*n)),
        Literal::Date(d) => Some(FhirNode::typed(Value::String(d.clone()), "date")),
        Literal::DateTime(dt) => Some(FhirNode::typed(Value::String(dt.clone()), "dateTime")),
        Literal::Time(t) => Some(FhirNode::typed(Value::String(t.clone()), "time")),
    }
}

fn resolve_constant(
    name: &str,
    context: &EvaluationContext,
) -> Result<Vec<FhirNode>, EvaluationError> {
    match name {
        "resource" | "context" => return Ok(vec![context.resource.clone()]),
        "bundle" | "rootResource" => return Ok(vec![context.root_node()]),
        "ucum" => return Ok(vec![FhirNode::string(UCUM_SYSTEM)]),
        _ => {}
    }
    let text = context
        .constants
        .and_then(|resolver| resolver.resolve_constant(name))
        .ok_or_else(|| EvaluationError::UndefinedVariable(format!("%{}", name)))?;
    let nested = context.nested()?;
    let expression = crate::parse_expression(&text)?;
    let focus = [nested.resource.clone()];
    evaluate(&expression, &nested, &focus, None)
}

fn starts_uppercase(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
}

fn is_type_name(name: &str, focus: &[FhirNode], model: &dyn ModelProvider) -> bool {
    model.is_known_type(name)
        || focus
            .iter()
            .any(|node| node.fhir_type().as_deref() == Some(name))
}

/// Whether `node` is of type `type_name`, allowing for base types and the
/// System namespace spelling of primitives (`String` for `string`).
pub fn node_is_type(node: &FhirNode, type_name: &str, model: &dyn ModelProvider) -> bool {
    let Some(actual) = node.fhir_type() else {
        return false;
    };
    if actual == type_name || model.is_subtype_of(&actual, type_name) {
        return true;
    }
    match type_name {
        "String" => atrius_fhirpath_support::type_info::is_string_type(&actual),
        "Integer" => atrius_fhirpath_support::type_info::is_integer_type(&actual),
        "Boolean" => actual == "boolean",
        "Decimal" => actual == "decimal",
        "Date" => actual == "date",
        "DateTime" => actual == "dateTime" || actual == "instant",
        "Time" => actual == "time",
        _ => false,
    }
}

fn apply_type_operation(
    value: &[FhirNode],
    op: &str,
    type_spec: &TypeSpecifier,
    model: &dyn ModelProvider,
) -> Result<Vec<FhirNode>, EvaluationError> {
    let node = match value {
        [] => return Ok(Vec::new()),
        [single] => single,
        _ => {
            return Err(EvaluationError::SingletonEvaluationError(format!(
                "'{}' expects a single item, found {}",
                op,
                value.len()
            )));
        }
    };
    let matches = node_is_type(node, type_spec.name(), model);
    Ok(match op {
        "is" => vec![FhirNode::boolean(matches)],
        _ if matches => vec![node.clone()],
        _ => Vec::new(),
    })
}

/// Boolean reading of a collection: empty is unknown, a single boolean is itself,
/// any other single item is `true`.
pub fn to_boolean(value: &[FhirNode]) -> Result<Option<bool>, EvaluationError> {
    match value {
        [] => Ok(None),
        [single] => Ok(Some(match single.value() {
            Value::Bool(value) => *value,
            _ => true,
        })),
        _ => Err(EvaluationError::SingletonEvaluationError(format!(
            "Expected a single boolean, found collection with {} items",
            value.len()
        ))),
    }
}

pub fn boolean_result(value: Option<bool>) -> Vec<FhirNode> {
    value.map(FhirNode::boolean).into_iter().collect()
}

fn single<'n>(value: &'n [FhirNode], op: &str) -> Result<Option<&'n FhirNode>, EvaluationError> {
    match value {
        [] => Ok(None),
        [item] => Ok(Some(item)),
        _ => Err(EvaluationError::SingletonEvaluationError(format!(
            "Operator '{}' expects single operands, found collection with {} items",
            op,
            value.len()
        ))),
    }
}

fn apply_polarity(op: char, value: &[FhirNode]) -> Result<Vec<FhirNode>, EvaluationError> {
    let Some(node) = single(value, &op.to_string())? else {
        return Ok(Vec::new());
    };
    if op == '+' {
        return Ok(vec![node.clone()]);
    }
    if let Some(n) = node.as_integer() {
        return Ok(vec![FhirNode::integer(-n)]);
    }
    if let Some(d) = node.as_decimal() {
        return Ok(vec![FhirNode::decimal(-d)]);
    }
    Err(EvaluationError::TypeError(format!(
        "Cannot negate a value of type {}",
        node.fhir_type().unwrap_or_default()
    )))
}

fn apply_arithmetic(
    left: &[FhirNode],
    op: &str,
    right: &[FhirNode],
) -> Result<Vec<FhirNode>, EvaluationError> {
    if op == "&" {
        let text = |value: &[FhirNode]| -> Result<String, EvaluationError> {
            Ok(single(value, op)?
                .and_then(FhirNode::as_string)
                .unwrap_or_default())
        };
        return Ok(vec![FhirNode::string(text(left)? + &text(right)?)]);
    }
    let (Some(l), Some(r)) = (single(left, op)?, single(right, op)?) else {
        return Ok(Vec::new());
    };
    if op == "+" {
        if let (Value::String(a), Value::String(b)) = (l.value(), r.value()) {
            if l.fhir_type().is_some_and(|t| !atrius_fhirpath_support::type_info::is_temporal_type(&t)) {
                return Ok(vec![FhirNode::string(format!("{}{}", a, b))]);
            }
        }
    }
    if let (Some(a), Some(b)) = (l.as_integer(), r.as_integer()) {
        let result = match op {
            "+" => a.checked_add(b),
            "-" => a.checked_sub(b),
            "*" => a.checked_mul(b),
            "div" | "mod" if b == 0 => return Ok(Vec::new()),
            "div" => a.checked_div(b),
            "mod" => a.checked_rem(b),
            _ => None,
        };
        if let Some(result) = result {
            return Ok(vec![FhirNode::integer(result)]);
        }
        if op != "/" {
            return Err(EvaluationError::Other(format!("Integer overflow in '{}'", op)));
        }
    }
    let (Some(a), Some(b)) = (l.as_decimal(), r.as_decimal()) else {
        return Err(EvaluationError::TypeError(format!(
            "Cannot apply '{}' to {} and {}",
            op,
            l.fhir_type().unwrap_or_default(),
            r.fhir_type().unwrap_or_default()
        )));
    };
    let result = match op {
        "+" => a.checked_add(b),
        "-" => a.checked_sub(b),
        "*" => a.checked_mul(b),
        "/" | "div" | "mod" if b.is_zero() => return Ok(Vec::new()),
        "/" => a.checked_div(b),
        "div" => a.checked_div(b).map(|q| q.trunc()),
        "mod" => a.checked_rem(b),
        _ => None,
    };
    result
        .map(|d: Decimal| vec![FhirNode::decimal(d)])
        .ok_or_else(|| EvaluationError::Other(format!("Arithmetic overflow in '{}'", op)))
}

/// Value equality between two items. Numbers compare by value regardless of
/// integer/decimal representation.
pub fn items_equal(a: &FhirNode, b: &FhirNode) -> bool {
    match (a.value(), b.value()) {
        (Value::Number(_), Value::Number(_)) => a.as_decimal() == b.as_decimal(),
        (left, right) => left == right,
    }
}

fn items_equivalent(a: &FhirNode, b: &FhirNode) -> bool {
    match (a.value(), b.value()) {
        (Value::String(x), Value::String(y)) => normalize_text(x) == normalize_text(y),
        _ => items_equal(a, b),
    }
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn compare_equality(left: &[FhirNode], op: &str, right: &[FhirNode]) -> Vec<FhirNode> {
    let equivalence = op.contains('~');
    let negated = op.starts_with('!');
    let result = if equivalence {
        // Equivalence is defined for empty collections and ignores order
        Some(
            left.len() == right.len()
                && left
                    .iter()
                    .all(|l| right.iter().any(|r| items_equivalent(l, r))),
        )
    } else if left.is_empty() || right.is_empty() {
        None
    } else {
        Some(
            left.len() == right.len()
                && left.iter().zip(right).all(|(l, r)| items_equal(l, r)),
        )
    };
    boolean_result(result.map(|equal| equal != negated))
}

fn compare_inequality(
    left: &[FhirNode],
    op: &str,
    right: &[FhirNode],
) -> Result<Vec<FhirNode>, EvaluationError> {
    let (Some(l), Some(r)) = (single(left, op)?, single(right, op)?) else {
        return Ok(Vec::new());
    };
    let ordering = match (l.as_decimal(), r.as_decimal()) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => match (l.value(), r.value()) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            _ => {
                return Err(EvaluationError::TypeError(format!(
                    "Cannot compare {} and {}",
                    l.fhir_type().unwrap_or_default(),
                    r.fhir_type().unwrap_or_default()
                )));
            }
        },
    };
    let result = match op {
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(vec![FhirNode::boolean(result)])
}

fn check_membership(
    item: &[FhirNode],
    collection: &[FhirNode],
) -> Result<Vec<FhirNode>, EvaluationError> {
    let Some(item) = single(item, "in")? else {
        return Ok(Vec::new());
    };
    Ok(vec![FhirNode::boolean(
        collection.iter().any(|candidate| items_equal(item, candidate)),
    )])
}

/// Removes later duplicates, keeping the first occurrence.
pub fn distinct(items: Vec<FhirNode>) -> Vec<FhirNode> {
    let mut unique: Vec<FhirNode> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.iter().any(|seen| items_equal(seen, &item)) {
            unique.push(item);
        }
    }
    unique
}
