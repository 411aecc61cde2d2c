//! Located nodes of a resource tree.
//!
//! Nodes found by navigation share the tree they were found in and read their value
//! through their location, so querying a large bundle copies nothing. Each node
//! remembers where it came from. That lets a caller run a query, pick a node out of
//! the result and then mutate the original tree at that exact address.

use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::type_info::{infer_type, is_primitive_type};

/// One step of a [`NodePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Address of a node inside a JSON tree, from the root down.
///
/// Displays as a JSON pointer (`/entry/0/resource`); the root renders as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.to_string()));
        NodePath(segments)
    }

    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        NodePath(segments)
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// The path one level up, or `None` at the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.0.is_empty() {
            None
        } else {
            Some(NodePath(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn resolve<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(root, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
    }

    pub fn resolve_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        self.0
            .iter()
            .try_fold(root, |current, segment| match segment {
                PathSegment::Key(key) => current.get_mut(key.as_str()),
                PathSegment::Index(index) => current.get_mut(*index),
            })
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, "/{}", key.replace('~', "~0").replace('/', "~1"))?,
                PathSegment::Index(index) => write!(f, "/{}", index)?,
            }
        }
        Ok(())
    }
}

static NULL: Value = Value::Null;

#[derive(Clone)]
enum NodeValue {
    /// Lives in a shared tree at the node's location.
    Shared(Arc<Value>),
    Owned(Value),
}

/// A value matched in, or computed from, a resource tree.
///
/// `type_name` is the FHIR type when known (`string`, `dateTime`, `HumanName`,
/// `Patient`, ...). `location` is `None` for values that do not exist in the tree,
/// such as literals and function results.
#[derive(Clone)]
pub struct FhirNode {
    value: NodeValue,
    pub type_name: Option<String>,
    pub location: Option<NodePath>,
}

impl FhirNode {
    /// A node holding its own copy of `value`.
    pub fn new(value: Value, type_name: Option<String>, location: Option<NodePath>) -> Self {
        FhirNode {
            value: NodeValue::Owned(value),
            type_name,
            location,
        }
    }

    /// The root of a tree. Its type comes from `resourceType` when present.
    pub fn root(value: Value) -> Self {
        Self::shared_root(Arc::new(value))
    }

    /// The root of a shared tree, without copying it.
    pub fn shared_root(tree: Arc<Value>) -> Self {
        let type_name = infer_type(&tree).filter(|t| !is_primitive_type(t));
        Self::shared(tree, NodePath::root(), type_name)
    }

    /// The node at `location` in `tree`.
    pub fn shared(tree: Arc<Value>, location: NodePath, type_name: Option<String>) -> Self {
        FhirNode {
            value: NodeValue::Shared(tree),
            type_name,
            location: Some(location),
        }
    }

    /// A node below this one. `value` must be what `location` addresses; a node in a
    /// shared tree hands out more references to that tree instead of copying `value`.
    pub fn descendant(
        &self,
        value: &Value,
        type_name: Option<String>,
        location: Option<NodePath>,
    ) -> Self {
        match (&self.value, location) {
            (NodeValue::Shared(tree), Some(location)) => {
                Self::shared(Arc::clone(tree), location, type_name)
            }
            (_, location) => Self::new(value.clone(), type_name, location),
        }
    }

    pub fn value(&self) -> &Value {
        match &self.value {
            NodeValue::Owned(value) => value,
            NodeValue::Shared(tree) => self
                .location
                .as_ref()
                .and_then(|location| location.resolve(tree))
                .unwrap_or(&NULL),
        }
    }

    /// The shared tree this node reads from, `None` for nodes owning their value.
    pub fn tree(&self) -> Option<&Arc<Value>> {
        match &self.value {
            NodeValue::Shared(tree) => Some(tree),
            NodeValue::Owned(_) => None,
        }
    }

    /// Copies the value out, releasing any hold on a shared tree.
    pub fn into_owned(self) -> Self {
        if self.tree().is_none() {
            return self;
        }
        let value = self.value().clone();
        FhirNode::new(value, self.type_name, self.location)
    }

    /// A computed value with an explicit type.
    pub fn typed(value: Value, type_name: &str) -> Self {
        FhirNode {
            value: NodeValue::Owned(value),
            type_name: Some(type_name.to_string()),
            location: None,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::typed(Value::String(value.into()), "string")
    }

    pub fn boolean(value: bool) -> Self {
        Self::typed(Value::Bool(value), "boolean")
    }

    pub fn integer(value: i64) -> Self {
        Self::typed(Value::from(value), "integer")
    }

    pub fn decimal(value: Decimal) -> Self {
        let text = value.normalize().to_string();
        let json = Number::from_str(&text)
            .map(Value::Number)
            .unwrap_or(Value::String(text));
        Self::typed(json, "decimal")
    }

    /// The node's type, falling back to what the JSON value itself suggests.
    pub fn fhir_type(&self) -> Option<String> {
        self.type_name.clone().or_else(|| infer_type(self.value()))
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.value().get("resourceType").and_then(Value::as_str)
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.value().get(name)
    }

    /// Null, blank strings and containers with nothing in them are empty.
    pub fn is_empty(&self) -> bool {
        match self.value() {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self.value(), Value::Object(_) | Value::Array(_) | Value::Null)
    }

    /// String form of a primitive; `None` for complex values.
    pub fn as_string(&self) -> Option<String> {
        match self.value() {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.value() {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s == "true" => Some(true),
            Value::String(s) if s == "false" => Some(false),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value() {
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self.value() {
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .ok()
                .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
            Value::String(s) if self.type_name.as_deref() == Some("decimal") => {
                Decimal::from_str(s).ok()
            }
            _ => None,
        }
    }
}

impl PartialEq for FhirNode {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
            && self.type_name == other.type_name
            && self.location == other.location
    }
}

impl fmt::Debug for FhirNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FhirNode")
            .field("value", self.value())
            .field("type_name", &self.type_name)
            .field("location", &self.location)
            .finish()
    }
}
