//! Schema object model.
//!
//! A [`Schema`] is an ordered list of [`Element`]s. An element either resolves a
//! value and writes it somewhere (a leaf) or walks a nested schema (a branch); the
//! two are separate variants of [`ElementBody`], so an element can never be both or
//! neither.
//!
//! Schemas are generic over where leaves write to. The converter uses [`Hl7Spec`]
//! (wire field locators), the transformer [`BundleProperty`] (a dotted path into the
//! bundle).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::TranslationError;
use crate::value_set::ValueSet;

/// Named constants. Each value is a path expression evaluated where it is used.
pub type Constants = BTreeMap<String, String>;

/// Wire field locators a converter leaf writes its value to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hl7Spec(pub Vec<String>);

/// Dotted path a transformer leaf assigns its value to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleProperty(pub String);

pub type ConverterSchema = Schema<Hl7Spec>;
pub type TransformerSchema = Schema<BundleProperty>;
pub type ConverterElement = Element<Hl7Spec>;
pub type TransformerElement = Element<BundleProperty>;

#[derive(Debug, Clone)]
pub enum ElementBody<T> {
    Leaf {
        /// Candidate expressions, tried in order until one yields a value.
        value: Vec<String>,
        value_set: Option<Arc<dyn ValueSet>>,
        target: T,
    },
    Branch {
        schema: Arc<Schema<T>>,
    },
}

#[derive(Debug, Clone)]
pub struct Element<T> {
    pub name: String,
    /// Narrows the focus resource. Absent means the parent's focus.
    pub resource: Option<String>,
    /// Constant bound to the zero-based position of each resource `resource` yields.
    pub resource_index: Option<String>,
    pub condition: Option<String>,
    pub required: bool,
    pub constants: Constants,
    pub body: ElementBody<T>,
}

impl<T> Element<T> {
    pub fn leaf<S: Into<String>>(
        name: impl Into<String>,
        value: impl IntoIterator<Item = S>,
        target: T,
    ) -> Self {
        Self::with_body(
            name,
            ElementBody::Leaf {
                value: value.into_iter().map(Into::into).collect(),
                value_set: None,
                target,
            },
        )
    }

    pub fn branch(name: impl Into<String>, schema: Arc<Schema<T>>) -> Self {
        Self::with_body(name, ElementBody::Branch { schema })
    }

    fn with_body(name: impl Into<String>, body: ElementBody<T>) -> Self {
        Element {
            name: name.into(),
            resource: None,
            resource_index: None,
            condition: None,
            required: false,
            constants: Constants::new(),
            body,
        }
    }

    pub fn with_resource(mut self, expression: impl Into<String>) -> Self {
        self.resource = Some(expression.into());
        self
    }

    pub fn with_resource_index(mut self, name: impl Into<String>) -> Self {
        self.resource_index = Some(name.into());
        self
    }

    pub fn with_condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = Some(expression.into());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.constants.insert(name.into(), expression.into());
        self
    }

    /// Attaches a value set. Branch elements have no value to remap and ignore it.
    pub fn with_value_set(mut self, value_set: Arc<dyn ValueSet>) -> Self {
        if let ElementBody::Leaf { value_set: slot, .. } = &mut self.body {
            *slot = Some(value_set);
        }
        self
    }

    /// Value expressions of a leaf; empty for a branch.
    pub fn value_expressions(&self) -> &[String] {
        match &self.body {
            ElementBody::Leaf { value, .. } => value,
            ElementBody::Branch { .. } => &[],
        }
    }

    pub fn value_set(&self) -> Option<&dyn ValueSet> {
        match &self.body {
            ElementBody::Leaf { value_set, .. } => value_set.as_deref(),
            ElementBody::Branch { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Schema<T> {
    pub name: String,
    /// Message type such as `ORU_R01`. Only read from the root of a converter schema.
    pub hl7_type: Option<String>,
    pub hl7_version: Option<String>,
    pub constants: Constants,
    pub elements: Vec<Element<T>>,
}

impl<T> Schema<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Schema {
            name: name.into(),
            hl7_type: None,
            hl7_version: None,
            constants: Constants::new(),
            elements: Vec::new(),
        }
    }

    pub fn with_hl7_type(mut self, message_type: impl Into<String>, version: impl Into<String>) -> Self {
        self.hl7_type = Some(message_type.into());
        self.hl7_version = Some(version.into());
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.constants.insert(name.into(), expression.into());
        self
    }

    pub fn with_element(mut self, element: Element<T>) -> Self {
        self.elements.push(element);
        self
    }

    /// Element names that occur more than once anywhere in this schema tree, in
    /// order of first appearance.
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for name in &names {
            *counts.entry(name.as_str()).or_default() += 1;
        }
        let mut duplicates: Vec<String> = Vec::new();
        for name in &names {
            if counts.get(name.as_str()).copied().unwrap_or_default() > 1
                && !duplicates.contains(name)
            {
                duplicates.push(name.clone());
            }
        }
        duplicates
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        for element in &self.elements {
            names.push(element.name.clone());
            if let ElementBody::Branch { schema } = &element.body {
                schema.collect_names(names);
            }
        }
    }

    /// Fails when any element name repeats within the schema tree.
    pub fn validate(&self) -> Result<(), TranslationError> {
        let duplicates = self.duplicate_names();
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(TranslationError::Schema(format!(
                "Schema '{}' has duplicate element names: {}",
                self.name,
                duplicates.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_set::InlineValueSet;

    fn leaf(name: &str) -> ConverterElement {
        Element::leaf(name, ["'x'"], Hl7Spec(vec!["PID-1".into()]))
    }

    #[test]
    fn duplicates_are_found_across_nested_schemas() {
        let child = Arc::new(Schema::new("child").with_element(leaf("a")).with_element(leaf("c")));
        let root = Schema::new("root")
            .with_element(leaf("a"))
            .with_element(Element::branch("b", child))
            .with_element(leaf("c"));
        assert_eq!(root.duplicate_names(), vec!["a", "c"]);
        assert!(matches!(root.validate(), Err(TranslationError::Schema(msg)) if msg.contains("a, c")));
    }

    #[test]
    fn distinct_names_validate() {
        let child = Arc::new(Schema::new("child").with_element(leaf("inner")));
        let root = Schema::new("root")
            .with_element(leaf("outer"))
            .with_element(Element::branch("branch", child));
        assert!(root.validate().is_ok());
    }

    #[test]
    fn value_sets_attach_to_leaves_only() {
        let value_set: Arc<dyn ValueSet> = Arc::new(InlineValueSet::new([("a", "b")]));
        let leaf = leaf("leaf").with_value_set(Arc::clone(&value_set));
        assert!(leaf.value_set().is_some());

        let branch: ConverterElement =
            Element::branch("branch", Arc::new(Schema::new("child"))).with_value_set(value_set);
        assert!(branch.value_set().is_none());
        assert!(branch.value_expressions().is_empty());
    }
}
