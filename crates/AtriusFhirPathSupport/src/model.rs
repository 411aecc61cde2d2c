//! Structure metadata consumed by navigation and by property assignment.

use crate::type_info::{capitalize, type_from_choice_suffix};

/// What a structure definition says about one element of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementInfo {
    /// Element name as it appears in JSON (`valueString`, not `value[x]`, for a
    /// concrete choice; `value` for the choice itself).
    pub name: String,
    /// Declared type. Empty for an unresolved choice element.
    pub type_name: String,
    pub is_array: bool,
    /// Allowed types of a choice element; empty for ordinary elements.
    pub choice_types: Vec<String>,
}

impl ElementInfo {
    pub fn is_choice(&self) -> bool {
        !self.choice_types.is_empty()
    }

    /// JSON property name under which a value of `type_name` is stored.
    pub fn choice_property(&self, type_name: &str) -> String {
        format!("{}{}", self.name, capitalize(type_name))
    }
}

/// Source of element metadata for FHIR types.
///
/// Lookups for types the provider does not know return `None`; callers then treat
/// the data as untyped rather than failing.
pub trait ModelProvider: Send + Sync {
    /// Looks up `name` on `parent_type` or any of its base types.
    ///
    /// A choice element is found both by its base name (`value`) and by any concrete
    /// property name (`valueQuantity`).
    fn element(&self, parent_type: &str, name: &str) -> Option<ElementInfo>;

    fn is_known_type(&self, type_name: &str) -> bool;

    fn is_resource(&self, type_name: &str) -> bool;

    /// Whether `type_name` is `base` or derives from it.
    fn is_subtype_of(&self, type_name: &str, base: &str) -> bool {
        type_name == base
    }
}

/// Resolves a concrete choice property (`valueDateTime`) against a choice
/// declaration (`value` with its allowed types).
pub(crate) fn match_choice(
    base: &str,
    types: &[&str],
    is_array: bool,
    requested: &str,
) -> Option<ElementInfo> {
    if requested == base {
        return Some(ElementInfo {
            name: base.to_string(),
            type_name: String::new(),
            is_array,
            choice_types: types.iter().map(|t| t.to_string()).collect(),
        });
    }
    let suffix = requested.strip_prefix(base)?;
    let type_name = type_from_choice_suffix(suffix);
    types.contains(&type_name.as_str()).then(|| ElementInfo {
        name: requested.to_string(),
        type_name,
        is_array,
        choice_types: Vec::new(),
    })
}
