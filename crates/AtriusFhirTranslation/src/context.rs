//! Constant scopes.
//!
//! Scopes form a persistent chain: entering a schema or element pushes a new frame
//! in front of the inherited one and leaves the inherited chain untouched, so
//! constants defined for one subtree are never visible to its siblings.

use atrius_fhir_path::ConstantResolver;
use std::sync::Arc;

use crate::schema::Constants;

#[derive(Debug)]
struct Frame {
    constants: Constants,
    parent: ConstantScope,
}

/// An immutable chain of constant frames, searched innermost first.
#[derive(Debug, Clone, Default)]
pub struct ConstantScope(Option<Arc<Frame>>);

impl ConstantScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope holding `constants`. Returns `self` unchanged when there are
    /// none.
    pub fn with_constants(&self, constants: &Constants) -> Self {
        if constants.is_empty() {
            return self.clone();
        }
        ConstantScope(Some(Arc::new(Frame {
            constants: constants.clone(),
            parent: self.clone(),
        })))
    }

    pub fn with_constant(&self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        let mut constants = Constants::new();
        constants.insert(name.into(), expression.into());
        self.with_constants(&constants)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let mut scope = self;
        while let Some(frame) = &scope.0 {
            if let Some(value) = frame.constants.get(name) {
                return Some(value);
            }
            scope = &frame.parent;
        }
        None
    }
}

impl ConstantResolver for ConstantScope {
    fn resolve_constant(&self, name: &str) -> Option<String> {
        self.get(name).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_frames_shadow_outer_ones() {
        let root = ConstantScope::new().with_constant("a", "'root'").with_constant("b", "'b'");
        let child = root.with_constant("a", "'child'");
        assert_eq!(child.get("a"), Some("'child'"));
        assert_eq!(child.get("b"), Some("'b'"));
        assert_eq!(root.get("a"), Some("'root'"));
        assert_eq!(child.get("missing"), None);
    }

    #[test]
    fn siblings_do_not_see_each_other() {
        let parent = ConstantScope::new().with_constant("shared", "1");
        let first = parent.with_constant("only_first", "2");
        let second = parent.with_constant("only_second", "3");
        assert_eq!(first.get("only_second"), None);
        assert_eq!(second.get("only_first"), None);
        assert_eq!(second.get("shared"), Some("1"));
    }
}
