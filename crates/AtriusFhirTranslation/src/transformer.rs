//! In-place FHIR bundle transformation.
//!
//! [`FhirTransformer`] walks a [`TransformerSchema`] against a bundle and assigns
//! each leaf's value at its `bundleProperty`, creating nodes along the way.

use atrius_fhir_path::EvaluationContext;
use atrius_fhirpath_support::{FhirNode, ModelProvider, NodePath, R4Model};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::bundle_property::assign_bundle_property;
use crate::context::ConstantScope;
use crate::error::TranslationError;
use crate::primitives::{can_evaluate, resolve_focus_resources, resolve_typed_value};
use crate::schema::{ElementBody, TransformerElement, TransformerSchema};

pub struct FhirTransformer {
    schema: Arc<TransformerSchema>,
    model: Arc<dyn ModelProvider>,
}

/// A focus or resource kept across assignments.
///
/// Nodes of the bundle are kept by location only, so holding one does not keep the
/// bundle shared while it is written. Each use reads the node from the current bundle
/// and so sees assignments made since it was found.
#[derive(Debug, Clone, PartialEq)]
enum Anchor {
    Located {
        location: NodePath,
        type_name: Option<String>,
    },
    Computed(FhirNode),
}

impl Anchor {
    fn of(node: FhirNode) -> Self {
        match node.location.clone() {
            Some(location) if node.tree().is_some() => Anchor::Located {
                location,
                type_name: node.type_name.clone(),
            },
            _ => Anchor::Computed(node),
        }
    }

    fn node(&self, bundle: &Arc<Value>) -> FhirNode {
        match self {
            Anchor::Located { location, type_name } => {
                FhirNode::shared(Arc::clone(bundle), location.clone(), type_name.clone())
            }
            Anchor::Computed(node) => node.clone(),
        }
    }
}

impl FhirTransformer {
    pub fn new(schema: Arc<TransformerSchema>) -> Self {
        FhirTransformer {
            schema,
            model: Arc::new(R4Model::new()),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = model;
        self
    }

    /// Applies the schema to `bundle` in place and hands the same bundle back.
    ///
    /// Duplicate element names are rejected before anything is changed. When a later
    /// element fails, assignments made by earlier elements remain in the bundle.
    pub fn transform<'b>(&self, bundle: &'b mut Value) -> Result<&'b mut Value, TranslationError> {
        self.schema.validate()?;
        let mut tree = Arc::new(std::mem::take(bundle));
        let root = Anchor::of(FhirNode::shared_root(Arc::clone(&tree)));
        let result = self.process_schema(&self.schema, &root, &ConstantScope::new(), &mut tree);
        *bundle = Arc::try_unwrap(tree).unwrap_or_else(|shared| shared.as_ref().clone());
        result.map(|()| bundle)
    }

    /// Owned variant of [`FhirTransformer::transform`].
    pub fn transform_owned(&self, mut bundle: Value) -> Result<Value, TranslationError> {
        self.transform(&mut bundle)?;
        Ok(bundle)
    }

    fn context<'a>(
        &'a self,
        tree: &Arc<Value>,
        focus: FhirNode,
        scope: &'a ConstantScope,
    ) -> EvaluationContext<'a> {
        EvaluationContext::focused(Arc::clone(tree), focus, self.model.as_ref()).with_constants(scope)
    }

    fn process_schema(
        &self,
        schema: &TransformerSchema,
        focus: &Anchor,
        scope: &ConstantScope,
        tree: &mut Arc<Value>,
    ) -> Result<(), TranslationError> {
        let scope = scope.with_constants(&schema.constants);
        trace!(schema = %schema.name, "Processing schema");
        for element in &schema.elements {
            self.process_element(element, focus, &scope, tree)?;
        }
        Ok(())
    }

    fn process_element(
        &self,
        element: &TransformerElement,
        focus: &Anchor,
        scope: &ConstantScope,
        tree: &mut Arc<Value>,
    ) -> Result<(), TranslationError> {
        let scope = scope.with_constants(&element.constants);
        let resources: Vec<Anchor> = resolve_focus_resources(
            &element.name,
            element.resource.as_deref(),
            &self.context(tree, focus.node(tree), &scope),
        )?
        .into_iter()
        .map(Anchor::of)
        .collect();

        if resources.is_empty() {
            if element.required {
                return Err(TranslationError::required(&element.name, "resolved no resource"));
            }
            debug!(element = %element.name, "No resource; skipping element");
            return Ok(());
        }

        for (index, resource) in resources.iter().enumerate() {
            let scope = match &element.resource_index {
                Some(name) => scope.with_constant(name.clone(), index.to_string()),
                None => scope.clone(),
            };

            if !can_evaluate(element, &self.context(tree, resource.node(tree), &scope)) {
                if element.required {
                    return Err(TranslationError::required(
                        &element.name,
                        format!(
                            "has a false condition '{}'",
                            element.condition.as_deref().unwrap_or_default()
                        ),
                    ));
                }
                debug!(element = %element.name, index, "Condition not met; skipping resource");
                continue;
            }

            match &element.body {
                ElementBody::Branch { schema } => {
                    self.process_schema(schema, resource, &scope, tree)?;
                }
                ElementBody::Leaf { target, .. } => {
                    let value = resolve_typed_value(
                        element,
                        &self.context(tree, resource.node(tree), &scope),
                    )?;
                    match value {
                        Some(value) => {
                            let focus = resource.node(tree);
                            assign_bundle_property(
                                &element.name,
                                &target.0,
                                value,
                                tree,
                                focus,
                                &scope,
                                self.model.as_ref(),
                            )?
                        }
                        None if element.required => {
                            return Err(TranslationError::required(&element.name, "resolved no value"));
                        }
                        None => debug!(element = %element.name, "No value; nothing to assign"),
                    }
                }
            }
        }
        Ok(())
    }
}
