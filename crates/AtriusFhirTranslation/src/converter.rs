//! FHIR bundle to HL7 v2 conversion.
//!
//! [`FhirToHl7Converter`] walks a [`ConverterSchema`] against a bundle and writes
//! each leaf's value to the wire fields its `hl7Spec` lists.
//!
//! ```
//! use atrius_fhir_translation::{Element, FhirToHl7Converter, Hl7Spec, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Schema::new("ORU")
//!     .with_element(
//!         Element::leaf("patient-family", ["name.family"], Hl7Spec(vec!["PID-5-1".into()]))
//!             .with_resource("Bundle.entry.resource.ofType(Patient)"),
//!     );
//! let bundle = json!({"resourceType": "Bundle", "entry": [
//!     {"resource": {"resourceType": "Patient", "name": [{"family": "Doe"}]}}
//! ]});
//!
//! let message = FhirToHl7Converter::new(Arc::new(schema)).convert(&bundle).unwrap();
//! assert!(message.encode().contains("PID|||||Doe"));
//! ```

use atrius_fhir_path::{EvaluationContext, evaluate_string};
use atrius_fhirpath_support::{FhirNode, ModelProvider, R4Model};
use atrius_hl7::{FieldAccessor, Hl7Error, Hl7Message};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::config::ConverterOptions;
use crate::context::ConstantScope;
use crate::error::TranslationError;
use crate::primitives::{can_evaluate, resolve_focus_resources, resolve_value};
use crate::schema::{ConverterElement, ConverterSchema, ElementBody};
use crate::truncation::trim_and_truncate;
use crate::value_set::quote;

pub const DEFAULT_MESSAGE_TYPE: &str = "ORU_R01";
pub const DEFAULT_VERSION: &str = "2.5.1";

/// Converts bundles to HL7 v2 messages with one schema.
pub struct FhirToHl7Converter {
    schema: Arc<ConverterSchema>,
    options: ConverterOptions,
    model: Arc<dyn ModelProvider>,
}

/// State of one conversion.
struct Walk {
    bundle: Arc<Value>,
    message: Hl7Message,
}

impl FhirToHl7Converter {
    /// A lenient converter that truncates nothing.
    pub fn new(schema: Arc<ConverterSchema>) -> Self {
        FhirToHl7Converter {
            schema,
            options: ConverterOptions::default(),
            model: Arc::new(R4Model::new()),
        }
    }

    pub fn with_options(mut self, options: ConverterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn with_model(mut self, model: Arc<dyn ModelProvider>) -> Self {
        self.model = model;
        self
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Builds a message from `bundle`, which is copied once.
    ///
    /// Duplicate element names are rejected before anything is written.
    pub fn convert(&self, bundle: &Value) -> Result<Hl7Message, TranslationError> {
        self.convert_shared(Arc::new(bundle.clone()))
    }

    /// Builds a message from a bundle the caller already shares.
    pub fn convert_shared(&self, bundle: Arc<Value>) -> Result<Hl7Message, TranslationError> {
        self.schema.validate()?;
        let message = Hl7Message::new(
            self.schema.hl7_type.as_deref().unwrap_or(DEFAULT_MESSAGE_TYPE),
            self.schema.hl7_version.as_deref().unwrap_or(DEFAULT_VERSION),
        );
        let focus = FhirNode::shared_root(Arc::clone(&bundle));
        let mut walk = Walk { bundle, message };
        self.process_schema(&self.schema, &focus, &ConstantScope::new(), &mut walk)?;
        Ok(walk.message)
    }

    fn process_schema(
        &self,
        schema: &ConverterSchema,
        focus: &FhirNode,
        scope: &ConstantScope,
        walk: &mut Walk,
    ) -> Result<(), TranslationError> {
        let scope = scope.with_constants(&schema.constants);
        trace!(schema = %schema.name, "Processing schema");
        for element in &schema.elements {
            self.process_element(element, focus, &scope, walk)?;
        }
        Ok(())
    }

    fn process_element(
        &self,
        element: &ConverterElement,
        focus: &FhirNode,
        scope: &ConstantScope,
        walk: &mut Walk,
    ) -> Result<(), TranslationError> {
        let scope = scope.with_constants(&element.constants);
        let resources = {
            let bundle = Arc::clone(&walk.bundle);
            let context = EvaluationContext::focused(bundle, focus.clone(), self.model.as_ref())
                .with_constants(&scope);
            resolve_focus_resources(&element.name, element.resource.as_deref(), &context)?
        };

        if resources.is_empty() {
            if element.required {
                return Err(TranslationError::required(&element.name, "resolved no resource"));
            }
            debug!(element = %element.name, "No resource; skipping element");
            return Ok(());
        }
        if resources.len() > 1 && element.resource_index.is_none() {
            return Err(TranslationError::Schema(format!(
                "Element '{}' resource '{}' resolved {} resources; declare resourceIndex to iterate over them",
                element.name,
                element.resource.as_deref().unwrap_or_default(),
                resources.len()
            )));
        }

        for (index, resource) in resources.iter().enumerate() {
            let scope = match &element.resource_index {
                Some(name) => scope.with_constant(name.clone(), index.to_string()),
                None => scope.clone(),
            };
            let bundle = Arc::clone(&walk.bundle);
            let context = EvaluationContext::focused(bundle, resource.clone(), self.model.as_ref())
                .with_constants(&scope);

            if !can_evaluate(element, &context) {
                if element.required {
                    return Err(TranslationError::required(
                        &element.name,
                        format!(
                            "has a false condition '{}'",
                            element.condition.as_deref().unwrap_or_default()
                        ),
                    ));
                }
                debug!(element = %element.name, "Condition not met; skipping element");
                continue;
            }

            match &element.body {
                ElementBody::Branch { schema } => {
                    self.process_schema(schema, resource, &scope, walk)?;
                }
                ElementBody::Leaf { target, .. } => {
                    let value = resolve_value(element, &context)?;
                    if value.is_empty() {
                        if element.required {
                            let error = TranslationError::required(&element.name, "resolved no value");
                            if self.options.strict {
                                return Err(error);
                            }
                            warn!(error = %error, "Skipping required element");
                        }
                        continue;
                    }
                    for locator in &target.0 {
                        let locator = expand_placeholders(&element.name, locator, &context)?;
                        self.set_field(element, &locator, &value, &mut walk.message)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn set_field(
        &self,
        element: &ConverterElement,
        locator: &str,
        value: &str,
        message: &mut Hl7Message,
    ) -> Result<(), TranslationError> {
        let value = trim_and_truncate(value, locator, &*message, &self.options.truncation);
        let Err(error) = message.set(locator, &value) else {
            trace!(element = %element.name, locator, "Field set");
            return Ok(());
        };
        if !self.options.strict {
            warn!(element = %element.name, locator, error = %error, "Could not set field");
            return Ok(());
        }
        Err(match error {
            Hl7Error::InvalidLocator(_) => TranslationError::Schema(format!(
                "Element '{}' has an invalid field locator: {}",
                element.name, error
            )),
            other => TranslationError::Hl7Conversion {
                element: element.name.clone(),
                locator: locator.to_string(),
                message: other.to_string(),
            },
        })
    }
}

/// Replaces each `%{name}` in `locator` with the string value of constant `name`.
fn expand_placeholders(
    element_name: &str,
    locator: &str,
    context: &EvaluationContext,
) -> Result<String, TranslationError> {
    let mut expanded = String::with_capacity(locator.len());
    let mut rest = locator;
    while let Some(start) = rest.find("%{") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            TranslationError::Schema(format!(
                "Element '{}' has an unterminated placeholder in '{}'",
                element_name, locator
            ))
        })?;
        let expression = format!("%{}", quote(&after[..end]));
        let value = evaluate_string(&expression, context)
            .map_err(|e| TranslationError::evaluation(element_name, &expression, e))?;
        expanded.push_str(&value);
        rest = &after[end + 1..];
    }
    expanded.push_str(rest);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholders_use_constant_values() {
        let bundle = json!({});
        let model = R4Model::new();
        let scope = ConstantScope::new()
            .with_constant("index", "2")
            .with_constant("segment", "'OBX'");
        let context = EvaluationContext::new(&bundle, &model).with_constants(&scope);

        assert_eq!(
            expand_placeholders("e", "/PATIENT_RESULT/OBSERVATION(%{index})/%{segment}-5", &context).unwrap(),
            "/PATIENT_RESULT/OBSERVATION(2)/OBX-5"
        );
        assert_eq!(expand_placeholders("e", "PID-3", &context).unwrap(), "PID-3");
        assert!(matches!(
            expand_placeholders("e", "OBX(%{missing})-5", &context),
            Err(TranslationError::Evaluation { .. })
        ));
        assert!(matches!(
            expand_placeholders("e", "OBX(%{index-5", &context),
            Err(TranslationError::Schema(_))
        ));
    }
}
