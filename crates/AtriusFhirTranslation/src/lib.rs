//! # Atrius FHIR Translation
//!
//! Schema-driven translation of FHIR bundles.
//!
//! - [`FhirToHl7Converter`] builds an HL7 v2 message from a bundle.
//! - [`FhirTransformer`] rewrites a bundle in place.
//!
//! Both walk a [`Schema`]: an ordered list of elements, each of which picks the
//! resources it applies to, optionally checks a condition, and then either resolves
//! a value and writes it, or walks a nested schema. Expressions throughout are
//! FHIRPath, evaluated by `atrius-fhir-path`.
//!
//! ## Schemas
//!
//! Schemas are usually loaded from YAML with [`SchemaLoader`], but can be built in
//! code:
//!
//! ```
//! use atrius_fhir_translation::{BundleProperty, Element, FhirTransformer, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let schema = Schema::new("tag-sender").with_element(Element::leaf(
//!     "sender-name",
//!     ["'Example Lab'"],
//!     BundleProperty("Bundle.entry.resource.ofType(MessageHeader).source.name".into()),
//! ));
//! let bundle = json!({"resourceType": "Bundle", "entry": [
//!     {"resource": {"resourceType": "MessageHeader", "source": {"endpoint": "urn:lab"}}}
//! ]});
//!
//! let bundle = FhirTransformer::new(Arc::new(schema)).transform_owned(bundle).unwrap();
//! assert_eq!(bundle["entry"][0]["resource"]["source"]["name"], json!("Example Lab"));
//! ```
//!
//! ## Constants
//!
//! Schemas and elements may define constants. A constant's value is an expression,
//! referenced as `%name`, visible to the element or schema that defines it and
//! everything nested below it. An element with `resourceIndex` binds that name to
//! the position of each resource it iterates over.
//!
//! ## Errors
//!
//! Failures are reported as [`TranslationError`] and always name the element that
//! caused them. Conditions are the exception: a condition that cannot be evaluated
//! is logged and counts as false.

pub mod bundle_property;
pub mod config;
pub mod context;
pub mod converter;
pub mod datetime;
pub mod error;
pub mod loader;
pub mod primitives;
pub mod schema;
pub mod transformer;
pub mod truncation;
pub mod value_set;

pub use config::{ConverterOptions, TruncationConfig};
pub use context::ConstantScope;
pub use converter::FhirToHl7Converter;
pub use error::TranslationError;
pub use loader::SchemaLoader;
pub use schema::{
    BundleProperty, Constants, ConverterElement, ConverterSchema, Element, ElementBody, Hl7Spec,
    Schema, TransformerElement, TransformerSchema,
};
pub use transformer::FhirTransformer;
pub use value_set::{ComputedValueSet, InlineValueSet, ValueSet};
