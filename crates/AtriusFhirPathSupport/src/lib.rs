//! # FHIRPath Support Types
//!
//! Foundational types shared by the path evaluator and the translation engines.
//! Everything here works directly over `serde_json::Value` trees so a bundle can be
//! queried and then mutated at the exact nodes a query returned.
//!
//! ## Core Types
//!
//! - [`FhirNode`] - a value found in (or computed from) a resource tree, with its type
//!   and its address inside the tree
//! - [`NodePath`] - the address of a node, resolvable against the tree it came from
//! - [`EvaluationError`] - failures raised while evaluating an expression
//! - [`ModelProvider`] - structure metadata (element types, cardinality, choice types)
//! - [`R4Model`] - built-in structure table for the R4 resources used in messaging
//!
//! ## Usage Example
//!
//! ```rust
//! use atrius_fhirpath_support::{FhirNode, NodePath};
//! use serde_json::json;
//!
//! let bundle = json!({"resourceType": "Bundle", "entry": [{"resource": {"id": "p1"}}]});
//! let path = NodePath::root().child("entry").index(0).child("resource").child("id");
//! assert_eq!(path.resolve(&bundle), Some(&json!("p1")));
//!
//! let node = FhirNode::string("abc");
//! assert_eq!(node.as_string().as_deref(), Some("abc"));
//! ```

pub mod evaluation_error;
pub mod model;
pub mod node;
pub mod r4_model;
pub mod type_info;

pub use evaluation_error::EvaluationError;
pub use model::{ElementInfo, ModelProvider};
pub use node::{FhirNode, NodePath, PathSegment};
pub use r4_model::R4Model;
