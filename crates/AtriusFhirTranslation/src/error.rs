//! Error types for schema loading, conversion and transformation.

use atrius_fhirpath_support::EvaluationError;

/// Errors raised while loading a schema or walking it against a bundle.
///
/// Every variant raised during a walk names the element being processed, so a
/// failure can be traced back to a line of the schema file.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    /// The schema itself is unusable.
    ///
    /// Raised for duplicate element names, malformed field locators in strict mode,
    /// values that cannot be stored in their target property, and every loader
    /// failure that is not plain I/O or syntax.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A required element was skipped.
    #[error("Required element '{element}' {reason}")]
    RequiredElement { element: String, reason: String },

    /// The wire message rejected a value for a reason other than a bad locator.
    #[error("Element '{element}' could not write {locator}: {message}")]
    Hl7Conversion {
        element: String,
        locator: String,
        message: String,
    },

    /// A value or resource expression failed to evaluate.
    ///
    /// Conditions never produce this; a failing condition counts as false.
    #[error("Element '{element}' failed to evaluate '{expression}': {message}")]
    Evaluation {
        element: String,
        expression: String,
        message: String,
    },

    /// The walk reached a state a loaded schema cannot describe.
    #[error("Internal error: {0}")]
    Internal(String),

    /// File system failure while reading a schema or lookup table.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema or options document is not valid JSON or YAML.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A lookup table could not be read as CSV.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TranslationError {
    pub(crate) fn evaluation(element: &str, expression: &str, error: EvaluationError) -> Self {
        TranslationError::Evaluation {
            element: element.to_string(),
            expression: expression.to_string(),
            message: error.to_string(),
        }
    }

    pub(crate) fn required(element: &str, reason: impl Into<String>) -> Self {
        TranslationError::RequiredElement {
            element: element.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(err: serde_json::Error) -> Self {
        TranslationError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for TranslationError {
    fn from(err: serde_yaml::Error) -> Self {
        TranslationError::Serialization(err.to_string())
    }
}
