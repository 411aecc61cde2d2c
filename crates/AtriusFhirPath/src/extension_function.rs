//! # Extension Function
//!
//! Implements `extension(url)`: the extensions of each input element whose `url`
//! equals the argument, in document order.

use atrius_fhirpath_support::{EvaluationError, FhirNode};
use serde_json::Value;

/// Implementation of the `extension()` function.
///
/// # Arguments
///
/// * `invocation_base` - the elements to get extensions from
/// * `url` - the evaluated argument; must be empty or a single string
///
/// # Returns
///
/// * the matching `Extension` nodes, located under their parent's `extension` array
/// * empty when the base or the argument is empty
pub fn extension_function(
    invocation_base: &[FhirNode],
    url: &[FhirNode],
) -> Result<Vec<FhirNode>, EvaluationError> {
    let extension_url = match url {
        [] => return Ok(Vec::new()),
        [single] => match single.value() {
            Value::String(url) => url.clone(),
            _ => {
                return Err(EvaluationError::TypeError(
                    "extension() function requires a string URL argument".to_string(),
                ));
            }
        },
        _ => {
            return Err(EvaluationError::SingletonEvaluationError(
                "extension() function requires a single URL".to_string(),
            ));
        }
    };

    let mut found = Vec::new();
    for node in invocation_base {
        let Some(Value::Array(extensions)) = node.value().get("extension") else {
            continue;
        };
        for (i, extension) in extensions.iter().enumerate() {
            if extension.get("url").and_then(Value::as_str) == Some(extension_url.as_str()) {
                found.push(node.descendant(
                    extension,
                    Some("Extension".to_string()),
                    node.location.as_ref().map(|l| l.child("extension").index(i)),
                ));
            }
        }
    }
    Ok(found)
}
