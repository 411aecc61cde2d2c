//! Value sets remap a resolved value before it is written.
//!
//! Lookups ignore case. A key with no mapping is reported as `None`; callers then
//! keep the raw value.

use atrius_fhir_path::{ConstantResolver, EvaluationContext, evaluate_string, parse_expression};
use atrius_fhirpath_support::{FhirNode, R4Model};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::error::TranslationError;

/// Key to value remapping attached to a schema element.
pub trait ValueSet: fmt::Debug + Send + Sync {
    /// Mapped value for `key`, compared case-insensitively.
    fn resolve(&self, key: &str) -> Option<String>;

    /// True when no key can ever map.
    fn is_empty(&self) -> bool;
}

/// A fixed table declared in the schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineValueSet {
    values: HashMap<String, String>,
}

impl InlineValueSet {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        InlineValueSet {
            values: values
                .into_iter()
                .map(|(key, value)| (key.as_ref().to_lowercase(), value.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl ValueSet for InlineValueSet {
    fn resolve(&self, key: &str) -> Option<String> {
        self.values.get(&key.to_lowercase()).cloned()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

type Resolver = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// A value set whose answer is computed on each lookup.
pub struct ComputedValueSet {
    source: String,
    resolver: Resolver,
    empty: bool,
}

impl fmt::Debug for ComputedValueSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedValueSet")
            .field("source", &self.source)
            .field("empty", &self.empty)
            .finish()
    }
}

impl ComputedValueSet {
    /// Wraps an arbitrary lookup function. `source` is only used in diagnostics.
    pub fn new(
        source: impl Into<String>,
        resolver: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        ComputedValueSet {
            source: source.into(),
            resolver: Box::new(resolver),
            empty: false,
        }
    }

    /// Reads two columns of a CSV file with a header row into a lookup table.
    ///
    /// Later rows win when a key repeats.
    pub fn from_lookup_table(
        path: &Path,
        key_column: &str,
        value_column: &str,
    ) -> Result<Self, TranslationError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                TranslationError::Schema(format!(
                    "Lookup table {} has no column '{}'",
                    path.display(),
                    name
                ))
            })
        };
        let key_index = column(key_column)?;
        let value_index = column(value_column)?;

        let mut table = HashMap::new();
        for record in reader.records() {
            let record = record?;
            if let (Some(key), Some(value)) = (record.get(key_index), record.get(value_index)) {
                table.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
        }

        let empty = table.is_empty();
        let mut value_set = ComputedValueSet::new(path.display().to_string(), move |key: &str| {
            table.get(&key.to_lowercase()).cloned()
        });
        value_set.empty = empty;
        Ok(value_set)
    }

    /// Computes the mapped value with a path expression.
    ///
    /// The expression is evaluated with the key as its focus and as `%key`. An empty
    /// result means the key is unmapped.
    pub fn from_expression(expression: &str) -> Result<Self, TranslationError> {
        parse_expression(expression).map_err(|e| {
            TranslationError::Schema(format!(
                "Invalid value set expression '{}': {}",
                expression, e
            ))
        })?;
        let text = expression.to_string();
        Ok(ComputedValueSet::new(expression, move |key: &str| {
            let binding = KeyBinding(quote(key));
            let model = R4Model::new();
            let root = Arc::new(Value::Null);
            let context = EvaluationContext::focused(root, FhirNode::string(key), &model)
                .with_constants(&binding);
            match evaluate_string(&text, &context) {
                Ok(mapped) if !mapped.is_empty() => Some(mapped),
                Ok(_) => None,
                Err(e) => {
                    warn!(expression = %text, key, error = %e, "Value set expression failed");
                    None
                }
            }
        }))
    }
}

impl ValueSet for ComputedValueSet {
    fn resolve(&self, key: &str) -> Option<String> {
        (self.resolver)(key)
    }

    fn is_empty(&self) -> bool {
        self.empty
    }
}

/// Exposes the looked-up key as `%key`.
struct KeyBinding(String);

impl ConstantResolver for KeyBinding {
    fn resolve_constant(&self, name: &str) -> Option<String> {
        (name == "key").then(|| self.0.clone())
    }
}

/// Renders `text` as a quoted string literal.
pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

impl From<BTreeMap<String, String>> for InlineValueSet {
    fn from(values: BTreeMap<String, String>) -> Self {
        InlineValueSet::new(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inline_lookup_ignores_case() {
        let value_set = InlineValueSet::new([("Stagnatious", "mapped")]);
        for key in ["stagnatious", "STAGNATIOUS", "StAgNaTiOuS", "Stagnatious"] {
            assert_eq!(value_set.resolve(key).as_deref(), Some("mapped"));
        }
        assert_eq!(value_set.resolve("other"), None);
        assert!(!value_set.is_empty());
        assert!(InlineValueSet::default().is_empty());
    }

    #[test]
    fn expression_value_set_sees_the_key() {
        let value_set =
            ComputedValueSet::from_expression("iif(%key.upper() = 'F', 'female', {})").unwrap();
        assert_eq!(value_set.resolve("f").as_deref(), Some("female"));
        assert_eq!(value_set.resolve("m"), None);

        let echo = ComputedValueSet::from_expression("$this + '!'").unwrap();
        assert_eq!(echo.resolve("it's").as_deref(), Some("it's!"));
    }

    #[test]
    fn invalid_expression_is_a_schema_error() {
        assert!(matches!(
            ComputedValueSet::from_expression("iif("),
            Err(TranslationError::Schema(_))
        ));
    }

    #[test]
    fn lookup_table_reads_named_columns() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "code,display,system").unwrap();
        writeln!(file, "M,Male,HL70001").unwrap();
        writeln!(file, "F,Female,HL70001").unwrap();
        file.flush().unwrap();

        let value_set = ComputedValueSet::from_lookup_table(file.path(), "code", "display").unwrap();
        assert_eq!(value_set.resolve("m").as_deref(), Some("Male"));
        assert_eq!(value_set.resolve("U"), None);
        assert!(!value_set.is_empty());

        assert!(matches!(
            ComputedValueSet::from_lookup_table(file.path(), "code", "missing"),
            Err(TranslationError::Schema(_))
        ));
    }

    #[test]
    fn quote_escapes_delimiters() {
        assert_eq!(quote("it's a \\ b"), "'it\\'s a \\\\ b'");
    }
}
