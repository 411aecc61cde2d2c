//! Loading schemas from JSON or YAML files.
//!
//! A schema named `ORU/patient` in folder `schemas` is read from the first of
//! `schemas/ORU/patient.yml`, `.yaml` or `.json` that exists. Nested `schema`
//! references and `extends` parents are resolved relative to the file that names
//! them.
//!
//! ```yaml
//! hl7Type: ORU_R01
//! hl7Version: 2.5.1
//! constants:
//!   patient: Bundle.entry.resource.ofType(Patient)
//! elements:
//!   - name: patient-name
//!     resource: '%patient.name'
//!     value: [family]
//!     hl7Spec: [PID-5-1]
//!   - name: observations
//!     resource: Bundle.entry.resource.ofType(Observation)
//!     resourceIndex: obsIndex
//!     schema: observation
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::error::TranslationError;
use crate::schema::{BundleProperty, Constants, Element, ElementBody, Hl7Spec, Schema};
use crate::value_set::{ComputedValueSet, InlineValueSet, ValueSet};

const EXTENSIONS: &[&str] = &["yml", "yaml", "json"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct SchemaFile {
    hl7_type: Option<String>,
    hl7_version: Option<String>,
    #[serde(default)]
    constants: Constants,
    extends: Option<String>,
    #[serde(default)]
    elements: Vec<ElementFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ElementFile {
    name: String,
    resource: Option<String>,
    resource_index: Option<String>,
    condition: Option<String>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    value: Vec<String>,
    value_set: Option<ValueSetFile>,
    schema: Option<String>,
    #[serde(default)]
    constants: Constants,
    #[serde(default)]
    hl7_spec: Vec<String>,
    bundle_property: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ValueSetFile {
    values: Option<Constants>,
    lookup_table: Option<LookupTableFile>,
    expression: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LookupTableFile {
    path: String,
    key_column: String,
    value_column: String,
}

/// How each schema kind reads a leaf's target from the file.
trait LeafTarget: Sized + Clone {
    fn from_element(file: &ElementFile) -> Result<Self, String>;

    /// Whether `file` sets target fields a branch cannot use.
    fn declared_on(file: &ElementFile) -> bool;
}

impl LeafTarget for Hl7Spec {
    fn from_element(file: &ElementFile) -> Result<Self, String> {
        if file.hl7_spec.is_empty() {
            return Err("has a value but no hl7Spec".to_string());
        }
        if file.bundle_property.is_some() {
            return Err("declares bundleProperty in an HL7 schema".to_string());
        }
        Ok(Hl7Spec(file.hl7_spec.clone()))
    }

    fn declared_on(file: &ElementFile) -> bool {
        !file.hl7_spec.is_empty()
    }
}

impl LeafTarget for BundleProperty {
    fn from_element(file: &ElementFile) -> Result<Self, String> {
        if !file.hl7_spec.is_empty() {
            return Err("declares hl7Spec in a transform schema".to_string());
        }
        file.bundle_property
            .clone()
            .filter(|p| !p.trim().is_empty())
            .map(BundleProperty)
            .ok_or_else(|| "has a value but no bundleProperty".to_string())
    }

    fn declared_on(file: &ElementFile) -> bool {
        file.bundle_property.is_some()
    }
}

/// Reads schemas from a folder.
#[derive(Debug, Clone)]
pub struct SchemaLoader {
    folder: PathBuf,
}

impl SchemaLoader {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        SchemaLoader {
            folder: folder.into(),
        }
    }

    pub fn load_converter_schema(&self, name: &str) -> Result<Arc<Schema<Hl7Spec>>, TranslationError> {
        self.load(name, &self.folder, &mut Vec::new())
    }

    pub fn load_transformer_schema(
        &self,
        name: &str,
    ) -> Result<Arc<Schema<BundleProperty>>, TranslationError> {
        self.load(name, &self.folder, &mut Vec::new())
    }

    fn locate(&self, name: &str, folder: &Path) -> Result<PathBuf, TranslationError> {
        let has_extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| EXTENSIONS.contains(&e));
        if has_extension {
            let path = folder.join(name);
            if path.is_file() {
                return Ok(path);
            }
        } else {
            for extension in EXTENSIONS {
                let path = folder.join(format!("{}.{}", name, extension));
                if path.is_file() {
                    return Ok(path);
                }
            }
        }
        Err(TranslationError::Schema(format!(
            "Schema '{}' not found in {}",
            name,
            folder.display()
        )))
    }

    fn read(path: &Path) -> Result<SchemaFile, TranslationError> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let file = if is_json {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        Ok(file)
    }

    /// `stack` holds the files currently being loaded, to catch reference cycles.
    fn load<T: LeafTarget>(
        &self,
        name: &str,
        folder: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Arc<Schema<T>>, TranslationError> {
        let path = self.locate(name, folder)?;
        let canonical = path.canonicalize()?;
        if stack.contains(&canonical) {
            let chain: Vec<String> = stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect();
            return Err(TranslationError::Schema(format!(
                "Circular schema reference: {}",
                chain.join(" -> ")
            )));
        }
        stack.push(canonical);

        let file = Self::read(&path).map_err(|e| match e {
            TranslationError::Serialization(message) => {
                TranslationError::Serialization(format!("{}: {}", path.display(), message))
            }
            other => other,
        })?;
        let directory = path.parent().unwrap_or(folder).to_path_buf();

        let mut schema: Schema<T> = match &file.extends {
            Some(parent) => {
                let parent = self.load::<T>(parent, &directory, stack)?;
                let mut inherited = (*parent).clone();
                inherited.name = name.to_string();
                inherited
            }
            None => Schema::new(name),
        };
        if file.hl7_type.is_some() {
            schema.hl7_type = file.hl7_type.clone();
        }
        if file.hl7_version.is_some() {
            schema.hl7_version = file.hl7_version.clone();
        }
        schema.constants.extend(file.constants.clone());

        for element_file in file.elements {
            let element = self.build_element::<T>(element_file, name, &directory, stack)?;
            match schema.elements.iter_mut().find(|e| e.name == element.name) {
                Some(existing) => *existing = element,
                None => schema.elements.push(element),
            }
        }

        stack.pop();
        debug!(schema = name, path = %path.display(), elements = schema.elements.len(), "Schema loaded");
        Ok(Arc::new(schema))
    }

    fn build_element<T: LeafTarget>(
        &self,
        file: ElementFile,
        schema_name: &str,
        directory: &Path,
        stack: &mut Vec<PathBuf>,
    ) -> Result<Element<T>, TranslationError> {
        let invalid = |reason: &str| {
            TranslationError::Schema(format!(
                "Element '{}' in schema '{}' {}",
                file.name, schema_name, reason
            ))
        };

        let has_value = file.value.iter().any(|v| !v.trim().is_empty());
        let body = match (&file.schema, has_value) {
            (Some(_), true) => return Err(invalid("declares both value and schema")),
            (None, false) => return Err(invalid("declares neither value nor schema")),
            (Some(child), false) => {
                if T::declared_on(&file) {
                    return Err(invalid("declares a leaf target on a nested schema"));
                }
                if file.value_set.is_some() {
                    return Err(invalid("declares a valueSet on a nested schema"));
                }
                ElementBody::Branch {
                    schema: self.load::<T>(child, directory, stack)?,
                }
            }
            (None, true) => ElementBody::Leaf {
                value: file.value.clone(),
                value_set: match &file.value_set {
                    Some(value_set) => Some(
                        build_value_set(value_set, directory)
                            .map_err(|e| invalid(&format!("has an unusable valueSet: {}", e)))?,
                    ),
                    None => None,
                },
                target: T::from_element(&file).map_err(|reason| invalid(&reason))?,
            },
        };

        let ElementFile {
            name,
            resource,
            resource_index,
            condition,
            required,
            constants,
            ..
        } = file;
        Ok(Element {
            name,
            resource,
            resource_index,
            condition,
            required,
            constants,
            body,
        })
    }
}

fn build_value_set(file: &ValueSetFile, directory: &Path) -> Result<Arc<dyn ValueSet>, TranslationError> {
    match (&file.values, &file.lookup_table, &file.expression) {
        (Some(values), None, None) => Ok(Arc::new(InlineValueSet::new(values.clone()))),
        (None, Some(table), None) => Ok(Arc::new(ComputedValueSet::from_lookup_table(
            &directory.join(&table.path),
            &table.key_column,
            &table.value_column,
        )?)),
        (None, None, Some(expression)) => Ok(Arc::new(ComputedValueSet::from_expression(expression)?)),
        _ => Err(TranslationError::Schema(
            "a valueSet needs exactly one of values, lookupTable or expression".to_string(),
        )),
    }
}
