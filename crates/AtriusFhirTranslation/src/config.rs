//! Converter options.
//!
//! Both structs deserialize from the camelCase keys used in receiver settings files:
//!
//! ```yaml
//! strict: true
//! truncation:
//!   truncateNamespaceIds: true
//!   truncateFields: [PID-5-1, OBX-5]
//!   customLengths:
//!     MSH-4-1: 10
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which wire fields get shortened, and to what.
///
/// The default truncates nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TruncationConfig {
    /// Shorten the namespace-identifier components (MSH-4-1, ORC-2-2, ...) to the
    /// HD namespace length.
    pub truncate_namespace_ids: bool,
    /// `SEG-F[-C]` locators shortened to the length the wire format declares.
    pub truncate_fields: Vec<String>,
    /// `SEG-F[-C]` locators with an explicit maximum length.
    pub custom_lengths: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConverterOptions {
    /// Fail on the first field that cannot be written instead of logging it.
    pub strict: bool,
    pub truncation: TruncationConfig,
}

impl ConverterOptions {
    pub fn strict() -> Self {
        ConverterOptions {
            strict: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let options: ConverterOptions =
            serde_json::from_str(r#"{"truncation": {"truncateFields": ["PID-5-1"]}}"#).unwrap();
        assert!(!options.strict);
        assert!(!options.truncation.truncate_namespace_ids);
        assert_eq!(options.truncation.truncate_fields, vec!["PID-5-1"]);
        assert!(options.truncation.custom_lengths.is_empty());
    }

    #[test]
    fn reads_yaml_settings() {
        let options: ConverterOptions = serde_yaml::from_str(
            "strict: true\ntruncation:\n  truncateNamespaceIds: true\n  customLengths:\n    MSH-4-1: 10\n",
        )
        .unwrap();
        assert!(options.strict);
        assert!(options.truncation.truncate_namespace_ids);
        assert_eq!(options.truncation.custom_lengths.get("MSH-4-1"), Some(&10));
    }
}
