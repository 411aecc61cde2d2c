//! Field length limits for wire values.
//!
//! Nothing is truncated unless configuration asks for it. Limits come, in order of
//! precedence, from the namespace-identifier rule, `customLengths`, and the lengths
//! the wire format declares for fields listed in `truncateFields`.

use atrius_hl7::{FieldAccessor, FieldLocator};
use tracing::debug;

use crate::config::TruncationConfig;

/// Maximum length of an HD namespace identifier.
pub const NAMESPACE_ID_MAX_LENGTH: usize = 20;

/// Components that carry an HD namespace identifier.
pub const NAMESPACE_ID_FIELDS: &[&str] = &[
    "MSH-3-1",
    "MSH-4-1",
    "MSH-5-1",
    "MSH-6-1",
    "SFT-1-6-1",
    "PID-3-4-1",
    "PID-3-6-1",
    "PID-18-4-1",
    "ORC-2-2",
    "ORC-3-2",
    "ORC-4-2",
    "ORC-33-2",
    "OBR-2-2",
    "OBR-3-2",
    "OBX-18-2",
    "SPM-2-1-2",
    "SPM-2-2-2",
];

/// Characters written as a three-character escape sequence.
const RESERVED_CHARACTERS: [char; 4] = ['|', '^', '~', '&'];

/// Declared component lengths of the composite types, indexed by component - 1.
fn component_lengths(data_type: &str) -> Option<&'static [usize]> {
    let lengths: &'static [usize] = match data_type {
        "HD" => &[20, 199, 6],
        "EI" => &[199, 20, 199, 6],
        "EIP" => &[427, 427],
        "CE" => &[20, 199, 20, 20, 199, 20],
        "CWE" => &[20, 199, 20, 20, 199, 20, 10, 10, 199],
        "CNE" => &[20, 199, 20, 20, 199, 20, 10, 10, 199],
        "CX" => &[15, 1, 3, 227, 5, 227, 8, 8, 705, 705],
        "XPN" => &[194, 30, 30, 20, 20, 6, 1, 1, 483, 53, 1, 26, 26, 199],
        "XAD" => &[184, 120, 50, 50, 12, 3, 3, 50, 20, 20, 1, 53, 26, 26],
        "XTN" => &[199, 3, 8, 199, 3, 5, 9, 5, 199, 4, 6, 199],
        "XON" => &[50, 20, 4, 1, 3, 227, 5, 227, 1, 20],
        "XCN" => &[
            15, 194, 30, 30, 20, 20, 5, 4, 227, 1, 1, 3, 5, 227, 1, 483, 53, 1, 26, 26, 199, 705,
            705,
        ],
        "PL" => &[20, 20, 20, 227, 20, 20, 20, 20, 199, 427, 20],
        _ => return None,
    };
    Some(lengths)
}

/// `SEG-F[-C[-S]]` form of `locator`, used to match configuration entries.
fn terminal_locator(locator: &str) -> String {
    locator
        .parse::<FieldLocator>()
        .map(|parsed| parsed.terminal())
        .unwrap_or_else(|_| locator.trim().to_string())
}

/// Length the wire format declares for the field or component at `locator`.
///
/// Subcomponent lengths are not tracked and give `None`.
fn declared_length(locator: &str, accessor: &dyn FieldAccessor) -> Option<usize> {
    let parsed: FieldLocator = locator.parse().ok()?;
    if parsed.subcomponent.is_some() {
        return None;
    }
    let spec = accessor.field_spec(locator).ok()??;
    match parsed.component {
        None => Some(spec.max_length),
        Some(component) => component_lengths(spec.data_type)?.get(component - 1).copied(),
    }
}

/// Shrinks `limit` by two for every reserved character in the part of `value` it
/// would keep, since each one grows to three characters when encoded.
fn encoding_adjusted(limit: usize, value: &str) -> usize {
    let reserved = value
        .chars()
        .take(limit)
        .filter(|c| RESERVED_CHARACTERS.contains(c))
        .count();
    limit.saturating_sub(2 * reserved)
}

/// Maximum length for `value` at `locator`, or `None` when it must not be shortened.
pub fn max_length(
    locator: &str,
    value: &str,
    accessor: &dyn FieldAccessor,
    config: &TruncationConfig,
) -> Option<usize> {
    let terminal = terminal_locator(locator);
    let limit = if config.truncate_namespace_ids && NAMESPACE_ID_FIELDS.contains(&terminal.as_str()) {
        NAMESPACE_ID_MAX_LENGTH
    } else if let Some(custom) = config.custom_lengths.get(&terminal) {
        *custom
    } else if config.truncate_fields.iter().any(|f| f.trim() == terminal) {
        declared_length(locator, accessor)?
    } else {
        return None;
    };
    Some(encoding_adjusted(limit, value))
}

/// Trims `value` and shortens it to the limit [`max_length`] gives, if any.
pub fn trim_and_truncate(
    value: &str,
    locator: &str,
    accessor: &dyn FieldAccessor,
    config: &TruncationConfig,
) -> String {
    let trimmed = value.trim();
    match max_length(locator, trimmed, accessor, config) {
        Some(limit) if trimmed.chars().count() > limit => {
            debug!(locator, limit, "Truncating value");
            trimmed.chars().take(limit).collect()
        }
        _ => trimmed.to_string(),
    }
}
