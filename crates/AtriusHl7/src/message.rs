//! In-memory HL7 v2 message.
//!
//! Segments are held in message order, each keyed by its group path. A field holds
//! repetitions, a repetition holds components, a component holds subcomponents.
//! Values are stored unescaped and escaped only by [`Hl7Message::encode`].

use std::fmt;

use tracing::trace;

use crate::error::Hl7Error;
use crate::locator::{FieldLocator, PathStep};
use crate::spec_tables::{self, FieldSpec};

pub const FIELD_SEPARATOR: char = '|';
pub const ENCODING_CHARACTERS: &str = "^~\\&";
pub const SEGMENT_TERMINATOR: char = '\r';

const COMPONENT_SEPARATOR: char = '^';
const REPETITION_SEPARATOR: char = '~';
const SUBCOMPONENT_SEPARATOR: char = '&';
const HEADER: &str = "MSH";

type Component = Vec<String>;
type Repetition = Vec<Component>;
type Field = Vec<Repetition>;

/// Read and write access to individual message fields by locator.
pub trait FieldAccessor {
    /// Assigns `value` at `locator`, creating the segment and any intermediate
    /// repetitions or components.
    fn set(&mut self, locator: &str, value: &str) -> Result<(), Hl7Error>;

    /// Reads the value at `locator`. Field-level locators read the first component.
    fn get(&self, locator: &str) -> Result<Option<String>, Hl7Error>;

    /// Data type and maximum length of the field `locator` falls in, when known.
    fn field_spec(&self, locator: &str) -> Result<Option<FieldSpec>, Hl7Error>;
}

#[derive(Debug, Clone, PartialEq)]
struct Segment {
    key: Vec<PathStep>,
    fields: Vec<Field>,
}

impl Segment {
    fn name(&self) -> &str {
        self.key.last().map(|step| step.name.as_str()).unwrap_or_default()
    }
}

/// An HL7 v2 message under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Hl7Message {
    message_type: String,
    version: String,
    segments: Vec<Segment>,
}

impl Hl7Message {
    /// Creates a message holding only its MSH segment, with the delimiters,
    /// MSH-9 (message type, trigger event and structure) and MSH-12 populated.
    pub fn new(message_type: &str, version: &str) -> Self {
        let mut header = Segment {
            key: vec![PathStep {
                name: HEADER.to_string(),
                index: 0,
            }],
            fields: vec![
                vec![vec![vec![FIELD_SEPARATOR.to_string()]]],
                vec![vec![vec![ENCODING_CHARACTERS.to_string()]]],
            ],
        };
        let mut parts = message_type.splitn(2, '_');
        let code = parts.next().unwrap_or_default().to_string();
        let mut type_components = vec![vec![code]];
        if let Some(event) = parts.next() {
            type_components.push(vec![event.to_string()]);
            type_components.push(vec![message_type.to_string()]);
        }
        header.fields.resize(12, Vec::new());
        header.fields[8] = vec![type_components];
        header.fields[11] = vec![vec![vec![version.to_string()]]];

        Hl7Message {
            message_type: message_type.to_string(),
            version: version.to_string(),
            segments: vec![header],
        }
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Segment names in message order.
    pub fn segment_names(&self) -> Vec<&str> {
        self.segments.iter().map(Segment::name).collect()
    }

    /// Encodes the message with the standard delimiters, one segment per `\r`.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(segment.name());
            let fields = if segment.name() == HEADER {
                out.push(FIELD_SEPARATOR);
                out.push_str(ENCODING_CHARACTERS);
                segment.fields.get(2..).unwrap_or_default()
            } else {
                &segment.fields[..]
            };
            let encoded: Vec<String> = fields.iter().map(|f| encode_field(f)).collect();
            for field in trim_trailing_empty(&encoded) {
                out.push(FIELD_SEPARATOR);
                out.push_str(field);
            }
            out.push(SEGMENT_TERMINATOR);
        }
        out
    }

    fn segment(&self, key: &[PathStep]) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.key == key)
    }

    fn segment_mut(&mut self, key: Vec<PathStep>) -> &mut Segment {
        if let Some(position) = self.segments.iter().position(|s| s.key == key) {
            return &mut self.segments[position];
        }
        let position = self
            .segments
            .iter()
            .position(|existing| follows(&existing.key, &key))
            .unwrap_or(self.segments.len());
        trace!(position, segment = ?key.last(), "Creating segment");
        self.segments.insert(
            position,
            Segment {
                key,
                fields: Vec::new(),
            },
        );
        &mut self.segments[position]
    }
}

/// True when `existing` is a later repetition of a group or segment that `new`
/// belongs to, so `new` must be placed before it.
fn follows(existing: &[PathStep], new: &[PathStep]) -> bool {
    for (a, b) in existing.iter().zip(new) {
        if a == b {
            continue;
        }
        return a.name == b.name && a.index > b.index;
    }
    false
}

fn parse(locator: &str) -> Result<FieldLocator, Hl7Error> {
    let parsed: FieldLocator = locator.parse()?;
    if parsed.segment.name == HEADER && (!parsed.groups.is_empty() || parsed.segment.index != 0) {
        return Err(Hl7Error::MisplacedHeader(locator.to_string()));
    }
    Ok(parsed)
}

impl FieldAccessor for Hl7Message {
    fn set(&mut self, locator: &str, value: &str) -> Result<(), Hl7Error> {
        let parsed = parse(locator)?;
        if parsed.segment.name == HEADER && parsed.field <= 2 {
            return Err(Hl7Error::ReadOnlyField(parsed.terminal()));
        }
        let segment = self.segment_mut(parsed.segment_key());
        let field = grow(&mut segment.fields, parsed.field - 1);
        let repetition = grow(field, parsed.repetition);
        let component = grow(repetition, parsed.component.unwrap_or(1) - 1);
        *grow(component, parsed.subcomponent.unwrap_or(1) - 1) = value.to_string();
        Ok(())
    }

    fn get(&self, locator: &str) -> Result<Option<String>, Hl7Error> {
        let parsed = parse(locator)?;
        let value = self
            .segment(&parsed.segment_key())
            .and_then(|segment| segment.fields.get(parsed.field - 1))
            .and_then(|field| field.get(parsed.repetition))
            .and_then(|repetition| repetition.get(parsed.component.unwrap_or(1) - 1))
            .and_then(|component| component.get(parsed.subcomponent.unwrap_or(1) - 1))
            .filter(|value| !value.is_empty())
            .cloned();
        Ok(value)
    }

    fn field_spec(&self, locator: &str) -> Result<Option<FieldSpec>, Hl7Error> {
        let parsed = parse(locator)?;
        Ok(spec_tables::field_spec(&parsed.segment.name, parsed.field))
    }
}

impl fmt::Display for Hl7Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Extends `items` with defaults until `index` exists and returns it.
fn grow<T: Default + Clone>(items: &mut Vec<T>, index: usize) -> &mut T {
    if items.len() <= index {
        items.resize(index + 1, T::default());
    }
    &mut items[index]
}

fn trim_trailing_empty(parts: &[String]) -> &[String] {
    let end = parts
        .iter()
        .rposition(|part| !part.is_empty())
        .map_or(0, |last| last + 1);
    &parts[..end]
}

fn join_trimmed(parts: Vec<String>, separator: char) -> String {
    trim_trailing_empty(&parts).join(&separator.to_string())
}

fn encode_field(field: &Field) -> String {
    let repetitions = field
        .iter()
        .map(|repetition| {
            let components = repetition
                .iter()
                .map(|component| {
                    let subcomponents = component.iter().map(|value| escape(value)).collect();
                    join_trimmed(subcomponents, SUBCOMPONENT_SEPARATOR)
                })
                .collect();
            join_trimmed(components, COMPONENT_SEPARATOR)
        })
        .collect();
    join_trimmed(repetitions, REPETITION_SEPARATOR)
}

/// Replaces delimiter characters with their `\X\` escape sequences.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\E\\"),
            '|' => out.push_str("\\F\\"),
            '^' => out.push_str("\\S\\"),
            '~' => out.push_str("\\R\\"),
            '&' => out.push_str("\\T\\"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_message_populates_header() {
        let message = Hl7Message::new("ORU_R01", "2.5.1");
        assert_eq!(message.get("MSH-1").unwrap().as_deref(), Some("|"));
        assert_eq!(message.get("MSH-2").unwrap().as_deref(), Some("^~\\&"));
        assert_eq!(message.get("MSH-9-2").unwrap().as_deref(), Some("R01"));
        assert_eq!(message.get("MSH-12").unwrap().as_deref(), Some("2.5.1"));
        assert_eq!(
            message.encode(),
            "MSH|^~\\&|||||||ORU^R01^ORU_R01|||2.5.1\r"
        );
    }

    #[test]
    fn escape_replaces_every_delimiter() {
        assert_eq!(escape("a|b^c~d&e\\f"), "a\\F\\b\\S\\c\\R\\d\\T\\e\\E\\f");
    }

    #[test]
    fn later_group_repetitions_sort_after_earlier_ones() {
        let a = vec![
            PathStep { name: "OBSERVATION".into(), index: 1 },
            PathStep { name: "OBX".into(), index: 0 },
        ];
        let b = vec![
            PathStep { name: "OBSERVATION".into(), index: 0 },
            PathStep { name: "NTE".into(), index: 0 },
        ];
        assert!(follows(&a, &b));
        assert!(!follows(&b, &a));
    }
}
