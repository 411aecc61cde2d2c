//! Field locators.
//!
//! A locator addresses one field, component or subcomponent:
//!
//! ```text
//! /PATIENT_RESULT/ORDER_OBSERVATION(1)/OBSERVATION(0)/OBX-5-1
//! PID-3(1)-4-1
//! MSH-9-3
//! ```
//!
//! Group and segment repetitions and field repetitions are 0-based and default to
//! 0. Field, component and subcomponent positions are 1-based.

use std::fmt;
use std::str::FromStr;

use crate::error::Hl7Error;

/// One `NAME(index)` step of a group path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub name: String,
    pub index: usize,
}

/// A parsed field locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLocator {
    /// Groups above the segment, outermost first.
    pub groups: Vec<PathStep>,
    pub segment: PathStep,
    pub field: usize,
    pub repetition: usize,
    pub component: Option<usize>,
    pub subcomponent: Option<usize>,
}

impl FieldLocator {
    /// Group path plus the segment: the identity of one segment instance.
    pub fn segment_key(&self) -> Vec<PathStep> {
        let mut key = self.groups.clone();
        key.push(self.segment.clone());
        key
    }

    /// `SEG-F[-C[-S]]` without groups or repetitions, the form used by
    /// configuration lists and the field table.
    pub fn terminal(&self) -> String {
        let mut text = format!("{}-{}", self.segment.name, self.field);
        if let Some(component) = self.component {
            text.push_str(&format!("-{}", component));
            if let Some(subcomponent) = self.subcomponent {
                text.push_str(&format!("-{}", subcomponent));
            }
        }
        text
    }
}

/// Splits `NAME(n)` into the name and the optional index text.
fn split_index(step: &str) -> Option<(&str, Option<usize>)> {
    match step.find('(') {
        None => Some((step, None)),
        Some(open) => {
            let digits = step[open + 1..].strip_suffix(')')?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some((&step[..open], Some(digits.parse().ok()?)))
        }
    }
}

fn is_group_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_segment_name(name: &str) -> bool {
    name.len() == 3
        && name.starts_with(|c: char| c.is_ascii_uppercase())
        && name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Parses a 1-based position; zero and non-digits are rejected.
fn position(text: &str) -> Option<usize> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok().filter(|p| *p > 0)
}

impl FromStr for FieldLocator {
    type Err = Hl7Error;

    fn from_str(locator: &str) -> Result<Self, Self::Err> {
        let invalid = || Hl7Error::InvalidLocator(locator.to_string());
        let trimmed = locator.trim();
        let mut steps: Vec<&str> = trimmed.split('/').collect();
        // A leading slash leaves an empty first step
        if trimmed.starts_with('/') {
            steps.remove(0);
        }
        let terminal = steps.pop().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

        let mut groups = Vec::with_capacity(steps.len());
        for step in steps {
            let (name, index) = split_index(step).ok_or_else(invalid)?;
            if !is_group_name(name) {
                return Err(invalid());
            }
            groups.push(PathStep {
                name: name.to_string(),
                index: index.unwrap_or(0),
            });
        }

        let parts: Vec<&str> = terminal.split('-').collect();
        if !(2..=4).contains(&parts.len()) {
            return Err(invalid());
        }
        let (segment_name, segment_index) = split_index(parts[0]).ok_or_else(invalid)?;
        if !is_segment_name(segment_name) {
            return Err(invalid());
        }
        let (field_text, repetition) = split_index(parts[1]).ok_or_else(invalid)?;
        let field = position(field_text).ok_or_else(invalid)?;
        let component = match parts.get(2) {
            Some(text) => Some(position(text).ok_or_else(invalid)?),
            None => None,
        };
        let subcomponent = match parts.get(3) {
            Some(text) => Some(position(text).ok_or_else(invalid)?),
            None => None,
        };

        Ok(FieldLocator {
            groups,
            segment: PathStep {
                name: segment_name.to_string(),
                index: segment_index.unwrap_or(0),
            },
            field,
            repetition: repetition.unwrap_or(0),
            component,
            subcomponent,
        })
    }
}

impl fmt::Display for FieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            write!(f, "/{}({})", group.name, group.index)?;
        }
        if !self.groups.is_empty() {
            write!(f, "/")?;
        }
        write!(
            f,
            "{}({})-{}({})",
            self.segment.name, self.segment.index, self.field, self.repetition
        )?;
        if let Some(component) = self.component {
            write!(f, "-{}", component)?;
            if let Some(subcomponent) = self.subcomponent {
                write!(f, "-{}", subcomponent)?;
            }
        }
        Ok(())
    }
}
