//! Built-in R4 structure table.
//!
//! Covers the base types, the general purpose datatypes and the resources that
//! appear in laboratory messaging bundles. Backbone elements are keyed by their
//! element path (`Bundle.entry`, `Observation.referenceRange`).

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::model::{ElementInfo, ModelProvider, match_choice};

/// `(name, type, repeats)`. Choice elements end in `[x]` and list their types
/// separated by `|`.
type ElementDef = (&'static str, &'static str, bool);

struct TypeDef {
    base: Option<&'static str>,
    elements: &'static [ElementDef],
}

const CHOICE_VALUE_TYPES: &str = "base64Binary|boolean|canonical|code|date|dateTime|decimal|id|instant|integer|markdown|oid|positiveInt|string|time|unsignedInt|uri|url|uuid|Address|Annotation|Attachment|CodeableConcept|Coding|ContactPoint|HumanName|Identifier|Period|Quantity|Range|Ratio|Reference";
const OBSERVATION_VALUE_TYPES: &str =
    "Quantity|CodeableConcept|string|boolean|integer|Range|Ratio|SampledData|time|dateTime|Period";

#[rustfmt::skip]
static TYPES: &[(&str, Option<&str>, &[ElementDef])] = &[
    ("Element", None, &[("id", "string", false), ("extension", "Extension", true)]),
    ("BackboneElement", Some("Element"), &[("modifierExtension", "Extension", true)]),
    ("Resource", None, &[
        ("id", "id", false), ("meta", "Meta", false), ("implicitRules", "uri", false),
        ("language", "code", false),
    ]),
    ("DomainResource", Some("Resource"), &[
        ("text", "Narrative", false), ("contained", "Resource", true),
        ("extension", "Extension", true), ("modifierExtension", "Extension", true),
    ]),
    // Datatypes
    ("Extension", Some("Element"), &[("url", "uri", false), ("value[x]", CHOICE_VALUE_TYPES, false)]),
    ("Coding", Some("Element"), &[
        ("system", "uri", false), ("version", "string", false), ("code", "code", false),
        ("display", "string", false), ("userSelected", "boolean", false),
    ]),
    ("CodeableConcept", Some("Element"), &[("coding", "Coding", true), ("text", "string", false)]),
    ("Identifier", Some("Element"), &[
        ("use", "code", false), ("type", "CodeableConcept", false), ("system", "uri", false),
        ("value", "string", false), ("period", "Period", false), ("assigner", "Reference", false),
    ]),
    ("HumanName", Some("Element"), &[
        ("use", "code", false), ("text", "string", false), ("family", "string", false),
        ("given", "string", true), ("prefix", "string", true), ("suffix", "string", true),
        ("period", "Period", false),
    ]),
    ("Address", Some("Element"), &[
        ("use", "code", false), ("type", "code", false), ("text", "string", false),
        ("line", "string", true), ("city", "string", false), ("district", "string", false),
        ("state", "string", false), ("postalCode", "string", false), ("country", "string", false),
        ("period", "Period", false),
    ]),
    ("ContactPoint", Some("Element"), &[
        ("system", "code", false), ("value", "string", false), ("use", "code", false),
        ("rank", "positiveInt", false), ("period", "Period", false),
    ]),
    ("Reference", Some("Element"), &[
        ("reference", "string", false), ("type", "uri", false),
        ("identifier", "Identifier", false), ("display", "string", false),
    ]),
    ("Period", Some("Element"), &[("start", "dateTime", false), ("end", "dateTime", false)]),
    ("Quantity", Some("Element"), &[
        ("value", "decimal", false), ("comparator", "code", false), ("unit", "string", false),
        ("system", "uri", false), ("code", "code", false),
    ]),
    ("Range", Some("Element"), &[("low", "Quantity", false), ("high", "Quantity", false)]),
    ("Ratio", Some("Element"), &[("numerator", "Quantity", false), ("denominator", "Quantity", false)]),
    ("SampledData", Some("Element"), &[
        ("origin", "Quantity", false), ("period", "decimal", false), ("dimensions", "positiveInt", false),
        ("data", "string", false),
    ]),
    ("Meta", Some("Element"), &[
        ("versionId", "id", false), ("lastUpdated", "instant", false), ("source", "uri", false),
        ("profile", "canonical", true), ("security", "Coding", true), ("tag", "Coding", true),
    ]),
    ("Narrative", Some("Element"), &[("status", "code", false), ("div", "xhtml", false)]),
    ("Annotation", Some("Element"), &[
        ("author[x]", "Reference|string", false), ("time", "dateTime", false),
        ("text", "markdown", false),
    ]),
    ("Attachment", Some("Element"), &[
        ("contentType", "code", false), ("language", "code", false), ("data", "base64Binary", false),
        ("url", "url", false), ("size", "unsignedInt", false), ("hash", "base64Binary", false),
        ("title", "string", false), ("creation", "dateTime", false),
    ]),
    // Bundle
    ("Bundle", Some("Resource"), &[
        ("identifier", "Identifier", false), ("type", "code", false), ("timestamp", "instant", false),
        ("total", "unsignedInt", false), ("link", "Bundle.link", true), ("entry", "Bundle.entry", true),
    ]),
    ("Bundle.link", Some("BackboneElement"), &[("relation", "string", false), ("url", "uri", false)]),
    ("Bundle.entry", Some("BackboneElement"), &[
        ("link", "Bundle.link", true), ("fullUrl", "uri", false), ("resource", "Resource", false),
        ("request", "Bundle.entry.request", false),
    ]),
    ("Bundle.entry.request", Some("BackboneElement"), &[("method", "code", false), ("url", "uri", false)]),
    // Messaging
    ("MessageHeader", Some("DomainResource"), &[
        ("event[x]", "Coding|uri", false), ("destination", "MessageHeader.destination", true),
        ("sender", "Reference", false), ("enterer", "Reference", false), ("author", "Reference", false),
        ("source", "MessageHeader.source", false), ("responsible", "Reference", false),
        ("reason", "CodeableConcept", false), ("response", "MessageHeader.response", false),
        ("focus", "Reference", true), ("definition", "canonical", false),
    ]),
    ("MessageHeader.destination", Some("BackboneElement"), &[
        ("name", "string", false), ("target", "Reference", false), ("endpoint", "url", false),
        ("receiver", "Reference", false),
    ]),
    ("MessageHeader.source", Some("BackboneElement"), &[
        ("name", "string", false), ("software", "string", false), ("version", "string", false),
        ("contact", "ContactPoint", false), ("endpoint", "url", false),
    ]),
    ("MessageHeader.response", Some("BackboneElement"), &[
        ("identifier", "id", false), ("code", "code", false), ("details", "Reference", false),
    ]),
    ("Provenance", Some("DomainResource"), &[
        ("target", "Reference", true), ("occurred[x]", "Period|dateTime", false),
        ("recorded", "instant", false), ("activity", "CodeableConcept", false),
        ("agent", "Provenance.agent", true), ("entity", "Provenance.entity", true),
    ]),
    ("Provenance.agent", Some("BackboneElement"), &[
        ("type", "CodeableConcept", false), ("role", "CodeableConcept", true),
        ("who", "Reference", false), ("onBehalfOf", "Reference", false),
    ]),
    ("Provenance.entity", Some("BackboneElement"), &[("role", "code", false), ("what", "Reference", false)]),
    // Administration
    ("Patient", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("active", "boolean", false), ("name", "HumanName", true),
        ("telecom", "ContactPoint", true), ("gender", "code", false), ("birthDate", "date", false),
        ("deceased[x]", "boolean|dateTime", false), ("address", "Address", true),
        ("maritalStatus", "CodeableConcept", false), ("multipleBirth[x]", "boolean|integer", false),
        ("contact", "Patient.contact", true), ("communication", "Patient.communication", true),
        ("generalPractitioner", "Reference", true), ("managingOrganization", "Reference", false),
    ]),
    ("Patient.contact", Some("BackboneElement"), &[
        ("relationship", "CodeableConcept", true), ("name", "HumanName", false),
        ("telecom", "ContactPoint", true), ("address", "Address", false), ("gender", "code", false),
        ("organization", "Reference", false), ("period", "Period", false),
    ]),
    ("Patient.communication", Some("BackboneElement"), &[
        ("language", "CodeableConcept", false), ("preferred", "boolean", false),
    ]),
    ("Encounter", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("status", "code", false), ("class", "Coding", false),
        ("type", "CodeableConcept", true), ("serviceType", "CodeableConcept", false),
        ("priority", "CodeableConcept", false), ("subject", "Reference", false),
        ("participant", "Encounter.participant", true), ("period", "Period", false),
        ("reasonCode", "CodeableConcept", true), ("location", "Encounter.location", true),
        ("serviceProvider", "Reference", false),
    ]),
    ("Encounter.participant", Some("BackboneElement"), &[
        ("type", "CodeableConcept", true), ("period", "Period", false), ("individual", "Reference", false),
    ]),
    ("Encounter.location", Some("BackboneElement"), &[
        ("location", "Reference", false), ("status", "code", false), ("period", "Period", false),
    ]),
    ("Organization", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("active", "boolean", false), ("type", "CodeableConcept", true),
        ("name", "string", false), ("alias", "string", true), ("telecom", "ContactPoint", true),
        ("address", "Address", true), ("partOf", "Reference", false),
    ]),
    ("Practitioner", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("active", "boolean", false), ("name", "HumanName", true),
        ("telecom", "ContactPoint", true), ("address", "Address", true), ("gender", "code", false),
        ("birthDate", "date", false),
    ]),
    ("PractitionerRole", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("active", "boolean", false),
        ("practitioner", "Reference", false), ("organization", "Reference", false),
        ("code", "CodeableConcept", true), ("telecom", "ContactPoint", true),
    ]),
    ("Device", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("status", "code", false), ("manufacturer", "string", false),
        ("deviceName", "Device.deviceName", true), ("modelNumber", "string", false),
        ("version", "Device.version", true), ("owner", "Reference", false),
    ]),
    ("Device.deviceName", Some("BackboneElement"), &[("name", "string", false), ("type", "code", false)]),
    ("Device.version", Some("BackboneElement"), &[("type", "CodeableConcept", false), ("value", "string", false)]),
    // Diagnostics
    ("Observation", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("basedOn", "Reference", true), ("partOf", "Reference", true),
        ("status", "code", false), ("category", "CodeableConcept", true), ("code", "CodeableConcept", false),
        ("subject", "Reference", false), ("focus", "Reference", true), ("encounter", "Reference", false),
        ("effective[x]", "dateTime|Period|instant", false), ("issued", "instant", false),
        ("performer", "Reference", true), ("value[x]", OBSERVATION_VALUE_TYPES, false),
        ("dataAbsentReason", "CodeableConcept", false), ("interpretation", "CodeableConcept", true),
        ("note", "Annotation", true), ("bodySite", "CodeableConcept", false),
        ("method", "CodeableConcept", false), ("specimen", "Reference", false),
        ("device", "Reference", false), ("referenceRange", "Observation.referenceRange", true),
        ("hasMember", "Reference", true), ("derivedFrom", "Reference", true),
        ("component", "Observation.component", true),
    ]),
    ("Observation.referenceRange", Some("BackboneElement"), &[
        ("low", "Quantity", false), ("high", "Quantity", false), ("type", "CodeableConcept", false),
        ("appliesTo", "CodeableConcept", true), ("age", "Range", false), ("text", "string", false),
    ]),
    ("Observation.component", Some("BackboneElement"), &[
        ("code", "CodeableConcept", false), ("value[x]", OBSERVATION_VALUE_TYPES, false),
        ("dataAbsentReason", "CodeableConcept", false), ("interpretation", "CodeableConcept", true),
        ("referenceRange", "Observation.referenceRange", true),
    ]),
    ("DiagnosticReport", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("basedOn", "Reference", true), ("status", "code", false),
        ("category", "CodeableConcept", true), ("code", "CodeableConcept", false),
        ("subject", "Reference", false), ("encounter", "Reference", false),
        ("effective[x]", "dateTime|Period", false), ("issued", "instant", false),
        ("performer", "Reference", true), ("resultsInterpreter", "Reference", true),
        ("specimen", "Reference", true), ("result", "Reference", true), ("conclusion", "string", false),
        ("conclusionCode", "CodeableConcept", true), ("presentedForm", "Attachment", true),
    ]),
    ("ServiceRequest", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("basedOn", "Reference", true), ("replaces", "Reference", true),
        ("requisition", "Identifier", false), ("status", "code", false), ("intent", "code", false),
        ("category", "CodeableConcept", true), ("priority", "code", false), ("code", "CodeableConcept", false),
        ("orderDetail", "CodeableConcept", true), ("subject", "Reference", false),
        ("encounter", "Reference", false), ("occurrence[x]", "dateTime|Period", false),
        ("authoredOn", "dateTime", false), ("requester", "Reference", false),
        ("performer", "Reference", true), ("reasonCode", "CodeableConcept", true),
        ("reasonReference", "Reference", true), ("supportingInfo", "Reference", true),
        ("specimen", "Reference", true), ("note", "Annotation", true),
    ]),
    ("Specimen", Some("DomainResource"), &[
        ("identifier", "Identifier", true), ("accessionIdentifier", "Identifier", false),
        ("status", "code", false), ("type", "CodeableConcept", false), ("subject", "Reference", false),
        ("receivedTime", "dateTime", false), ("parent", "Reference", true), ("request", "Reference", true),
        ("collection", "Specimen.collection", false), ("note", "Annotation", true),
    ]),
    ("Specimen.collection", Some("BackboneElement"), &[
        ("collector", "Reference", false), ("collected[x]", "dateTime|Period", false),
        ("quantity", "Quantity", false), ("method", "CodeableConcept", false),
        ("bodySite", "CodeableConcept", false),
    ]),
];

static TYPE_INDEX: Lazy<HashMap<&'static str, TypeDef>> = Lazy::new(|| {
    TYPES
        .iter()
        .map(|(name, base, elements)| {
            (
                *name,
                TypeDef {
                    base: *base,
                    elements: *elements,
                },
            )
        })
        .collect()
});

/// [`ModelProvider`] backed by the static R4 table in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct R4Model;

impl R4Model {
    pub fn new() -> Self {
        R4Model
    }

    fn lookup_in(type_def: &TypeDef, name: &str) -> Option<ElementInfo> {
        type_def.elements.iter().find_map(|(element, types, repeats)| {
            if let Some(base) = element.strip_suffix("[x]") {
                let choices: Vec<&str> = types.split('|').collect();
                match_choice(base, &choices, *repeats, name)
            } else if *element == name {
                Some(ElementInfo {
                    name: name.to_string(),
                    type_name: types.to_string(),
                    is_array: *repeats,
                    choice_types: Vec::new(),
                })
            } else {
                None
            }
        })
    }
}

impl ModelProvider for R4Model {
    fn element(&self, parent_type: &str, name: &str) -> Option<ElementInfo> {
        let mut current = Some(parent_type);
        while let Some(type_name) = current {
            let type_def = TYPE_INDEX.get(type_name)?;
            if let Some(info) = Self::lookup_in(type_def, name) {
                return Some(info);
            }
            current = type_def.base;
        }
        None
    }

    fn is_known_type(&self, type_name: &str) -> bool {
        TYPE_INDEX.contains_key(type_name)
    }

    fn is_resource(&self, type_name: &str) -> bool {
        self.is_subtype_of(type_name, "Resource")
    }

    fn is_subtype_of(&self, type_name: &str, base: &str) -> bool {
        let mut current = Some(type_name);
        while let Some(name) = current {
            if name == base {
                return true;
            }
            current = TYPE_INDEX.get(name).and_then(|t| t.base);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_inherited_elements() {
        let model = R4Model::new();
        let id = model.element("Patient", "id").unwrap();
        assert_eq!(id.type_name, "id");
        let extension = model.element("Patient", "extension").unwrap();
        assert!(extension.is_array);
        assert_eq!(model.element("Bundle.entry", "extension").unwrap().type_name, "Extension");
    }

    #[test]
    fn resolves_choice_elements_by_base_and_concrete_name() {
        let model = R4Model::new();
        let choice = model.element("Observation", "value").unwrap();
        assert!(choice.is_choice());
        assert_eq!(choice.choice_property("string"), "valueString");

        let concrete = model.element("Observation", "valueDateTime").unwrap();
        assert_eq!(concrete.type_name, "dateTime");
        assert!(model.element("Observation", "valueAddress").is_none());
    }

    #[test]
    fn resource_hierarchy() {
        let model = R4Model::new();
        assert!(model.is_resource("Patient"));
        assert!(model.is_resource("Bundle"));
        assert!(!model.is_resource("HumanName"));
        assert!(model.element("Patient", "nonsense").is_none());
        assert!(model.element("NotAType", "id").is_none());
    }
}
