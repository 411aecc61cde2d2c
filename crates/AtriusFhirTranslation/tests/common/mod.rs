#![allow(dead_code)]

use atrius_hl7::Hl7Message;
use serde_json::{Value, json};

/// A lab result message bundle: header, patient, two observations, a report and a
/// specimen.
pub fn lab_bundle() -> Value {
    json!({
        "resourceType": "Bundle",
        "id": "bundle-1",
        "type": "message",
        "timestamp": "2023-05-01T10:15:30-04:00",
        "entry": [
            {
                "fullUrl": "MessageHeader/mh-1",
                "resource": {
                    "resourceType": "MessageHeader",
                    "id": "mh-1",
                    "eventCoding": {"system": "http://terminology.hl7.org/CodeSystem/v2-0003", "code": "R01"},
                    "source": {
                        "name": "Example Public Health Laboratory Information System",
                        "software": "LabSys",
                        "endpoint": "urn:oid:2.16.840.1.114222.4.1.237821"
                    }
                }
            },
            {
                "fullUrl": "Patient/pat-1",
                "resource": {
                    "resourceType": "Patient",
                    "id": "pat-1",
                    "identifier": [{"system": "urn:mrn", "value": "MRN-0001"}],
                    "name": [{"use": "official", "family": "Doe", "given": ["Jane"]}],
                    "birthDate": "1980-07-04",
                    "gender": "female",
                    "address": [{"line": ["1 Main St"], "city": "Springfield", "state": "IL"}]
                }
            },
            {
                "fullUrl": "Observation/obs-1",
                "resource": {
                    "resourceType": "Observation",
                    "id": "obs-1",
                    "status": "final",
                    "code": {"coding": [{"system": "http://loinc.org", "code": "94500-6", "display": "SARS-CoV-2 RNA"}]},
                    "subject": {"reference": "Patient/pat-1"},
                    "effectiveDateTime": "2023-04-30T08:00:00Z",
                    "valueString": "Detected"
                }
            },
            {
                "fullUrl": "Observation/obs-2",
                "resource": {
                    "resourceType": "Observation",
                    "id": "obs-2",
                    "status": "final",
                    "code": {"coding": [{"system": "http://loinc.org", "code": "2345-7", "display": "Glucose"}]},
                    "subject": {"reference": "Patient/pat-1"},
                    "valueQuantity": {"value": 5.4, "unit": "mmol/L"}
                }
            },
            {
                "fullUrl": "Specimen/spec-1",
                "resource": {
                    "resourceType": "Specimen",
                    "id": "spec-1",
                    "type": {"coding": [{"code": "258500001", "display": "Nasopharyngeal swab"}]}
                }
            }
        ]
    })
}

pub fn patient(bundle: &Value) -> &Value {
    &bundle["entry"][1]["resource"]
}

pub fn observation(bundle: &Value, index: usize) -> &Value {
    &bundle["entry"][2 + index]["resource"]
}

/// Encoded segments of `message` whose name is `name`.
pub fn segments(message: &Hl7Message, name: &str) -> Vec<String> {
    message
        .encode()
        .split('\r')
        .filter(|segment| segment.starts_with(name))
        .map(str::to_string)
        .collect()
}
