use atrius_fhir_path::{
    ConstantResolver, EvaluationContext, EvaluationError, FhirNode, R4Model, evaluate_condition,
    evaluate_expression, evaluate_string,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

fn lab_bundle() -> Value {
    json!({
        "resourceType": "Bundle",
        "type": "message",
        "entry": [
            {
                "fullUrl": "MessageHeader/mh-1",
                "resource": {
                    "resourceType": "MessageHeader",
                    "id": "mh-1",
                    "eventCoding": {"system": "http://terminology.hl7.org/CodeSystem/v2-0003", "code": "R01"},
                    "source": {"name": "CDC PRIME - Atlanta", "endpoint": "urn:oid:2.16.840.1.114222.4.1.237821"}
                }
            },
            {
                "fullUrl": "Patient/pat-1",
                "resource": {
                    "resourceType": "Patient",
                    "id": "pat-1",
                    "name": [
                        {"use": "official", "family": "Doe", "given": ["Jane", "Q"]},
                        {"use": "nickname", "given": ["JJ"]}
                    ],
                    "birthDate": "1980-02-29",
                    "gender": "female"
                }
            },
            {
                "fullUrl": "Observation/obs-1",
                "resource": {
                    "resourceType": "Observation",
                    "id": "obs-1",
                    "status": "final",
                    "subject": {"reference": "Patient/pat-1"},
                    "valueQuantity": {"value": 7.25, "unit": "mmol/L"}
                }
            },
            {
                "fullUrl": "Observation/obs-2",
                "resource": {
                    "resourceType": "Observation",
                    "id": "obs-2",
                    "status": "preliminary",
                    "subject": {"reference": "Patient/pat-1"},
                    "valueString": "Detected"
                }
            }
        ]
    })
}

// Helper function to evaluate against the bundle root
fn eval(input: &str, bundle: &Value) -> Result<Vec<FhirNode>, EvaluationError> {
    let model = R4Model::new();
    let context = EvaluationContext::new(bundle, &model);
    evaluate_expression(input, &context)
}

fn eval_string(input: &str, bundle: &Value) -> String {
    let model = R4Model::new();
    let context = EvaluationContext::new(bundle, &model);
    evaluate_string(input, &context).unwrap_or_else(|e| panic!("'{}' failed: {}", input, e))
}

#[test]
fn test_literals_and_arithmetic() {
    let bundle = json!({});
    assert_eq!(eval_string("1 + 2 * 3", &bundle), "7");
    assert_eq!(eval_string("7 div 2", &bundle), "3");
    assert_eq!(eval_string("7 mod 2", &bundle), "1");
    assert_eq!(eval_string("1.5 + 1", &bundle), "2.5");
    assert_eq!(eval_string("'a' & {} & 'b'", &bundle), "ab");
    assert_eq!(eval_string("'a' + 'b'", &bundle), "ab");
    assert_eq!(eval_string("-5", &bundle), "-5");
    assert!(eval("5 / 0", &bundle).unwrap().is_empty());
}

#[test]
fn test_root_type_name_selects_focus() {
    let bundle = lab_bundle();
    assert_eq!(eval("Bundle", &bundle).unwrap().len(), 1);
    assert!(eval("Patient", &bundle).unwrap().is_empty());
    assert_eq!(eval_string("Bundle.type", &bundle), "message");
    // Without the type name the path starts at the focus
    assert_eq!(eval_string("type", &bundle), "message");
}

#[test]
fn test_of_type_and_where() {
    let bundle = lab_bundle();
    assert_eq!(
        eval("Bundle.entry.resource.ofType(Observation)", &bundle).unwrap().len(),
        2
    );
    assert_eq!(
        eval_string(
            "Bundle.entry.resource.ofType(Patient).name.where(use = 'official').given.first()",
            &bundle
        ),
        "Jane"
    );
    assert_eq!(
        eval_string(
            "Bundle.entry.resource.ofType(Observation).where(status = 'final').id",
            &bundle
        ),
        "obs-1"
    );
    assert_eq!(
        eval_string("Bundle.entry.resource.ofType(Patient).name.given.count()", &bundle),
        "3"
    );
}

#[test]
fn test_choice_elements() {
    let bundle = lab_bundle();
    let values = eval("Bundle.entry.resource.ofType(Observation).value", &bundle).unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[0].type_name.as_deref(), Some("Quantity"));
    assert_eq!(values[1].type_name.as_deref(), Some("string"));
    assert_eq!(
        eval_string("Bundle.entry.resource.ofType(MessageHeader).event.code", &bundle),
        "R01"
    );
    assert_eq!(
        eval_string("Bundle.entry.resource.ofType(Observation).value.ofType(Quantity).value", &bundle),
        "7.25"
    );
}

#[test]
fn test_resolve_references() {
    let bundle = lab_bundle();
    assert_eq!(
        eval_string(
            "Bundle.entry.resource.ofType(Observation).first().subject.resolve().name.family",
            &bundle
        ),
        "Doe"
    );
    let resolved = eval(
        "Bundle.entry.resource.ofType(Observation).first().subject.resolve()",
        &bundle,
    )
    .unwrap();
    assert_eq!(
        resolved[0].location.as_ref().map(|l| l.to_string()).as_deref(),
        Some("/entry/1/resource")
    );
}

#[test]
fn test_string_functions() {
    let bundle = json!({});
    assert_eq!(eval_string("'abcdef'.substring(2, 3)", &bundle), "cde");
    assert_eq!(eval_string("'abcdef'.substring(4)", &bundle), "ef");
    assert_eq!(eval_string("' pad '.trim()", &bundle), "pad");
    assert_eq!(eval_string("'abc'.upper()", &bundle), "ABC");
    assert_eq!(eval_string("'abc'.length()", &bundle), "3");
    assert_eq!(eval_string("'a,b,c'.split(',').join('|')", &bundle), "a|b|c");
    assert_eq!(eval_string("'hello'.replace('l', 'L')", &bundle), "heLLo");
    assert_eq!(eval_string("'hello'.indexOf('ll')", &bundle), "2");
    assert_eq!(eval_string("'2.16.840'.matches('[0-9.]+')", &bundle), "true");
    assert_eq!(eval_string("'x2.16'.matches('[0-9.]+')", &bundle), "false");
    assert_eq!(eval_string("'R01'.startsWith('R')", &bundle), "true");
}

#[test]
fn test_boolean_logic() {
    let bundle = json!({});
    assert_eq!(eval_string("true and false", &bundle), "false");
    assert_eq!(eval_string("true or {}", &bundle), "true");
    assert!(eval("true and {}", &bundle).unwrap().is_empty());
    assert_eq!(eval_string("false implies {}", &bundle), "true");
    assert_eq!(eval_string("true xor false", &bundle), "true");
    assert_eq!(eval_string("(1 = 1).not()", &bundle), "false");
    assert_eq!(eval_string("iif(1 > 2, 'yes', 'no')", &bundle), "no");
    assert_eq!(eval_string("'b' in ('a' | 'b')", &bundle), "true");
    assert_eq!(eval_string("('a' | 'b' | 'a').count()", &bundle), "2");
}

#[test]
fn test_strings_are_not_booleans() {
    let bundle = lab_bundle();
    assert_eq!(eval_string("'false' and true", &bundle), "true");
    assert_eq!(eval_string("('false').not()", &bundle), "false");
    assert_eq!(eval_string("'false' or false", &bundle), "true");
    assert_eq!(eval_string("Bundle.entry.where('false').count()", &bundle), "4");
}

#[test]
fn test_equality_semantics() {
    let bundle = json!({});
    assert_eq!(eval_string("1 = 1.0", &bundle), "true");
    assert_eq!(eval_string("'Abc' ~ 'aBC'", &bundle), "true");
    assert_eq!(eval_string("'Abc' = 'aBC'", &bundle), "false");
    assert!(eval("{} = 1", &bundle).unwrap().is_empty());
    assert_eq!(eval_string("@2020-01-01 < @2021-01-01", &bundle), "true");
}

struct Constants(HashMap<String, String>);

impl ConstantResolver for Constants {
    fn resolve_constant(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

#[test]
fn test_constants_and_focus() {
    let bundle = lab_bundle();
    let model = R4Model::new();
    let constants = Constants(HashMap::from([
        ("patient".to_string(), "Bundle.entry.resource.ofType(Patient)".to_string()),
        ("familyName".to_string(), "%patient.name.family".to_string()),
        ("loop".to_string(), "%loop".to_string()),
    ]));
    let context = EvaluationContext::new(&bundle, &model).with_constants(&constants);
    assert_eq!(evaluate_string("%familyName", &context).unwrap(), "Doe");
    assert_eq!(evaluate_string("%bundle.type", &context).unwrap(), "message");

    let patient = evaluate_expression("%patient", &context).unwrap().remove(0);
    let focused = context.clone().with_focus(patient);
    assert_eq!(evaluate_string("%resource.birthDate", &focused).unwrap(), "1980-02-29");
    assert_eq!(evaluate_string("gender", &focused).unwrap(), "female");
    assert_eq!(evaluate_string("%rootResource.entry.count()", &focused).unwrap(), "4");

    assert!(matches!(
        evaluate_expression("%undefined", &context),
        Err(EvaluationError::UndefinedVariable(_))
    ));
    assert!(matches!(
        evaluate_expression("%loop", &context),
        Err(EvaluationError::RecursionLimit(_))
    ));
}

#[test]
fn test_conditions() {
    let bundle = lab_bundle();
    let model = R4Model::new();
    let context = EvaluationContext::new(&bundle, &model);
    assert!(evaluate_condition("Bundle.entry.exists()", &context).unwrap());
    assert!(!evaluate_condition("Bundle.entry.resource.ofType(Device).exists().not().not()", &context).unwrap());
    // Empty is false
    assert!(!evaluate_condition("Bundle.entry.resource.ofType(Device).id = 'x'", &context).unwrap());
    // Non-boolean results are errors, never silently true
    assert!(matches!(
        evaluate_condition("Bundle.type", &context),
        Err(EvaluationError::TypeError(_))
    ));
    assert!(matches!(
        evaluate_condition("Bundle.entry.exists(", &context),
        Err(EvaluationError::ParseError(_))
    ));
}

#[test]
fn test_index_variable() {
    let bundle = lab_bundle();
    assert_eq!(
        eval_string("Bundle.entry.select($index).last()", &bundle),
        "3"
    );
    assert_eq!(eval_string("Bundle.entry[2].resource.id", &bundle), "obs-1");
}

#[test]
fn test_results_share_the_context_tree() {
    let tree = Arc::new(lab_bundle());
    let model = R4Model::new();
    let context = EvaluationContext::shared(Arc::clone(&tree), &model);

    let found = evaluate_expression(
        "Bundle.entry.resource.ofType(Observation).first().subject.resolve().name.first() | %bundle",
        &context,
    )
    .unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|node| node.tree().is_some_and(|t| Arc::ptr_eq(t, &tree))));
    assert_eq!(found[1].value(), tree.as_ref());
}
