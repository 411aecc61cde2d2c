mod common;

use atrius_fhir_translation::{
    ConverterElement, ConverterOptions, Element, FhirToHl7Converter, Hl7Spec, InlineValueSet,
    Schema, TranslationError, TruncationConfig,
};
use atrius_hl7::{FieldAccessor, Hl7Message};
use common::{lab_bundle, segments};
use std::collections::BTreeMap;
use std::sync::Arc;

const PATIENT: &str = "Bundle.entry.resource.ofType(Patient)";
const OBSERVATIONS: &str = "Bundle.entry.resource.ofType(Observation)";
const PID: &str = "/PATIENT_RESULT/PATIENT/PID";

fn leaf(name: &str, value: &str, locators: &[&str]) -> ConverterElement {
    Element::leaf(
        name,
        [value],
        Hl7Spec(locators.iter().map(|l| l.to_string()).collect()),
    )
}

fn convert(schema: Schema<Hl7Spec>) -> Result<Hl7Message, TranslationError> {
    FhirToHl7Converter::new(Arc::new(schema)).convert(&lab_bundle())
}

fn convert_strict(schema: Schema<Hl7Spec>) -> Result<Hl7Message, TranslationError> {
    FhirToHl7Converter::new(Arc::new(schema))
        .strict(true)
        .convert(&lab_bundle())
}

fn get(message: &Hl7Message, locator: &str) -> Option<String> {
    message.get(locator).unwrap()
}

#[test]
fn test_patient_fields() {
    let sex = Arc::new(InlineValueSet::new([("female", "F"), ("male", "M")]));
    let patient = Schema::new("patient")
        .with_element(leaf("family", "name.family", &[&format!("{}-5-1", PID)]))
        .with_element(leaf("given", "name.given", &[&format!("{}-5-2", PID)]))
        .with_element(leaf("dob", "birthDate", &[&format!("{}-7", PID)]))
        .with_element(leaf("sex", "gender", &[&format!("{}-8", PID)]).with_value_set(sex));
    let schema = Schema::new("ORU")
        .with_element(
            leaf("sending-app", "source.software", &["MSH-3-1"])
                .with_resource("Bundle.entry.resource.ofType(MessageHeader)"),
        )
        .with_element(leaf("control-id", "Bundle.id", &["MSH-10"]))
        .with_element(Element::branch("patient", Arc::new(patient)).with_resource(PATIENT));

    let message = convert(schema).unwrap();
    assert_eq!(get(&message, "MSH-3-1").as_deref(), Some("LabSys"));
    assert_eq!(get(&message, "MSH-9-3").as_deref(), Some("ORU_R01"));
    assert_eq!(get(&message, "MSH-10").as_deref(), Some("bundle-1"));
    assert_eq!(get(&message, "MSH-12").as_deref(), Some("2.5.1"));
    assert_eq!(get(&message, &format!("{}-5-1", PID)).as_deref(), Some("Doe"));
    assert_eq!(get(&message, &format!("{}-5-2", PID)).as_deref(), Some("Jane"));
    assert_eq!(get(&message, &format!("{}-7", PID)).as_deref(), Some("19800704"));
    assert_eq!(get(&message, &format!("{}-8", PID)).as_deref(), Some("F"));
    assert_eq!(segments(&message, "PID"), vec!["PID|||||Doe^Jane||19800704|F"]);
}

#[test]
fn test_schema_message_type() {
    let schema = Schema::new("ADT")
        .with_hl7_type("ADT_A01", "2.3")
        .with_element(leaf("family", "Bundle.entry.resource.ofType(Patient).name.family", &["PID-5-1"]));
    let message = convert(schema).unwrap();
    assert_eq!(message.message_type(), "ADT_A01");
    assert_eq!(get(&message, "MSH-9-1").as_deref(), Some("ADT"));
    assert_eq!(get(&message, "MSH-12").as_deref(), Some("2.3"));
}

#[test]
fn test_duplicate_names_fail_before_conversion() {
    let child = Schema::new("child").with_element(leaf("family", "name.family", &["PID-5-1"]));
    let schema = Schema::new("root")
        .with_element(leaf("family", "'x'", &["PID-5-1"]))
        .with_element(Element::branch("patient", Arc::new(child)).with_resource(PATIENT));

    let error = convert(schema).unwrap_err();
    assert!(matches!(error, TranslationError::Schema(ref m) if m.contains("family")));
}

#[test]
fn test_required_element_with_false_condition() {
    let schema = Schema::new("root").with_element(
        leaf("must", "'x'", &["PID-1"])
            .with_condition("Bundle.type = 'collection'")
            .required(true),
    );
    let error = convert(schema).unwrap_err();
    assert!(matches!(
        error,
        TranslationError::RequiredElement { ref element, .. } if element == "must"
    ));

    let optional = Schema::new("root").with_element(
        leaf("may", "'x'", &["PID-1"]).with_condition("Bundle.type = 'collection'"),
    );
    let message = convert(optional).unwrap();
    assert!(segments(&message, "PID").is_empty());
}

#[test]
fn test_required_element_without_resource() {
    let schema = Schema::new("root").with_element(
        leaf("device", "id", &["PRT-1"])
            .with_resource("Bundle.entry.resource.ofType(Device)")
            .required(true),
    );
    assert!(matches!(
        convert(schema).unwrap_err(),
        TranslationError::RequiredElement { .. }
    ));

    let schema = Schema::new("root").with_element(
        leaf("device", "id", &["PRT-1"]).with_resource("Bundle.entry.resource.ofType(Device)"),
    );
    assert_eq!(convert(schema).unwrap().segment_names(), vec!["MSH"]);
}

#[test]
fn test_faulty_condition_skips_element() {
    let schema = Schema::new("root")
        .with_element(leaf("broken", "'x'", &["PID-1"]).with_condition("Bundle.entry.where("))
        .with_element(leaf("fine", "'y'", &["PID-2"]));
    let message = convert(schema).unwrap();
    assert_eq!(get(&message, "PID-1"), None);
    assert_eq!(get(&message, "PID-2").as_deref(), Some("y"));
}

#[test]
fn test_multiple_resources_need_an_index() {
    let schema = Schema::new("root")
        .with_element(leaf("obs-code", "code.coding.code", &["OBX-3-1"]).with_resource(OBSERVATIONS));
    let error = convert(schema).unwrap_err();
    assert!(matches!(error, TranslationError::Schema(ref m) if m.contains("obs-code")));
}

#[test]
fn test_resource_index_iterates_in_order() {
    let observation = Schema::new("observation")
        .with_element(leaf(
            "obx-set-id",
            "%obsIndex + 1",
            &["/PATIENT_RESULT/ORDER_OBSERVATION/OBSERVATION(%{obsIndex})/OBX-1"],
        ))
        .with_element(leaf(
            "obx-sub-id",
            "%obsIndex",
            &["/PATIENT_RESULT/ORDER_OBSERVATION/OBSERVATION(%{obsIndex})/OBX-4"],
        ))
        .with_element(leaf(
            "obx-code",
            "code.coding.code",
            &["/PATIENT_RESULT/ORDER_OBSERVATION/OBSERVATION(%{obsIndex})/OBX-3-1"],
        ));
    let schema = Schema::new("root").with_element(
        Element::branch("observations", Arc::new(observation))
            .with_resource(OBSERVATIONS)
            .with_resource_index("obsIndex"),
    );

    let message = convert(schema).unwrap();
    let obx = |index: usize, field: &str| {
        get(
            &message,
            &format!("/PATIENT_RESULT/ORDER_OBSERVATION/OBSERVATION({})/OBX-{}", index, field),
        )
    };
    assert_eq!(obx(0, "4").as_deref(), Some("0"));
    assert_eq!(obx(1, "4").as_deref(), Some("1"));
    assert_eq!(obx(0, "1").as_deref(), Some("1"));
    assert_eq!(obx(1, "1").as_deref(), Some("2"));
    assert_eq!(obx(0, "3-1").as_deref(), Some("94500-6"));
    assert_eq!(obx(1, "3-1").as_deref(), Some("2345-7"));
    assert_eq!(
        segments(&message, "OBX"),
        vec!["OBX|1||94500-6|0", "OBX|2||2345-7|1"]
    );
}

#[test]
fn test_invalid_locator_policy() {
    let schema = || {
        Schema::new("root").with_element(leaf("ids", "'123'", &["PID-x", "PID-19"]))
    };
    let message = convert(schema()).unwrap();
    assert_eq!(get(&message, "PID-19").as_deref(), Some("123"));

    let error = convert_strict(schema()).unwrap_err();
    assert!(matches!(error, TranslationError::Schema(ref m) if m.contains("ids")));
}

#[test]
fn test_accessor_failure_policy() {
    let schema = || Schema::new("root").with_element(leaf("separator", "'#'", &["MSH-1"]));
    let message = convert(schema()).unwrap();
    assert_eq!(get(&message, "MSH-1").as_deref(), Some("|"));

    match convert_strict(schema()).unwrap_err() {
        TranslationError::Hl7Conversion { element, locator, .. } => {
            assert_eq!(element, "separator");
            assert_eq!(locator, "MSH-1");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_required_value_missing() {
    let schema = || Schema::new("root").with_element(leaf("empty", "{}", &["PID-1"]).required(true));
    assert!(convert(schema()).is_ok());
    assert!(matches!(
        convert_strict(schema()).unwrap_err(),
        TranslationError::RequiredElement { .. }
    ));
}

#[test]
fn test_value_expression_fault_is_fatal() {
    let schema = Schema::new("root").with_element(leaf("bad", "%undefined", &["PID-1"]));
    match convert(schema).unwrap_err() {
        TranslationError::Evaluation { element, expression, .. } => {
            assert_eq!(element, "bad");
            assert_eq!(expression, "%undefined");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_truncation_options() {
    let schema = Schema::new("root")
        .with_element(
            leaf("facility", "source.name", &["MSH-4-1"])
                .with_resource("Bundle.entry.resource.ofType(MessageHeader)"),
        )
        .with_element(leaf("given", "'  Jane  '", &["PID-5-2"]))
        .with_element(leaf("note", "'A & B ~ C'", &["NTE-3"]));
    let options = ConverterOptions {
        strict: true,
        truncation: TruncationConfig {
            truncate_namespace_ids: true,
            truncate_fields: Vec::new(),
            custom_lengths: BTreeMap::from([("PID-5-2".to_string(), 3), ("NTE-3".to_string(), 7)]),
        },
    };

    let message = FhirToHl7Converter::new(Arc::new(schema))
        .with_options(options)
        .convert(&lab_bundle())
        .unwrap();
    assert_eq!(get(&message, "MSH-4-1").as_deref(), Some("Example Public Healt"));
    assert_eq!(get(&message, "PID-5-2").as_deref(), Some("Jan"));
    // Two reserved characters in the first seven leave room for three
    assert_eq!(get(&message, "NTE-3").as_deref(), Some("A &"));
}

#[test]
fn test_constants_are_scoped() {
    let child = Schema::new("child")
        .with_constant("label", "'child'")
        .with_element(leaf("nested", "%label", &["NTE(2)-3"]));
    let schema = Schema::new("root")
        .with_constant("label", "'root'")
        .with_constant("patient", PATIENT)
        .with_element(leaf("shadowed", "%label", &["NTE(0)-3"]).with_constant("label", "'element'"))
        .with_element(leaf("inherited", "%label", &["NTE(1)-3"]))
        .with_element(Element::branch("branch", Arc::new(child)))
        .with_element(leaf("after-branch", "%label", &["NTE(3)-3"]))
        .with_element(leaf("family", "name.family", &["PID-5-1"]).with_resource("%patient"));

    let message = convert(schema).unwrap();
    assert_eq!(get(&message, "NTE(0)-3").as_deref(), Some("element"));
    assert_eq!(get(&message, "NTE(1)-3").as_deref(), Some("root"));
    assert_eq!(get(&message, "NTE(2)-3").as_deref(), Some("child"));
    assert_eq!(get(&message, "NTE(3)-3").as_deref(), Some("root"));
    assert_eq!(get(&message, "PID-5-1").as_deref(), Some("Doe"));
}

#[test]
fn test_first_matching_value_wins() {
    let schema = Schema::new("root").with_element(Element::leaf(
        "name",
        [
            "Bundle.entry.resource.ofType(Patient).name.text",
            "Bundle.entry.resource.ofType(Patient).name.family",
            "'fallback'",
        ],
        Hl7Spec(vec!["PID-5-1".into()]),
    ));
    assert_eq!(get(&convert(schema).unwrap(), "PID-5-1").as_deref(), Some("Doe"));
}

#[test]
fn test_shared_bundle_is_released_after_conversion() {
    let schema = Schema::new("ORU")
        .with_element(leaf("control-id", "Bundle.id", &["MSH-10"]))
        .with_element(leaf("family", "name.family", &[&format!("{}-5-1", PID)]).with_resource(PATIENT));
    let bundle = Arc::new(lab_bundle());
    let message = FhirToHl7Converter::new(Arc::new(schema))
        .convert_shared(Arc::clone(&bundle))
        .unwrap();

    assert_eq!(get(&message, "MSH-10").as_deref(), Some("bundle-1"));
    assert_eq!(get(&message, &format!("{}-5-1", PID)).as_deref(), Some("Doe"));
    assert_eq!(Arc::strong_count(&bundle), 1);
}
