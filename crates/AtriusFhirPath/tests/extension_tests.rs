use atrius_fhir_path::{ConstantResolver, EvaluationContext, R4Model, evaluate_expression, evaluate_string};
use serde_json::{Value, json};

fn bundle() -> Value {
    json!({
        "resourceType": "Bundle",
        "entry": [{
            "resource": {
                "resourceType": "MessageHeader",
                "extension": [
                    {"url": "https://example.org/ext/encoding", "valueString": "UNICODE UTF-8"},
                    {"url": "https://example.org/ext/character-set", "valueCode": "UNICODE"}
                ],
                "source": {
                    "extension": [{"url": "https://example.org/ext/namespace", "valueString": "CDC PRIME"}]
                }
            }
        }]
    })
}

struct Urls;

impl ConstantResolver for Urls {
    fn resolve_constant(&self, name: &str) -> Option<String> {
        match name {
            "encodingUrl" => Some("'https://example.org/ext/encoding'".to_string()),
            _ => None,
        }
    }
}

#[test]
fn test_extension_value_by_url() {
    let bundle = bundle();
    let model = R4Model::new();
    let context = EvaluationContext::new(&bundle, &model);
    assert_eq!(
        evaluate_string(
            "Bundle.entry.resource.extension('https://example.org/ext/encoding').value",
            &context
        )
        .unwrap(),
        "UNICODE UTF-8"
    );
    assert_eq!(
        evaluate_string(
            "Bundle.entry.resource.source.extension('https://example.org/ext/namespace').valueString",
            &context
        )
        .unwrap(),
        "CDC PRIME"
    );
}

#[test]
fn test_extension_location_is_addressable() {
    let bundle = bundle();
    let model = R4Model::new();
    let context = EvaluationContext::new(&bundle, &model);
    let found = evaluate_expression(
        "Bundle.entry.resource.extension('https://example.org/ext/character-set')",
        &context,
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    let location = found[0].location.clone().unwrap();
    assert_eq!(location.to_string(), "/entry/0/resource/extension/1");
    assert_eq!(location.resolve(&bundle), Some(found[0].value()));
}

#[test]
fn test_extension_url_from_constant() {
    let bundle = bundle();
    let model = R4Model::new();
    let urls = Urls;
    let context = EvaluationContext::new(&bundle, &model).with_constants(&urls);
    assert_eq!(
        evaluate_string("Bundle.entry.resource.extension(%encodingUrl).value", &context).unwrap(),
        "UNICODE UTF-8"
    );
}

#[test]
fn test_missing_extension_is_empty() {
    let bundle = bundle();
    let model = R4Model::new();
    let context = EvaluationContext::new(&bundle, &model);
    let found = evaluate_expression("Bundle.entry.resource.extension('https://nowhere')", &context).unwrap();
    assert!(found.is_empty());
}
