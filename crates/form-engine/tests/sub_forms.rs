use serde_json::{Value, json};

use form_engine::{FieldTemplate, FieldTypeRegistry, Form, FormEngine, MountEvent};

fn fixture(name: &str) -> &'static str {
    match name {
        "nested_form" => include_str!("../tests/fixtures/nested_form.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn registry() -> FieldTypeRegistry {
    let registry = FieldTypeRegistry::new();
    registry.register("text", FieldTemplate::inline("<input>"));
    registry.register("select", FieldTemplate::inline("<select></select>"));
    registry.register("form", FieldTemplate::inline("<fieldset>{{{sub_form}}}</fieldset>"));
    registry
}

fn engine(model: Value, registry: &FieldTypeRegistry) -> FormEngine {
    let form: Form = serde_json::from_str(fixture("nested_form")).expect("deserialize");
    let mut engine = FormEngine::builder(form)
        .model(model)
        .registry(registry.clone())
        .build()
        .expect("engine");
    engine.digest().expect("digest");
    engine
}

#[test]
fn sub_form_models_are_created_lazily() {
    let mut engine = engine(json!({}), &registry());
    assert_eq!(
        engine.model(),
        &json!({ "address": { "details": { "extra": {} } } })
    );

    engine.set_value(&["address", "street"], json!("Main St")).unwrap();
    engine.digest().unwrap();
    assert_eq!(engine.model()["address"]["street"], "Main St");
    let street = engine.field(&["address", "street"]).expect("street");
    assert_eq!(street.value(), &json!("Main St"));

    let address = engine.field(&["address"]).unwrap().sub_form().expect("sub-form");
    assert_eq!(address.model_path().unwrap().to_string(), "address");
    assert_eq!(address.context()["street"]["value"], "Main St");
}

#[test]
fn existing_sub_models_are_kept() {
    let engine = engine(
        json!({ "address": { "zip": "1011AB" }, "country": "nl" }),
        &registry(),
    );
    assert_eq!(engine.model()["address"]["zip"], "1011AB");
    let zip = engine.field(&["address", "zip"]).unwrap();
    assert_eq!(zip.value(), &json!("1011AB"));
}

#[test]
fn parent_chain_has_one_level_per_depth() {
    let mut engine = engine(json!({ "country": "nl" }), &registry());
    assert!(engine.field(&["address", "zip"]).unwrap().required().unwrap());
    let note = engine
        .field(&["address", "details", "extra", "note"])
        .expect("note");
    assert!(note.visible().unwrap());
    assert_eq!(note.context()["$parent"]["$parent"]["$parent"]["$parent"], json!(false));

    engine.set_value(&["country"], json!("be")).unwrap();
    engine.digest().unwrap();
    assert!(!engine.field(&["address", "zip"]).unwrap().required().unwrap());
    assert!(
        !engine
            .field(&["address", "details", "extra", "note"])
            .unwrap()
            .visible()
            .unwrap()
    );
}

#[test]
fn sub_form_expressions_see_the_sub_form_as_form() {
    let engine = engine(json!({}), &registry());
    let street = engine.field(&["address", "street"]).unwrap();
    assert_eq!(street.evaluate("$form.name").unwrap(), json!("address"));
    assert_eq!(street.evaluate("$root.title").unwrap(), json!("Shipping"));
    assert_eq!(street.evaluate("this.name").unwrap(), json!("street"));
}

#[test]
fn unmounting_a_sub_form_disposes_its_scope() {
    let registry = registry();
    let mut engine = engine(json!({}), &registry);
    engine.drain_events();

    registry.unregister("form");
    engine.digest().unwrap();
    assert!(engine.field(&["address"]).unwrap().sub_form().is_none());
    assert!(engine.field(&["address", "street"]).is_none());

    let events = engine.drain_events();
    let unmounted: Vec<String> = events
        .iter()
        .map(|event| match event {
            MountEvent::Unmounted { path, .. } => path.to_string(),
            MountEvent::Mounted { path, .. } => panic!("unexpected mount of {path}"),
        })
        .collect();
    assert_eq!(
        unmounted,
        vec![
            "address",
            "address.street",
            "address.zip",
            "address.details",
            "address.details.extra",
            "address.details.extra.note",
        ]
    );
}

#[test]
fn non_object_parent_models_give_valueless_sub_forms() {
    let engine = engine(Value::Null, &registry());
    assert_eq!(engine.model(), &Value::Null);
    let address = engine.field(&["address"]).unwrap().sub_form().expect("sub-form");
    assert!(address.model_path().is_none());
    assert_eq!(address.context()["street"]["value"], json!(null));
}
