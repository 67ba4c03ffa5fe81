use serde_json::{Map, Value};

use crate::spec::FieldSet;

pub const PARENT_KEY: &str = "$parent";
pub const FORM_KEY: &str = "$form";
pub const ROOT_KEY: &str = "$root";

/// Builds the evaluation context of one scope.
///
/// Each field contributes a copy of its descriptor whose `value` is the
/// current model value (`null` when unset). `$parent` holds the enclosing
/// scope's context, or `false` at the root. The result is a fresh snapshot;
/// neither the fields nor the model are touched.
pub fn build_context(fields: &FieldSet, model: Option<&Value>, parent: Option<&Value>) -> Value {
    let mut context = Map::new();
    for field in fields.iter() {
        let mut entry = match field.to_value() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let value = model
            .and_then(|model| model.get(&field.name))
            .cloned()
            .unwrap_or(Value::Null);
        entry.insert("value".into(), value);
        context.insert(field.name.clone(), Value::Object(entry));
    }
    context.insert(
        PARENT_KEY.into(),
        parent.cloned().unwrap_or(Value::Bool(false)),
    );
    Value::Object(context)
}

/// Context seen by a field instance: the scope context plus `$form` and
/// `$root`.
pub fn instance_context(context: &Value, form: &Value, root: &Value) -> Value {
    let mut map = context.as_object().cloned().unwrap_or_default();
    map.insert(FORM_KEY.into(), form.clone());
    map.insert(ROOT_KEY.into(), root.clone());
    Value::Object(map)
}
