use serde_json::{Map, Value, json};

/// Shapes accepted for a field's `options`, classified once at the
/// normalization boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptionsInput<'a> {
    /// No options, or `null`.
    Absent,
    Sequence(&'a [Value]),
    Mapping(&'a Map<String, Value>),
    Unrecognized(&'a Value),
}

impl<'a> OptionsInput<'a> {
    pub fn classify(raw: Option<&'a Value>) -> Self {
        match raw {
            None | Some(Value::Null) => OptionsInput::Absent,
            Some(Value::Array(items)) => OptionsInput::Sequence(items),
            Some(Value::Object(map)) => OptionsInput::Mapping(map),
            Some(other) => OptionsInput::Unrecognized(other),
        }
    }
}

/// Converts raw options into canonical `{value, label}` entries.
///
/// Plain strings in a sequence become `{value: s, label: s}`; any other
/// element is passed through as-is. A mapping yields one entry per key in the
/// map's iteration order. Absent or unrecognized input yields `None`.
pub fn normalize(raw: Option<&Value>) -> Option<Vec<Value>> {
    match OptionsInput::classify(raw) {
        OptionsInput::Sequence(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(text) => json!({ "value": text, "label": text }),
                    other => other.clone(),
                })
                .collect(),
        ),
        OptionsInput::Mapping(map) => Some(
            map.iter()
                .map(|(value, label)| json!({ "value": value, "label": label }))
                .collect(),
        ),
        OptionsInput::Absent | OptionsInput::Unrecognized(_) => None,
    }
}

/// Normalized options of one field instance.
///
/// Recomputes only when the raw input changed. Absent input keeps the last
/// normalized list; an unrecognized shape clears it.
#[derive(Debug, Clone, Default)]
pub(crate) struct OptionsState {
    watched: Option<Option<Value>>,
    normalized: Option<Vec<Value>>,
}

impl OptionsState {
    /// Returns true when the raw input changed since the previous call.
    pub(crate) fn observe(&mut self, raw: Option<&Value>) -> bool {
        if self
            .watched
            .as_ref()
            .is_some_and(|watched| watched.as_ref() == raw)
        {
            return false;
        }
        self.watched = Some(raw.cloned());
        match OptionsInput::classify(raw) {
            OptionsInput::Absent => {}
            OptionsInput::Unrecognized(_) => self.normalized = None,
            OptionsInput::Sequence(_) | OptionsInput::Mapping(_) => {
                self.normalized = normalize(raw);
            }
        }
        true
    }

    pub(crate) fn normalized(&self) -> Option<&[Value]> {
        self.normalized.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_entries_pass_through_unchanged() {
        let raw = json!([{ "value": "a", "label": "A" }]);
        assert_eq!(normalize(Some(&raw)), Some(vec![json!({ "value": "a", "label": "A" })]));
    }

    #[test]
    fn strings_become_value_label_pairs_in_order() {
        let raw = json!(["x", "y"]);
        assert_eq!(
            normalize(Some(&raw)),
            Some(vec![
                json!({ "value": "x", "label": "x" }),
                json!({ "value": "y", "label": "y" }),
            ])
        );
    }

    #[test]
    fn mixed_sequences_are_not_validated() {
        let raw = json!(["x", 42, { "value": "z" }]);
        let normalized = normalize(Some(&raw)).expect("sequence");
        assert_eq!(normalized[1], json!(42));
        assert_eq!(normalized[2], json!({ "value": "z" }));
    }

    #[test]
    fn mappings_use_keys_as_values() {
        let raw = json!({ "a": "Alpha", "b": "Beta" });
        assert_eq!(
            normalize(Some(&raw)),
            Some(vec![
                json!({ "value": "a", "label": "Alpha" }),
                json!({ "value": "b", "label": "Beta" }),
            ])
        );
    }

    #[test]
    fn mappings_keep_authored_key_order() {
        let raw: Value =
            serde_json::from_str(r#"{ "s": "Small", "m": "Medium", "l": "Large" }"#).unwrap();
        let labels: Vec<Value> = normalize(Some(&raw))
            .expect("mapping")
            .into_iter()
            .map(|option| option["label"].clone())
            .collect();
        assert_eq!(labels, vec![json!("Small"), json!("Medium"), json!("Large")]);
    }

    #[test]
    fn absent_and_unrecognized_shapes_yield_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&Value::Null)), None);
        assert_eq!(normalize(Some(&json!("a,b"))), None);
        assert_eq!(normalize(Some(&json!(3))), None);
    }

    #[test]
    fn absent_input_keeps_previous_list() {
        let mut state = OptionsState::default();
        assert!(state.observe(Some(&json!(["x"]))));
        assert!(!state.observe(Some(&json!(["x"]))));
        assert!(state.observe(None));
        assert_eq!(state.normalized(), Some(&[json!({ "value": "x", "label": "x" })][..]));
    }

    #[test]
    fn unrecognized_input_clears_previous_list() {
        let mut state = OptionsState::default();
        state.observe(Some(&json!({ "a": "A" })));
        state.observe(Some(&json!(true)));
        assert_eq!(state.normalized(), None);
    }
}
