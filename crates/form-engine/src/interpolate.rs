use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;

use crate::error::FormError;
use crate::expr::{CompiledExpr, Evaluator, ExprError};
use crate::path::FieldPath;
use crate::spec::Field;

static SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("segment pattern is valid"));

#[derive(Debug, Clone)]
enum Part {
    Text(String),
    Expr(Arc<dyn CompiledExpr>),
}

/// Text with `{{ expression }}` segments.
#[derive(Debug, Clone)]
pub struct Interpolation {
    source: String,
    parts: Vec<Part>,
}

impl Interpolation {
    /// Compiles `source`; returns `None` when it has no segments.
    pub fn compile(source: &str, evaluator: &dyn Evaluator) -> Result<Option<Self>, ExprError> {
        let mut parts = Vec::new();
        let mut last = 0;
        for captures in SEGMENT.captures_iter(source) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Text(source[last..whole.start()].to_string()));
            }
            parts.push(Part::Expr(evaluator.compile(inner.as_str().trim())?));
            last = whole.end();
        }
        if !parts.iter().any(|part| matches!(part, Part::Expr(_))) {
            return Ok(None);
        }
        if last < source.len() {
            parts.push(Part::Text(source[last..].to_string()));
        }
        Ok(Some(Self {
            source: source.to_string(),
            parts,
        }))
    }

    pub fn render(&self, context: &Value, locals: &Value) -> Result<String, ExprError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Expr(expr) => out.push_str(&stringify(&expr.evaluate(context, locals)?)),
            }
        }
        Ok(out)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Text form of an interpolated value: `null` is empty, strings are verbatim.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Derived value of a field whose `value` is an interpolation.
#[derive(Debug, Default)]
pub(crate) struct ValueBinding {
    observed: bool,
    source: Option<String>,
    interpolation: Option<Interpolation>,
    derived: Option<Value>,
}

impl ValueBinding {
    /// Recompiles on source change, then re-evaluates. Returns true when the
    /// derived value changed.
    pub(crate) fn observe(
        &mut self,
        field: &Field,
        evaluator: &dyn Evaluator,
        context: &Value,
        locals: &Value,
        path: &FieldPath,
    ) -> Result<bool, FormError> {
        let to_error = |source: ExprError| FormError::Expression {
            path: path.clone(),
            property: "value",
            source,
        };
        let source = field.value.as_deref();
        if !self.observed || self.source.as_deref() != source {
            self.observed = false;
            self.interpolation = match source {
                Some(source) => Interpolation::compile(source, evaluator).map_err(to_error)?,
                None => None,
            };
            self.source = source.map(str::to_string);
            self.observed = true;
        }
        let derived = match &self.interpolation {
            Some(interpolation) => Some(Value::String(
                interpolation.render(context, locals).map_err(to_error)?,
            )),
            None => None,
        };
        let changed = derived != self.derived;
        self.derived = derived;
        Ok(changed)
    }

    pub(crate) fn derived(&self) -> Option<&Value> {
        self.derived.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DefaultEvaluator;
    use serde_json::json;

    #[test]
    fn plain_text_is_not_an_interpolation() {
        let compiled = Interpolation::compile("hello", &DefaultEvaluator).expect("compile");
        assert!(compiled.is_none());
    }

    #[test]
    fn segments_are_evaluated_and_joined() {
        let interpolation = Interpolation::compile(
            "Hello {{ first.value }} {{last.value}}!",
            &DefaultEvaluator,
        )
        .expect("compile")
        .expect("has segments");
        let ctx = json!({ "first": { "value": "Ada" }, "last": { "value": null } });
        assert_eq!(
            interpolation.render(&ctx, &json!({})).unwrap(),
            "Hello Ada !"
        );
        assert_eq!(interpolation.source(), "Hello {{ first.value }} {{last.value}}!");
    }

    #[test]
    fn non_string_results_are_serialized() {
        assert_eq!(stringify(&json!(3)), "3");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&json!({ "a": 1 })), r#"{"a":1}"#);
    }

    #[test]
    fn binding_tracks_context_changes() {
        let mut field = Field::new("greeting", "text");
        field.value = Some("Hi {{ name.value }}".into());
        let path = FieldPath::from(["greeting"]);
        let locals = json!({});
        let mut binding = ValueBinding::default();

        let ctx = json!({ "name": { "value": "Ada" } });
        assert!(binding.observe(&field, &DefaultEvaluator, &ctx, &locals, &path).unwrap());
        assert_eq!(binding.derived(), Some(&json!("Hi Ada")));
        assert!(!binding.observe(&field, &DefaultEvaluator, &ctx, &locals, &path).unwrap());

        let ctx = json!({ "name": { "value": "Grace" } });
        assert!(binding.observe(&field, &DefaultEvaluator, &ctx, &locals, &path).unwrap());
        assert_eq!(binding.derived(), Some(&json!("Hi Grace")));

        field.value = None;
        assert!(binding.observe(&field, &DefaultEvaluator, &ctx, &locals, &path).unwrap());
        assert_eq!(binding.derived(), None);
    }

    #[test]
    fn malformed_segment_is_reported_as_value_error() {
        let mut field = Field::new("greeting", "text");
        field.value = Some("{{ name. }}".into());
        let err = ValueBinding::default()
            .observe(
                &field,
                &DefaultEvaluator,
                &json!({}),
                &json!({}),
                &FieldPath::from(["greeting"]),
            )
            .unwrap_err();
        assert!(matches!(err, FormError::Expression { property: "value", .. }));
    }
}
