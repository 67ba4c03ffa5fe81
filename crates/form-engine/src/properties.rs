use std::sync::Arc;

use serde_json::Value;

use crate::error::FormError;
use crate::expr::{CompiledExpr, Evaluator, ExprError, truthy};
use crate::path::FieldPath;
use crate::spec::{DynamicProperty, Field};

#[derive(Debug, Default)]
struct Slot {
    observed: bool,
    source: Option<String>,
    compiled: Option<Arc<dyn CompiledExpr>>,
}

/// Compiled `visible` / `required` / `disabled` expressions of one field
/// instance.
///
/// Expressions are recompiled only when their source text changes; evaluation
/// against a new context reuses the compiled form.
#[derive(Debug, Default)]
pub(crate) struct PropertyResolver {
    slots: [Slot; 3],
}

impl PropertyResolver {
    /// Picks up changed expression sources. Returns true when any changed.
    pub(crate) fn observe(
        &mut self,
        field: &Field,
        evaluator: &dyn Evaluator,
        path: &FieldPath,
    ) -> Result<bool, FormError> {
        let mut changed = false;
        for property in DynamicProperty::ALL {
            let slot = &mut self.slots[property.index()];
            let source = field.expression(property);
            if slot.observed && slot.source.as_deref() == source {
                continue;
            }
            changed = true;
            slot.observed = false;
            slot.compiled = None;
            if let Some(source) = source {
                let compiled =
                    evaluator
                        .compile(source)
                        .map_err(|source| FormError::Expression {
                            path: path.clone(),
                            property: property.as_str(),
                            source,
                        })?;
                slot.compiled = Some(compiled);
            }
            slot.source = source.map(str::to_string);
            slot.observed = true;
        }
        Ok(changed)
    }

    /// Current value of a property: the expression result coerced to a
    /// boolean, or the property default when there is no expression.
    pub(crate) fn evaluate(
        &self,
        property: DynamicProperty,
        context: &Value,
        locals: &Value,
    ) -> Result<bool, ExprError> {
        match &self.slots[property.index()].compiled {
            Some(expr) => Ok(truthy(&expr.evaluate(context, locals)?)),
            None => Ok(property.default_value()),
        }
    }

    #[cfg(test)]
    pub(crate) fn source(&self, property: DynamicProperty) -> Option<&str> {
        self.slots[property.index()].source.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DefaultEvaluator;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingEvaluator {
        compiled: AtomicUsize,
    }

    impl Evaluator for CountingEvaluator {
        fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpr>, ExprError> {
            self.compiled.fetch_add(1, Ordering::SeqCst);
            DefaultEvaluator.compile(source)
        }
    }

    #[test]
    fn defaults_apply_without_expressions() {
        let mut resolver = PropertyResolver::default();
        let field = Field::new("test", "text");
        resolver
            .observe(&field, &DefaultEvaluator, &FieldPath::root())
            .expect("observe");

        let ctx = json!({});
        let locals = json!({});
        assert!(resolver.evaluate(DynamicProperty::Visible, &ctx, &locals).unwrap());
        assert!(!resolver.evaluate(DynamicProperty::Required, &ctx, &locals).unwrap());
        assert!(!resolver.evaluate(DynamicProperty::Disabled, &ctx, &locals).unwrap());
    }

    #[test]
    fn recompiles_only_when_source_changes() {
        let evaluator = CountingEvaluator::default();
        let mut resolver = PropertyResolver::default();
        let mut field = Field::new("test", "text");
        field.required = Some("test.value === 'require-me'".into());
        let path = FieldPath::from(["test"]);

        assert!(resolver.observe(&field, &evaluator, &path).unwrap());
        assert!(!resolver.observe(&field, &evaluator, &path).unwrap());
        assert_eq!(evaluator.compiled.load(Ordering::SeqCst), 1);

        let locals = json!({});
        let required = json!({ "test": { "value": "require-me" } });
        let optional = json!({ "test": { "value": "sup" } });
        assert!(resolver.evaluate(DynamicProperty::Required, &required, &locals).unwrap());
        assert!(!resolver.evaluate(DynamicProperty::Required, &optional, &locals).unwrap());
        assert_eq!(evaluator.compiled.load(Ordering::SeqCst), 1);

        field.required = Some("test.value === 'other'".into());
        assert!(resolver.observe(&field, &evaluator, &path).unwrap());
        assert_eq!(evaluator.compiled.load(Ordering::SeqCst), 2);
        assert_eq!(
            resolver.source(DynamicProperty::Required),
            Some("test.value === 'other'")
        );
    }

    #[test]
    fn compile_errors_name_the_property() {
        let mut resolver = PropertyResolver::default();
        let mut field = Field::new("test", "text");
        field.disabled = Some("test.value ===".into());
        let err = resolver
            .observe(&field, &DefaultEvaluator, &FieldPath::from(["test"]))
            .unwrap_err();
        assert!(matches!(
            err,
            FormError::Expression {
                property: "disabled",
                ..
            }
        ));
    }
}
