use std::collections::BTreeSet;

use serde::Serialize;

use crate::expr::Evaluator;
use crate::interpolate::Interpolation;
use crate::options::OptionsInput;
use crate::registry::FieldTypeRegistry;
use crate::spec::{DynamicProperty, Field, FieldSet, Form};

/// Field type whose instances open a sub-form.
pub const SUB_FORM_TYPE: &str = "form";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

/// Checks a form definition against a registry and evaluator before it is
/// bound to a model.
pub fn validate(
    form: &Form,
    registry: &FieldTypeRegistry,
    evaluator: &dyn Evaluator,
) -> ValidationResult {
    let mut issues = Vec::new();
    validate_fields(&form.fields, "", registry, evaluator, &mut issues);
    ValidationResult {
        valid: issues.is_empty(),
        issues,
    }
}

fn validate_fields(
    fields: &FieldSet,
    prefix: &str,
    registry: &FieldTypeRegistry,
    evaluator: &dyn Evaluator,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut seen = BTreeSet::new();
    for (index, field) in fields.iter().enumerate() {
        if field.name.trim().is_empty() {
            let path = format!("{prefix}/{index}");
            issues.push(issue(&path, "field has no name", "missing_name"));
            validate_field(field, &path, registry, evaluator, issues);
            continue;
        }
        let path = format!("{prefix}/{}", field.name);
        if !seen.insert(field.name.as_str()) {
            issues.push(issue(
                &path,
                &format!("field name `{}` is used more than once", field.name),
                "duplicate_name",
            ));
        }
        validate_field(field, &path, registry, evaluator, issues);
    }
}

fn validate_field(
    field: &Field,
    path: &str,
    registry: &FieldTypeRegistry,
    evaluator: &dyn Evaluator,
    issues: &mut Vec<ValidationIssue>,
) {
    if let Some(kind) = field.field_type()
        && !registry.contains(kind)
    {
        issues.push(issue(
            path,
            &format!("field type `{kind}` is not registered"),
            "unknown_type",
        ));
    }

    for property in DynamicProperty::ALL {
        if let Some(source) = field.expression(property)
            && let Err(err) = evaluator.compile(source)
        {
            issues.push(issue(
                path,
                &format!("`{property}` expression does not compile: {err}"),
                "expression",
            ));
        }
    }

    if let Some(value) = field.value.as_deref()
        && let Err(err) = Interpolation::compile(value, evaluator)
    {
        issues.push(issue(
            path,
            &format!("`value` interpolation does not compile: {err}"),
            "expression",
        ));
    }

    if let OptionsInput::Unrecognized(_) = OptionsInput::classify(field.options.as_ref()) {
        issues.push(issue(
            path,
            "options must be a list or a mapping",
            "options_shape",
        ));
    }

    match &field.fields {
        Some(nested) => validate_fields(nested, path, registry, evaluator, issues),
        None if field.field_type() == Some(SUB_FORM_TYPE) => issues.push(issue(
            path,
            "sub-form field has no nested fields",
            "sub_form_without_fields",
        )),
        None => {}
    }
}

fn issue(path: &str, message: &str, code: &str) -> ValidationIssue {
    ValidationIssue {
        path: path.into(),
        message: message.into(),
        code: code.into(),
    }
}
