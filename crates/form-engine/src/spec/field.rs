use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::form::FieldSet;

/// One field descriptor of a form schema.
///
/// Keys the engine does not interpret are kept in `extra` so expressions can
/// still reach them through the context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    /// Model binding key, unique within the owning form.
    #[serde(default)]
    pub name: String,
    /// Registered field type used to pick the render descriptor.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_text: Option<String>,
    /// Raw options: a list of strings, a list of `{value, label}` objects or a
    /// value to label mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Value template; `{{ expression }}` segments are interpolated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
    /// Property overrides applied to the mounted template instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
    /// Nested fields of a sub-form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldSet>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// The declared type, treating an empty string as no type.
    pub fn field_type(&self) -> Option<&str> {
        self.kind.as_deref().filter(|kind| !kind.is_empty())
    }

    /// Expression source for a dynamic property, if one is set and non-empty.
    pub fn expression(&self, property: DynamicProperty) -> Option<&str> {
        let source = match property {
            DynamicProperty::Visible => &self.visible,
            DynamicProperty::Required => &self.required,
            DynamicProperty::Disabled => &self.disabled,
        };
        source.as_deref().filter(|source| !source.trim().is_empty())
    }

    /// Descriptor as a JSON object, the shape expressions see.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}

/// Boolean field state computed from an optional expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicProperty {
    Visible,
    Required,
    Disabled,
}

impl DynamicProperty {
    pub const ALL: [DynamicProperty; 3] = [
        DynamicProperty::Visible,
        DynamicProperty::Required,
        DynamicProperty::Disabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicProperty::Visible => "visible",
            DynamicProperty::Required => "required",
            DynamicProperty::Disabled => "disabled",
        }
    }

    /// Value used when the field carries no expression for the property.
    pub fn default_value(&self) -> bool {
        matches!(self, DynamicProperty::Visible)
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            DynamicProperty::Visible => 0,
            DynamicProperty::Required => 1,
            DynamicProperty::Disabled => 2,
        }
    }
}

impl std::fmt::Display for DynamicProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_authoring_format() {
        let field: Field = serde_json::from_value(json!({
            "name": "email",
            "type": "text",
            "helpText": "We never share it",
            "required": "newsletter.value === true",
            "placeholder": "you@example.com"
        }))
        .expect("field");

        assert_eq!(field.field_type(), Some("text"));
        assert_eq!(field.help_text.as_deref(), Some("We never share it"));
        assert_eq!(
            field.expression(DynamicProperty::Required),
            Some("newsletter.value === true")
        );
        assert_eq!(field.expression(DynamicProperty::Visible), None);
        assert_eq!(field.extra["placeholder"], "you@example.com");
        assert_eq!(field.to_value()["placeholder"], "you@example.com");
    }

    #[test]
    fn empty_type_and_expression_are_ignored() {
        let mut field = Field::new("x", "");
        field.visible = Some("  ".into());
        assert_eq!(field.field_type(), None);
        assert_eq!(field.expression(DynamicProperty::Visible), None);
    }
}
