use handlebars::html_escape;
use serde_json::{Map, Value, json};

use crate::engine::{FieldView, FormEngine, ScopeView};
use crate::error::FormError;
use crate::interpolate::stringify;
use crate::path::FieldPath;
use crate::resolver::MountState;
use crate::spec::DynamicProperty;
use crate::template::TemplateEngine;

/// Mount state labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMount {
    Unmounted,
    Pending,
    Mounted,
}

impl RenderMount {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderMount::Unmounted => "unmounted",
            RenderMount::Pending => "pending",
            RenderMount::Mounted => "mounted",
        }
    }
}

/// Describes a single field instance for render outputs.
#[derive(Debug, Clone)]
pub struct RenderField {
    pub name: String,
    pub path: FieldPath,
    pub label: Option<String>,
    pub help_text: Option<String>,
    pub field_type: Option<String>,
    pub visible: bool,
    pub required: bool,
    /// Field expression, or the whole form being disabled.
    pub disabled: bool,
    pub value: Value,
    pub derived_value: Option<Value>,
    pub options: Option<Vec<Value>>,
    pub mount: RenderMount,
    /// Rendered template markup of a mounted field.
    pub markup: Option<String>,
    pub sub_form: Option<Vec<RenderField>>,
}

/// Collected payload used by the text, JSON and HTML renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub disabled: bool,
    pub fields: Vec<RenderField>,
}

/// Evaluates every field of a digested engine and renders mounted templates.
pub fn build_render_payload(
    engine: &FormEngine,
    templates: &TemplateEngine,
) -> Result<RenderPayload, FormError> {
    let disabled = engine.is_disabled();
    Ok(RenderPayload {
        title: engine.form().title.clone(),
        description: engine.form().description.clone(),
        disabled,
        fields: build_fields(engine.root(), templates, disabled)?,
    })
}

fn build_fields(
    scope: ScopeView<'_>,
    templates: &TemplateEngine,
    form_disabled: bool,
) -> Result<Vec<RenderField>, FormError> {
    scope
        .fields()
        .map(|field| build_field(field, templates, form_disabled))
        .collect()
}

fn build_field(
    view: FieldView<'_>,
    templates: &TemplateEngine,
    form_disabled: bool,
) -> Result<RenderField, FormError> {
    let path = view.path();
    let flag = |property: DynamicProperty| {
        view.property(property)
            .map_err(|source| FormError::Expression {
                path: path.clone(),
                property: property.as_str(),
                source,
            })
    };
    let visible = flag(DynamicProperty::Visible)?;
    let required = flag(DynamicProperty::Required)?;
    let disabled = form_disabled || flag(DynamicProperty::Disabled)?;

    let sub_form = view
        .sub_form()
        .map(|scope| build_fields(scope, templates, form_disabled))
        .transpose()?;

    let descriptor = view.descriptor();
    let mut field = RenderField {
        name: view.name().to_string(),
        path: path.clone(),
        label: descriptor.label.clone(),
        help_text: descriptor.help_text.clone(),
        field_type: descriptor.field_type().map(str::to_string),
        visible,
        required,
        disabled,
        value: view.value().clone(),
        derived_value: view.derived_value().cloned(),
        options: view.options().map(<[Value]>::to_vec),
        mount: RenderMount::Unmounted,
        markup: None,
        sub_form,
    };

    match view.mount() {
        MountState::Unmounted => {}
        MountState::Pending { .. } => field.mount = RenderMount::Pending,
        MountState::Mounted(instance) => {
            let mut data = template_data(&field);
            data.insert("field".into(), descriptor.to_value());
            data.insert(
                "properties".into(),
                Value::Object(instance.properties.clone()),
            );
            let markup = templates
                .render(&instance.template, &Value::Object(data))
                .map_err(|source| FormError::Template { path, source })?;
            field.mount = RenderMount::Mounted;
            field.markup = Some(markup);
        }
    }
    Ok(field)
}

/// Data a field template renders with. `value` is the derived value when
/// the field interpolates one.
fn template_data(field: &RenderField) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("name".into(), Value::String(field.name.clone()));
    data.insert("path".into(), Value::String(field.path.to_string()));
    data.insert("label".into(), json!(field.label));
    data.insert("helpText".into(), json!(field.help_text));
    data.insert("type".into(), json!(field.field_type));
    data.insert("visible".into(), Value::Bool(field.visible));
    data.insert("required".into(), Value::Bool(field.required));
    data.insert("disabled".into(), Value::Bool(field.disabled));
    data.insert(
        "value".into(),
        field
            .derived_value
            .clone()
            .unwrap_or_else(|| field.value.clone()),
    );
    data.insert("options".into(), json!(field.options));
    if let Some(children) = &field.sub_form {
        data.insert("sub_form".into(), Value::String(fields_html(children)));
    }
    data
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    json!({
        "title": payload.title,
        "description": payload.description,
        "disabled": payload.disabled,
        "fields": fields_json(&payload.fields),
    })
}

fn fields_json(fields: &[RenderField]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|field| {
                let mut map = Map::new();
                map.insert("name".into(), Value::String(field.name.clone()));
                map.insert("path".into(), Value::String(field.path.to_string()));
                map.insert("type".into(), json!(field.field_type));
                if let Some(label) = &field.label {
                    map.insert("label".into(), Value::String(label.clone()));
                }
                if let Some(help_text) = &field.help_text {
                    map.insert("help_text".into(), Value::String(help_text.clone()));
                }
                map.insert("visible".into(), Value::Bool(field.visible));
                map.insert("required".into(), Value::Bool(field.required));
                map.insert("disabled".into(), Value::Bool(field.disabled));
                map.insert("value".into(), field.value.clone());
                if let Some(derived) = &field.derived_value {
                    map.insert("derived_value".into(), derived.clone());
                }
                if let Some(options) = &field.options {
                    map.insert("options".into(), Value::Array(options.clone()));
                }
                map.insert("mount".into(), Value::String(field.mount.as_str().into()));
                if let Some(markup) = &field.markup {
                    map.insert("markup".into(), Value::String(markup.clone()));
                }
                if let Some(children) = &field.sub_form {
                    map.insert("fields".into(), fields_json(children));
                }
                Value::Object(map)
            })
            .collect(),
    )
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Form: {}",
        payload.title.as_deref().unwrap_or("(untitled)")
    ));
    if let Some(description) = &payload.description {
        lines.push(format!("Description: {}", description));
    }
    if payload.disabled {
        lines.push("Disabled: yes".to_string());
    }
    lines.push("Fields:".to_string());
    push_text_fields(&mut lines, &payload.fields, 1);
    lines.join("\n")
}

fn push_text_fields(lines: &mut Vec<String>, fields: &[RenderField], depth: usize) {
    let indent = "  ".repeat(depth - 1);
    for field in fields {
        let mut entry = format!(
            "{} - {} ({})",
            indent,
            field.label.as_deref().unwrap_or(&field.name),
            field.field_type.as_deref().unwrap_or("untyped")
        );
        if field.required {
            entry.push_str(" [required]");
        }
        if field.disabled {
            entry.push_str(" [disabled]");
        }
        if !field.visible {
            entry.push_str(" [hidden]");
        }
        if field.mount != RenderMount::Mounted {
            entry.push_str(&format!(" [{}]", field.mount.as_str()));
        }
        let shown = field.derived_value.as_ref().unwrap_or(&field.value);
        if !shown.is_null() {
            entry.push_str(&format!(" = {}", stringify(shown)));
        }
        lines.push(entry);
        if let Some(children) = &field.sub_form {
            push_text_fields(lines, children, depth + 1);
        }
    }
}

/// Render the payload as an HTML form: one wrapper per field holding its
/// mounted markup, hidden fields carry the `hidden` attribute.
pub fn render_html(payload: &RenderPayload) -> String {
    let mut html = String::from("<form class=\"dz-form\">");
    if let Some(title) = &payload.title {
        html.push_str(&format!("<h1>{}</h1>", html_escape(title)));
    }
    if let Some(description) = &payload.description {
        html.push_str(&format!("<p>{}</p>", html_escape(description)));
    }
    let fields = fields_html(&payload.fields);
    if payload.disabled {
        html.push_str(&format!("<fieldset disabled>{fields}</fieldset>"));
    } else {
        html.push_str(&fields);
    }
    html.push_str("</form>");
    html
}

fn fields_html(fields: &[RenderField]) -> String {
    fields
        .iter()
        .map(|field| {
            format!(
                "<div class=\"dz-field\" data-field=\"{}\"{}>{}</div>",
                html_escape(&field.name),
                if field.visible { "" } else { " hidden" },
                field.markup.as_deref().unwrap_or_default()
            )
        })
        .collect()
}
