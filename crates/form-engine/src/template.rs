use handlebars::{Handlebars, RenderError, handlebars_helper};
use serde::Serialize;

use crate::interpolate::stringify;

handlebars_helper!(json: |value: Json| value.to_string());
handlebars_helper!(text: |value: Json| stringify(value));

/// Registers the helpers field templates rely on: `json` (compact JSON) and
/// `text` (interpolation text form, `null` renders empty).
pub fn register_default_helpers(handlebars: &mut Handlebars<'_>) {
    handlebars.register_helper("json", Box::new(json));
    handlebars.register_helper("text", Box::new(text));
}

/// Renders mounted field templates.
#[derive(Debug)]
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        register_default_helpers(&mut handlebars);
        Self { handlebars }
    }

    /// Fails on references to missing data instead of rendering them empty.
    pub fn strict(mut self) -> Self {
        self.handlebars.set_strict_mode(true);
        self
    }

    pub fn render<T: Serialize>(&self, template: &str, data: &T) -> Result<String, RenderError> {
        self.handlebars.render_template(template, data)
    }
}
