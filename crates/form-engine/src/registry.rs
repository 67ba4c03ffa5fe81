use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Field types registered by [`register_builtin_fields`].
pub const BUILTIN_FIELD_TYPES: [&str; 9] = [
    "checkbox", "date", "form", "hidden", "number", "radio", "select", "text", "textarea",
];

/// Render descriptor of a field type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldTemplate {
    /// Location of a template fetched asynchronously; wins over `template`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_url: Option<String>,
    /// Inline template markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

/// Where the markup of a [`FieldTemplate`] comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateSource<'a> {
    Remote(&'a str),
    Inline(&'a str),
}

impl FieldTemplate {
    pub fn inline(template: impl Into<String>) -> Self {
        Self {
            template_url: None,
            template: Some(template.into()),
        }
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            template_url: Some(url.into()),
            template: None,
        }
    }

    pub fn source(&self) -> Option<TemplateSource<'_>> {
        if let Some(url) = self.template_url.as_deref().filter(|url| !url.is_empty()) {
            return Some(TemplateSource::Remote(url));
        }
        self.template
            .as_deref()
            .filter(|template| !template.is_empty())
            .map(TemplateSource::Inline)
    }
}

/// Shared registry of field types.
///
/// Clones share the same entries, so one registry can be handed to several
/// engines and updated from the host.
#[derive(Debug, Clone, Default)]
pub struct FieldTypeRegistry {
    entries: Arc<RwLock<BTreeMap<String, FieldTemplate>>>,
}

impl FieldTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in field types.
    pub fn with_builtin_fields() -> Self {
        let registry = Self::new();
        register_builtin_fields(&registry);
        registry
    }

    /// Adds or replaces a field type; the last registration wins.
    pub fn register(&self, name: impl Into<String>, template: FieldTemplate) {
        let name = name.into();
        debug!(field_type = %name, "registering field type");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, template);
    }

    pub fn unregister(&self, name: &str) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_some() {
            debug!(field_type = %name, "unregistered field type");
        }
    }

    pub fn get(&self, name: &str) -> Option<FieldTemplate> {
        if name.is_empty() {
            return None;
        }
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Snapshot of every registered type; changing it does not affect the
    /// registry.
    pub fn list(&self) -> BTreeMap<String, FieldTemplate> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Registers the built-in field types, each pointing at
/// `fields/<name>.tpl.html`. Hosts call this once at startup.
pub fn register_builtin_fields(registry: &FieldTypeRegistry) {
    for name in BUILTIN_FIELD_TYPES {
        registry.register(name, FieldTemplate::remote(format!("fields/{name}.tpl.html")));
    }
}
