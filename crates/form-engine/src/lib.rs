#![allow(missing_docs)]

pub mod context;
pub mod engine;
pub mod error;
pub mod expr;
pub mod fetch;
pub mod interpolate;
pub mod options;
pub mod path;
mod properties;
pub mod registry;
pub mod render;
pub mod resolver;
mod scope;
pub mod spec;
pub mod template;
pub mod validate;

pub use context::build_context;
pub use engine::{EngineOptions, FieldView, FormEngine, FormEngineBuilder, ScopeView};
pub use error::FormError;
pub use expr::{CompiledExpr, DefaultEvaluator, Evaluator, ExprError};
pub use fetch::{CachingFetcher, FetchError, StaticFetcher, TemplateFetcher};
pub use interpolate::Interpolation;
pub use options::{OptionsInput, normalize as normalize_options};
pub use path::FieldPath;
pub use registry::{
    BUILTIN_FIELD_TYPES, FieldTemplate, FieldTypeRegistry, TemplateSource, register_builtin_fields,
};
pub use render::{
    RenderField, RenderMount, RenderPayload, build_render_payload, render_html, render_json_ui,
    render_text,
};
pub use resolver::{FetchRequest, InstanceId, MountEvent, MountState, MountedInstance};
pub use spec::{DynamicProperty, Field, FieldSet, Form};
pub use template::{TemplateEngine, register_default_helpers};
pub use validate::{ValidationIssue, ValidationResult, validate};
