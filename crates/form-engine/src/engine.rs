use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::FormError;
use crate::expr::{DefaultEvaluator, Evaluator, ExprError};
use crate::fetch::{FetchError, TemplateFetcher};
use crate::path::FieldPath;
use crate::registry::FieldTypeRegistry;
use crate::resolver::{FetchRequest, MountEvent, MountLog, MountState, MountedInstance};
use crate::scope::{DigestCx, FieldInstance, Scope};
use crate::spec::{DynamicProperty, Field, FieldSet, Form};

static NULL: Value = Value::Null;

/// Engine tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineOptions {
    /// Passes a digest may take before the form is reported as unstable.
    pub max_digest_passes: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_digest_passes: 10,
        }
    }
}

pub struct FormEngineBuilder {
    form: Form,
    model: Option<Value>,
    registry: FieldTypeRegistry,
    evaluator: Arc<dyn Evaluator>,
    options: EngineOptions,
}

impl FormEngineBuilder {
    pub fn model(mut self, model: Value) -> Self {
        self.model = Some(model);
        self
    }

    pub fn registry(mut self, registry: FieldTypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn evaluator(mut self, evaluator: impl Evaluator + 'static) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Fails with [`FormError::MissingModel`] when no model was supplied.
    pub fn build(self) -> Result<FormEngine, FormError> {
        let model = self.model.ok_or(FormError::MissingModel)?;
        Ok(FormEngine {
            form: self.form,
            model,
            registry: self.registry,
            evaluator: self.evaluator,
            options: self.options,
            disabled: false,
            root: Scope::new(FieldPath::root(), Some(FieldPath::root())),
            log: MountLog::default(),
        })
    }
}

/// A form bound to a model.
///
/// The host mutates the form, the model or the registry, then calls
/// [`FormEngine::digest`] to bring contexts, field state and mounted
/// templates up to date.
#[derive(Debug)]
pub struct FormEngine {
    form: Form,
    model: Value,
    registry: FieldTypeRegistry,
    evaluator: Arc<dyn Evaluator>,
    options: EngineOptions,
    disabled: bool,
    root: Scope,
    log: MountLog,
}

impl FormEngine {
    /// Starts a builder with an empty registry and the default evaluator.
    pub fn builder(form: Form) -> FormEngineBuilder {
        FormEngineBuilder {
            form,
            model: None,
            registry: FieldTypeRegistry::new(),
            evaluator: Arc::new(DefaultEvaluator),
            options: EngineOptions::default(),
        }
    }

    pub fn form(&self) -> &Form {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Form {
        &mut self.form
    }

    pub fn model(&self) -> &Value {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Value {
        &mut self.model
    }

    pub fn registry(&self) -> &FieldTypeRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &dyn Evaluator {
        self.evaluator.as_ref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Disables every field of the form at once.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Writes a model value for the field at `path`, creating nothing but the
    /// final key.
    pub fn set_value(&mut self, path: &[&str], value: Value) -> Result<(), FormError> {
        let Some((name, parents)) = path.split_last() else {
            return Err(FormError::UnknownField(FieldPath::root()));
        };
        let mut target = &mut self.model;
        for (depth, segment) in parents.iter().enumerate() {
            target = target
                .get_mut(*segment)
                .ok_or_else(|| FormError::ModelNotObject(FieldPath::from(&path[..=depth])))?;
        }
        if target.is_null() {
            *target = Value::Object(Map::new());
        }
        match target {
            Value::Object(map) => {
                map.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(FormError::ModelNotObject(FieldPath::from(parents))),
        }
    }

    /// Recomputes every scope until a pass observes no change.
    pub fn digest(&mut self) -> Result<(), FormError> {
        let root_value = self.form.to_value();
        for pass in 1..=self.options.max_digest_passes {
            let mut cx = DigestCx {
                registry: &self.registry,
                evaluator: self.evaluator.as_ref(),
                root: &root_value,
                log: &mut self.log,
            };
            let dirty =
                self.root
                    .digest(&self.form.fields, &root_value, None, &mut self.model, &mut cx)?;
            trace!(pass, dirty, "digest pass");
            if !dirty {
                return Ok(());
            }
        }
        Err(FormError::Unstable {
            passes: self.options.max_digest_passes,
        })
    }

    /// Remote templates requested since the last call.
    pub fn take_fetch_requests(&mut self) -> Vec<FetchRequest> {
        self.log.take_requests()
    }

    /// Mount and unmount events recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<MountEvent> {
        self.log.take_events()
    }

    /// Hands a fetched template to the field that requested it. Returns false
    /// when the request is stale: the field is gone, was resolved again, or
    /// changed type meanwhile. Call [`FormEngine::digest`] afterwards.
    pub fn complete_fetch(
        &mut self,
        request: &FetchRequest,
        result: Result<String, FetchError>,
    ) -> bool {
        let segments: Vec<&str> = request.path.segments().iter().map(String::as_str).collect();
        let (Some(field), Some(instance)) = (
            self.form.field_at(&segments),
            self.root.find_mut(request.path.segments()),
        ) else {
            debug!(path = %request.path, "dropping template fetch for a removed field");
            return false;
        };
        instance.resolver.complete(field, request, result, &mut self.log)
    }

    /// Digests, fetches every requested template, and repeats until nothing
    /// is left to fetch.
    pub async fn settle(&mut self, fetcher: &dyn TemplateFetcher) -> Result<(), FormError> {
        loop {
            self.digest()?;
            let requests = self.take_fetch_requests();
            if requests.is_empty() {
                return Ok(());
            }
            let results = join_all(requests.iter().map(|request| fetcher.fetch(&request.url))).await;
            for (request, result) in requests.iter().zip(results) {
                self.complete_fetch(request, result);
            }
        }
    }

    /// Context of the top-level scope.
    pub fn context(&self) -> &Value {
        &self.root.context
    }

    pub fn root(&self) -> ScopeView<'_> {
        ScopeView {
            scope: &self.root,
            fields: &self.form.fields,
            evaluator: self.evaluator.as_ref(),
        }
    }

    /// Field instance at `path`, walking through sub-forms.
    pub fn field(&self, path: &[&str]) -> Option<FieldView<'_>> {
        let (last, parents) = path.split_last()?;
        let mut scope = self.root();
        for name in parents {
            scope = scope.field(name)?.sub_form()?;
        }
        scope.field(last)
    }
}

/// Read access to one scope (form or sub-form).
#[derive(Debug, Clone, Copy)]
pub struct ScopeView<'a> {
    scope: &'a Scope,
    fields: &'a FieldSet,
    evaluator: &'a dyn Evaluator,
}

impl<'a> ScopeView<'a> {
    pub fn path(&self) -> &'a FieldPath {
        &self.scope.path
    }

    /// Where this scope's model lives in the root model, if it has one.
    pub fn model_path(&self) -> Option<&'a FieldPath> {
        self.scope.model_path.as_ref()
    }

    pub fn context(&self) -> &'a Value {
        &self.scope.context
    }

    pub fn field(&self, name: &str) -> Option<FieldView<'a>> {
        let field = self.fields.get(name)?;
        let instance = self.scope.instance(name)?;
        Some(self.view(field, instance))
    }

    /// Field instances in field order. Fields added since the last digest are
    /// skipped.
    pub fn fields(self) -> impl Iterator<Item = FieldView<'a>> {
        self.fields.iter().filter_map(move |field| {
            let instance = self.scope.instance(&field.name)?;
            Some(self.view(field, instance))
        })
    }

    fn view(&self, field: &'a Field, instance: &'a FieldInstance) -> FieldView<'a> {
        FieldView {
            field,
            instance,
            scope: self.scope,
            evaluator: self.evaluator,
        }
    }
}

/// What the render layer binds to for one field instance.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    field: &'a Field,
    instance: &'a FieldInstance,
    scope: &'a Scope,
    evaluator: &'a dyn Evaluator,
}

impl<'a> FieldView<'a> {
    pub fn name(&self) -> &'a str {
        &self.field.name
    }

    pub fn path(&self) -> FieldPath {
        self.scope.path.child(&self.field.name)
    }

    pub fn descriptor(&self) -> &'a Field {
        self.field
    }

    /// Evaluates a dynamic property against the current context.
    pub fn property(&self, property: DynamicProperty) -> Result<bool, ExprError> {
        self.instance
            .properties
            .evaluate(property, &self.scope.eval_context, &self.instance.locals)
    }

    pub fn visible(&self) -> Result<bool, ExprError> {
        self.property(DynamicProperty::Visible)
    }

    pub fn required(&self) -> Result<bool, ExprError> {
        self.property(DynamicProperty::Required)
    }

    pub fn disabled(&self) -> Result<bool, ExprError> {
        self.property(DynamicProperty::Disabled)
    }

    /// Canonical `{value, label}` options.
    pub fn options(&self) -> Option<&'a [Value]> {
        self.instance.options.normalized()
    }

    /// Context of the scope owning this field.
    pub fn context(&self) -> &'a Value {
        &self.scope.context
    }

    /// Current model value of the field.
    pub fn value(&self) -> &'a Value {
        self.scope
            .context
            .get(&self.field.name)
            .and_then(|entry| entry.get("value"))
            .unwrap_or(&NULL)
    }

    /// Result of interpolating the field's `value` template.
    pub fn derived_value(&self) -> Option<&'a Value> {
        self.instance.value.derived()
    }

    pub fn mount(&self) -> &'a MountState {
        self.instance.resolver.state()
    }

    pub fn mounted(&self) -> Option<&'a MountedInstance> {
        match self.instance.resolver.state() {
            MountState::Mounted(instance) => Some(instance),
            _ => None,
        }
    }

    /// Nested scope when the field is a mounted sub-form.
    pub fn sub_form(&self) -> Option<ScopeView<'a>> {
        Some(ScopeView {
            scope: self.instance.sub_form.as_deref()?,
            fields: self.field.fields.as_ref()?,
            evaluator: self.evaluator,
        })
    }

    /// Evaluates an ad-hoc expression in this field's context.
    pub fn evaluate(&self, source: &str) -> Result<Value, ExprError> {
        self.evaluator
            .evaluate(source, &self.scope.eval_context, &self.instance.locals)
    }
}
