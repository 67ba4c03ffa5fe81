use serde_json::{Map, Value, json};
use tracing::debug;

use crate::context::{build_context, instance_context};
use crate::error::FormError;
use crate::expr::Evaluator;
use crate::interpolate::ValueBinding;
use crate::options::OptionsState;
use crate::path::FieldPath;
use crate::properties::PropertyResolver;
use crate::registry::FieldTypeRegistry;
use crate::resolver::{FieldResolver, MountLog};
use crate::spec::{DynamicProperty, Field, FieldSet};

/// Everything a digest pass shares across scopes.
pub(crate) struct DigestCx<'a> {
    pub(crate) registry: &'a FieldTypeRegistry,
    pub(crate) evaluator: &'a dyn Evaluator,
    /// Top-level form, exposed to expressions as `$root`.
    pub(crate) root: &'a Value,
    pub(crate) log: &'a mut MountLog,
}

/// One form or sub-form: its context and the instances of its fields.
#[derive(Debug)]
pub(crate) struct Scope {
    pub(crate) path: FieldPath,
    /// Location of this scope's model inside the root model; `None` when the
    /// scope has no model to bind to.
    pub(crate) model_path: Option<FieldPath>,
    pub(crate) context: Value,
    pub(crate) eval_context: Value,
    pub(crate) instances: Vec<FieldInstance>,
}

#[derive(Debug)]
pub(crate) struct FieldInstance {
    pub(crate) name: String,
    pub(crate) locals: Value,
    pub(crate) options: OptionsState,
    pub(crate) properties: PropertyResolver,
    pub(crate) value: ValueBinding,
    pub(crate) resolver: FieldResolver,
    pub(crate) sub_form: Option<Box<Scope>>,
}

pub(crate) fn model_at<'a>(model: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(model, |value, key| value.get(key))
}

pub(crate) fn model_at_mut<'a>(model: &'a mut Value, path: &FieldPath) -> Option<&'a mut Value> {
    path.segments()
        .iter()
        .try_fold(model, |value, key| value.get_mut(key))
}

impl Scope {
    pub(crate) fn new(path: FieldPath, model_path: Option<FieldPath>) -> Self {
        Self {
            path,
            model_path,
            context: Value::Null,
            eval_context: Value::Null,
            instances: Vec::new(),
        }
    }

    /// Runs one pass over the scope: context first, then every field, then
    /// nested scopes. Returns true when anything observable changed.
    pub(crate) fn digest(
        &mut self,
        fields: &FieldSet,
        form: &Value,
        parent: Option<&Value>,
        model: &mut Value,
        cx: &mut DigestCx<'_>,
    ) -> Result<bool, FormError> {
        let scope_model = self
            .model_path
            .as_ref()
            .and_then(|path| model_at(model, path));
        let context = build_context(fields, scope_model, parent);
        let mut dirty = context != self.context;
        self.context = context;
        self.eval_context = instance_context(&self.context, form, cx.root);
        dirty |= self.reconcile(fields, cx.log);

        let Scope {
            path,
            model_path,
            context,
            eval_context,
            instances,
        } = self;
        for (field, instance) in fields.iter().zip(instances.iter_mut()) {
            let field_path = path.child(&field.name);
            dirty |= instance.digest(
                field,
                &field_path,
                model_path.as_ref(),
                context,
                eval_context,
                model,
                cx,
            )?;
        }
        Ok(dirty)
    }

    /// Lines instances up with the current fields, matching by name.
    fn reconcile(&mut self, fields: &FieldSet, log: &mut MountLog) -> bool {
        let mut previous = std::mem::take(&mut self.instances);
        let mut changed = false;
        for field in fields.iter() {
            match previous
                .iter()
                .position(|instance| instance.name == field.name)
            {
                Some(index) => self.instances.push(previous.remove(index)),
                None => {
                    changed = true;
                    self.instances.push(FieldInstance::new(&field.name));
                }
            }
        }
        for mut stale in previous {
            changed = true;
            let path = self.path.child(&stale.name);
            stale.dispose(&path, log);
        }
        changed
    }

    pub(crate) fn dispose(&mut self, log: &mut MountLog) {
        for instance in &mut self.instances {
            let path = self.path.child(&instance.name);
            instance.dispose(&path, log);
        }
        self.instances.clear();
    }

    pub(crate) fn instance(&self, name: &str) -> Option<&FieldInstance> {
        self.instances.iter().find(|instance| instance.name == name)
    }

    pub(crate) fn find_mut(&mut self, path: &[String]) -> Option<&mut FieldInstance> {
        let (first, rest) = path.split_first()?;
        let instance = self
            .instances
            .iter_mut()
            .find(|instance| &instance.name == first)?;
        if rest.is_empty() {
            return Some(instance);
        }
        instance.sub_form.as_deref_mut()?.find_mut(rest)
    }
}

impl FieldInstance {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            locals: Value::Null,
            options: OptionsState::default(),
            properties: PropertyResolver::default(),
            value: ValueBinding::default(),
            resolver: FieldResolver::default(),
            sub_form: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn digest(
        &mut self,
        field: &Field,
        path: &FieldPath,
        scope_model: Option<&FieldPath>,
        context: &Value,
        eval_context: &Value,
        model: &mut Value,
        cx: &mut DigestCx<'_>,
    ) -> Result<bool, FormError> {
        let descriptor = field.to_value();
        self.locals = json!({ "this": descriptor.clone() });

        let mut dirty = self.options.observe(field.options.as_ref());
        dirty |= self.properties.observe(field, cx.evaluator, path)?;
        for property in DynamicProperty::ALL {
            self.properties
                .evaluate(property, eval_context, &self.locals)
                .map_err(|source| FormError::Expression {
                    path: path.clone(),
                    property: property.as_str(),
                    source,
                })?;
        }
        dirty |= self
            .value
            .observe(field, cx.evaluator, eval_context, &self.locals, path)?;
        dirty |= self.resolver.observe(field, path, cx.registry, cx.log);
        dirty |= self.digest_sub_form(field, path, scope_model, context, &descriptor, model, cx)?;
        Ok(dirty)
    }

    /// Keeps the nested scope in step with the field: present while the field
    /// is mounted and carries nested fields, disposed otherwise.
    #[allow(clippy::too_many_arguments)]
    fn digest_sub_form(
        &mut self,
        field: &Field,
        path: &FieldPath,
        scope_model: Option<&FieldPath>,
        context: &Value,
        descriptor: &Value,
        model: &mut Value,
        cx: &mut DigestCx<'_>,
    ) -> Result<bool, FormError> {
        let nested = match &field.fields {
            Some(nested) if self.resolver.is_mounted() => nested,
            _ => {
                let Some(mut scope) = self.sub_form.take() else {
                    return Ok(false);
                };
                scope.dispose(cx.log);
                return Ok(true);
            }
        };

        let mut dirty = false;
        let parent_model = match scope_model {
            Some(parent) => model_at_mut(model, parent).map(|value| (parent, value)),
            None => None,
        };
        let child_model = match parent_model {
            Some((parent, Value::Object(map))) => {
                if !map.contains_key(&field.name) {
                    debug!(%path, "creating sub-form model");
                    map.insert(field.name.clone(), Value::Object(Map::new()));
                    dirty = true;
                }
                Some(parent.child(&field.name))
            }
            _ => None,
        };

        if self.sub_form.is_none() {
            dirty = true;
        }
        let scope = self
            .sub_form
            .get_or_insert_with(|| Box::new(Scope::new(path.clone(), None)));
        if scope.model_path != child_model {
            scope.model_path = child_model;
            dirty = true;
        }
        dirty |= scope.digest(nested, descriptor, Some(context), model, cx)?;
        Ok(dirty)
    }

    fn dispose(&mut self, path: &FieldPath, log: &mut MountLog) {
        self.resolver.dispose(path, log);
        if let Some(mut scope) = self.sub_form.take() {
            scope.dispose(log);
        }
    }
}
