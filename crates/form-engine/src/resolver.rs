use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::fetch::FetchError;
use crate::path::FieldPath;
use crate::registry::{FieldTemplate, FieldTypeRegistry, TemplateSource};
use crate::spec::Field;

/// Identifier of one mounted template instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct InstanceId(u64);

impl InstanceId {
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// A template instantiated for a field.
#[derive(Debug, Clone, PartialEq)]
pub struct MountedInstance {
    pub id: InstanceId,
    pub field_type: String,
    /// Template markup the instance was created from.
    pub template: String,
    /// Property overrides applied at mount time.
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MountState {
    Unmounted,
    /// Waiting for a remote template.
    Pending { field_type: String, url: String },
    Mounted(MountedInstance),
}

/// Remote template the host has to fetch for a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub path: FieldPath,
    pub field_type: String,
    pub url: String,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MountEvent {
    Mounted {
        path: FieldPath,
        id: InstanceId,
        field_type: String,
    },
    Unmounted {
        path: FieldPath,
        id: InstanceId,
        field_type: String,
    },
}

/// Mount bookkeeping shared by every resolver of an engine.
#[derive(Debug, Default)]
pub(crate) struct MountLog {
    next_id: u64,
    next_generation: u64,
    events: Vec<MountEvent>,
    requests: Vec<FetchRequest>,
}

impl MountLog {
    pub(crate) fn take_events(&mut self) -> Vec<MountEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn take_requests(&mut self) -> Vec<FetchRequest> {
        std::mem::take(&mut self.requests)
    }

    fn next_id(&mut self) -> InstanceId {
        self.next_id += 1;
        InstanceId(self.next_id)
    }

    /// Generations are unique across the engine, so a recreated resolver
    /// never reuses the stamp of a request issued by its predecessor.
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

/// Drives the mounted template of one field instance.
#[derive(Debug)]
pub(crate) struct FieldResolver {
    watched: Option<(Option<String>, Option<FieldTemplate>)>,
    state: MountState,
    generation: u64,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self {
            watched: None,
            state: MountState::Unmounted,
            generation: 0,
        }
    }
}

impl FieldResolver {
    pub(crate) fn state(&self) -> &MountState {
        &self.state
    }

    pub(crate) fn is_mounted(&self) -> bool {
        matches!(self.state, MountState::Mounted(_))
    }

    /// Resolves again when the field type or its registry entry changed since
    /// the last call. Both changing at once still resolves a single time.
    pub(crate) fn observe(
        &mut self,
        field: &Field,
        path: &FieldPath,
        registry: &FieldTypeRegistry,
        log: &mut MountLog,
    ) -> bool {
        let field_type = field.field_type().map(str::to_string);
        let entry = field_type.as_deref().and_then(|kind| registry.get(kind));
        let current = (field_type, entry);
        if self.watched.as_ref() == Some(&current) {
            return false;
        }
        let (field_type, entry) = current.clone();
        self.watched = Some(current);
        self.resolve(field, path, field_type, entry, log);
        true
    }

    fn resolve(
        &mut self,
        field: &Field,
        path: &FieldPath,
        field_type: Option<String>,
        entry: Option<FieldTemplate>,
        log: &mut MountLog,
    ) {
        self.unmount(path, log);
        self.generation = log.next_generation();

        let Some(field_type) = field_type else {
            return;
        };
        let Some(entry) = entry else {
            debug!(%path, %field_type, "field type is not registered");
            return;
        };
        match entry.source() {
            Some(TemplateSource::Remote(url)) => {
                debug!(%path, %field_type, url, "requesting remote template");
                log.requests.push(FetchRequest {
                    path: path.clone(),
                    field_type: field_type.clone(),
                    url: url.to_string(),
                    generation: self.generation,
                });
                self.state = MountState::Pending {
                    field_type,
                    url: url.to_string(),
                };
            }
            Some(TemplateSource::Inline(template)) => {
                let template = template.to_string();
                self.mount(field, path, field_type, template, log);
            }
            None => debug!(%path, %field_type, "field type has no template"),
        }
    }

    /// Delivers a fetched template. Results for a superseded resolution, or
    /// for a type the field no longer has, are dropped. Returns true when the
    /// result was applied.
    pub(crate) fn complete(
        &mut self,
        field: &Field,
        request: &FetchRequest,
        result: Result<String, FetchError>,
        log: &mut MountLog,
    ) -> bool {
        let awaiting = matches!(
            &self.state,
            MountState::Pending { url, .. } if *url == request.url
        ) && self.generation == request.generation
            && field.field_type() == Some(request.field_type.as_str());
        if !awaiting {
            debug!(
                path = %request.path,
                field_type = %request.field_type,
                "discarding stale template fetch"
            );
            return false;
        }
        match result {
            Ok(template) => {
                self.mount(
                    field,
                    &request.path,
                    request.field_type.clone(),
                    template,
                    log,
                );
            }
            Err(err) => {
                warn!(path = %request.path, url = %request.url, error = %err, "template fetch failed");
                self.state = MountState::Unmounted;
            }
        }
        true
    }

    fn mount(
        &mut self,
        field: &Field,
        path: &FieldPath,
        field_type: String,
        template: String,
        log: &mut MountLog,
    ) {
        let mut properties = Map::new();
        for (key, value) in field.properties.iter().flatten() {
            properties.insert(key.clone(), value.clone());
        }
        let id = log.next_id();
        debug!(%path, %field_type, id = id.get(), "mounting field template");
        log.events.push(MountEvent::Mounted {
            path: path.clone(),
            id,
            field_type: field_type.clone(),
        });
        self.state = MountState::Mounted(MountedInstance {
            id,
            field_type,
            template,
            properties,
        });
    }

    fn unmount(&mut self, path: &FieldPath, log: &mut MountLog) {
        if let MountState::Mounted(instance) =
            std::mem::replace(&mut self.state, MountState::Unmounted)
        {
            debug!(%path, field_type = %instance.field_type, id = instance.id.get(), "unmounting field template");
            log.events.push(MountEvent::Unmounted {
                path: path.clone(),
                id: instance.id,
                field_type: instance.field_type,
            });
        }
    }

    /// Tears the instance down when its field leaves the form.
    pub(crate) fn dispose(&mut self, path: &FieldPath, log: &mut MountLog) {
        self.unmount(path, log);
        self.generation = log.next_generation();
        self.watched = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> FieldTypeRegistry {
        let registry = FieldTypeRegistry::new();
        registry.register("text", FieldTemplate::inline("<input type=\"text\">"));
        registry.register("number", FieldTemplate::inline("<input type=\"number\">"));
        registry
    }

    #[test]
    fn missing_type_stays_unmounted() {
        let mut resolver = FieldResolver::default();
        let mut log = MountLog::default();
        let field = Field {
            name: "x".into(),
            ..Field::default()
        };
        resolver.observe(&field, &FieldPath::from(["x"]), &registry(), &mut log);
        assert_eq!(resolver.state(), &MountState::Unmounted);
        assert!(log.take_events().is_empty());
    }

    #[test]
    fn properties_are_applied_in_order() {
        let mut resolver = FieldResolver::default();
        let mut log = MountLog::default();
        let mut field = Field::new("x", "text");
        let mut properties = Map::new();
        properties.insert("placeholder".into(), Value::from("Type here"));
        properties.insert("maxLength".into(), Value::from(12));
        field.properties = Some(properties.clone());

        resolver.observe(&field, &FieldPath::from(["x"]), &registry(), &mut log);
        match resolver.state() {
            MountState::Mounted(instance) => assert_eq!(instance.properties, properties),
            other => panic!("expected a mounted instance, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_inputs_do_not_remount() {
        let registry = registry();
        let mut resolver = FieldResolver::default();
        let mut log = MountLog::default();
        let field = Field::new("x", "text");
        let path = FieldPath::from(["x"]);

        assert!(resolver.observe(&field, &path, &registry, &mut log));
        assert!(!resolver.observe(&field, &path, &registry, &mut log));
        assert_eq!(log.take_events().len(), 1);
    }

    #[test]
    fn fetch_failure_leaves_field_unmounted() {
        let registry = FieldTypeRegistry::new();
        registry.register("remote", FieldTemplate::remote("remote.tpl.html"));
        let mut resolver = FieldResolver::default();
        let mut log = MountLog::default();
        let field = Field::new("x", "remote");

        resolver.observe(&field, &FieldPath::from(["x"]), &registry, &mut log);
        let request = log.take_requests().pop().expect("fetch request");
        assert!(matches!(resolver.state(), MountState::Pending { .. }));

        let applied = resolver.complete(
            &field,
            &request,
            Err(FetchError::NotFound("remote.tpl.html".into())),
            &mut log,
        );
        assert!(applied);
        assert_eq!(resolver.state(), &MountState::Unmounted);
        assert!(log.take_events().is_empty());
    }

    #[test]
    fn recreated_resolvers_ignore_requests_of_their_predecessor() {
        let registry = FieldTypeRegistry::new();
        registry.register("remote", FieldTemplate::remote("old.tpl.html"));
        let mut log = MountLog::default();
        let field = Field::new("x", "remote");
        let path = FieldPath::from(["x"]);

        let mut first = FieldResolver::default();
        first.observe(&field, &path, &registry, &mut log);
        let stale = log.take_requests().pop().expect("old request");
        first.dispose(&path, &mut log);

        registry.register("remote", FieldTemplate::remote("new.tpl.html"));
        let mut second = FieldResolver::default();
        second.observe(&field, &path, &registry, &mut log);
        let fresh = log.take_requests().pop().expect("new request");

        assert_ne!(stale, fresh);
        assert!(!second.complete(&field, &stale, Ok("<old>".into()), &mut log));
        assert!(second.complete(&field, &fresh, Ok("<new>".into()), &mut log));
        match second.state() {
            MountState::Mounted(instance) => assert_eq!(instance.template, "<new>"),
            other => panic!("expected a mounted instance, got {other:?}"),
        }
    }
}
