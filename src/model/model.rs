use super::array::ArrayModel;
use super::value::{Input, Key, Value};
use super::wrap::{self, Slot};
use crate::error::{ModelError, ModelResult, UndefinedAccess};
use crate::runtime::{ChangeEvent, ContainerId, Observer, Registration, Scope, Tracker};
use crate::validation::{Errors, ValidationState, Validations};
use parking_lot::RwLock;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

/// Method scopes notified when the set of active validation rules changes.
const ERROR_VIEWS: &[&str] = &["errors", "marked_errors"];

/// The wrapped payload of a model.
enum Attributes {
    /// Absent data. `parent` is the model this one would be spliced into
    /// on first write; `origin` is set when the placeholder itself came
    /// from reading through absent data.
    Placeholder {
        parent: Option<Weak<ModelInner>>,
        origin: Option<UndefinedAccess>,
    },
    Mapping(BTreeMap<String, Slot>),
    /// A scalar (or sequence) wrapped directly by a model.
    Terminal(Value),
}

struct ModelState {
    attributes: Attributes,
    path: Option<Key>,
    // Relays from child containers, by the key they are stored under.
    relays: HashMap<String, Registration>,
    validation: ValidationState,
}

struct ModelInner {
    id: ContainerId,
    tracker: Arc<Tracker>,
    state: RwLock<ModelState>,
}

/// A reactive attribute container.
///
/// A model wraps one level of a nested data tree. Attribute reads never
/// fail: a missing key yields a placeholder child that materializes itself
/// (and every absent ancestor) on the first write through it. Every read is
/// recorded with the model's [`Tracker`] and every write emits a `changed`
/// event, so observers re-run when what they read changes.
///
/// Cloning a `Model` creates a new handle to the **same** container.
///
/// # Examples
///
/// ```
/// use attrmodel::Model;
/// use serde_json::json;
///
/// let root = Model::new(json!({}));
/// root.get("address").set("city", "Lisbon").unwrap();
///
/// assert_eq!(root.get("address").get("city").as_str(), Some("Lisbon"));
/// assert!(root.get("phone").get("mobile").is_nil());
/// ```
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Wrap `raw` in a new model with its own tracker.
    ///
    /// `null` produces a placeholder root, an object produces a mapping and
    /// anything else a terminal value.
    pub fn new(raw: impl Into<JsonValue>) -> Self {
        Self::with_tracker(raw, &Tracker::new())
    }

    /// Wrap `raw` in a new model sharing `tracker`.
    pub fn with_tracker(raw: impl Into<JsonValue>, tracker: &Arc<Tracker>) -> Self {
        let attributes = match raw.into() {
            JsonValue::Null => Attributes::Placeholder {
                parent: None,
                origin: None,
            },
            JsonValue::Object(map) => Attributes::Mapping(wrap::wrapped_slots(map, tracker)),
            other => Attributes::Terminal(wrap::wrap_json(other, tracker, None)),
        };
        let model = Self::from_parts(attributes, tracker, None);
        model.relay_wrapped_children();
        model
    }

    /// A model whose entries are wrapped on first touch.
    pub(crate) fn lazy(
        slots: BTreeMap<String, Slot>,
        tracker: &Arc<Tracker>,
        path: Option<Key>,
    ) -> Self {
        Self::from_parts(Attributes::Mapping(slots), tracker, path)
    }

    /// A placeholder child of `parent`, not yet stored in it.
    fn placeholder(parent: &Model, key: &str, origin: Option<UndefinedAccess>) -> Self {
        Self::from_parts(
            Attributes::Placeholder {
                parent: Some(Arc::downgrade(&parent.inner)),
                origin,
            },
            &parent.inner.tracker,
            Some(Key::from(key)),
        )
    }

    /// A detached placeholder standing for a failed access.
    pub(crate) fn undefined(access: UndefinedAccess, tracker: Option<&Arc<Tracker>>) -> Self {
        let tracker = tracker.cloned().unwrap_or_else(Tracker::new);
        let path = Some(Key::from(access.member()));
        Self::from_parts(
            Attributes::Placeholder {
                parent: None,
                origin: Some(access),
            },
            &tracker,
            path,
        )
    }

    fn from_parts(attributes: Attributes, tracker: &Arc<Tracker>, path: Option<Key>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                id: ContainerId::next(),
                tracker: Arc::clone(tracker),
                state: RwLock::new(ModelState {
                    attributes,
                    path,
                    relays: HashMap::new(),
                    validation: ValidationState::default(),
                }),
            }),
        }
    }

    /// Attach validation rules, builder style.
    pub fn with_validations(self, validations: Validations) -> Self {
        self.set_validations(validations);
        self
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.inner.tracker
    }

    /// The key this model lives under in its parent.
    pub fn path(&self) -> Option<Key> {
        self.inner.state.read().path.clone()
    }

    /// The model a placeholder will splice itself into.
    pub fn parent(&self) -> Option<Model> {
        match &self.inner.state.read().attributes {
            Attributes::Placeholder {
                parent: Some(parent),
                ..
            } => parent.upgrade().map(|inner| Model { inner }),
            _ => None,
        }
    }

    /// Whether both handles refer to the same container.
    pub fn ptr_eq(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_nil(&self) -> bool {
        self.track(Scope::Method("is_nil"));
        match &self.inner.state.read().attributes {
            Attributes::Placeholder { .. } => true,
            Attributes::Terminal(value) => value.is_nil(),
            Attributes::Mapping(_) => false,
        }
    }

    pub fn is_true(&self) -> bool {
        self.track(Scope::Method("is_true"));
        match &self.inner.state.read().attributes {
            Attributes::Placeholder { .. } => false,
            Attributes::Terminal(value) => value.is_true(),
            Attributes::Mapping(_) => true,
        }
    }

    pub fn is_false(&self) -> bool {
        !self.is_true()
    }

    /// The failed access this placeholder stands for, if any.
    pub fn captured_access(&self) -> Option<UndefinedAccess> {
        match &self.inner.state.read().attributes {
            Attributes::Placeholder { origin, .. } => origin.clone(),
            _ => None,
        }
    }

    /// Read an attribute.
    ///
    /// Returns the stored value, or a placeholder child when the key is
    /// missing. On a placeholder the child additionally carries the
    /// captured access, which [`Value::force`] turns into an error.
    pub fn get(&self, key: &str) -> Value {
        self.track(Scope::attribute(key));
        self.read_attribute(key)
    }

    fn read_attribute(&self, key: &str) -> Value {
        {
            let state = self.inner.state.read();
            match &state.attributes {
                Attributes::Placeholder { .. } => {
                    let origin = UndefinedAccess::new(key, describe(&state));
                    return Value::Model(Model::placeholder(self, key, Some(origin)));
                }
                Attributes::Terminal(_) => {
                    let origin = UndefinedAccess::new(key, describe(&state));
                    return Value::Model(Model::undefined(origin, Some(&self.inner.tracker)));
                }
                Attributes::Mapping(map) => match map.get(key) {
                    Some(Slot::Wrapped(value)) => return value.clone(),
                    Some(Slot::Raw(_)) => {}
                    None => return Value::Model(Model::placeholder(self, key, None)),
                },
            }
        }
        self.wrap_raw_slot(key)
    }

    /// Wrap a raw entry on first touch and start relaying its changes.
    fn wrap_raw_slot(&self, key: &str) -> Value {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        let Attributes::Mapping(map) = &mut state.attributes else {
            return Value::Null;
        };
        let value = match map.get_mut(key) {
            Some(Slot::Raw(json)) => {
                wrap::wrap_json(json.take(), &self.inner.tracker, Some(Key::from(key)))
            }
            Some(Slot::Wrapped(value)) => return value.clone(),
            None => return Value::Model(Model::placeholder(self, key, None)),
        };
        map.insert(key.to_string(), Slot::Wrapped(value.clone()));
        if let Some(relay) = self.relay_for(key, &value) {
            state.relays.insert(key.to_string(), relay);
        }
        tracing::trace!(model = %self.id(), key, "wrapped raw attribute");
        value
    }

    /// Assign an attribute, materializing this model first if needed.
    ///
    /// The value is wrapped, replaces any previous value (and its change
    /// relay), and a `changed` event is emitted for `key`.
    pub fn set(&self, key: &str, value: impl Into<Input>) -> ModelResult<()> {
        self.expand()?;
        let value = wrap::wrap_input(value.into(), &self.inner.tracker, Some(Key::from(key)));
        if value.contains_container(self.id()) {
            return Err(ModelError::Cycle {
                path: format!("{}.{key}", self.path_label()),
            });
        }
        tracing::debug!(model = %self.id(), key, "assign attribute");
        self.store(key, value)
    }

    fn store(&self, key: &str, value: Value) -> ModelResult<()> {
        let relay = self.relay_for(key, &value);
        let previous = {
            let mut guard = self.inner.state.write();
            let state = &mut *guard;
            let Attributes::Mapping(map) = &mut state.attributes else {
                return Err(shape_error(state, key));
            };
            map.insert(key.to_string(), Slot::Wrapped(value));
            match relay {
                Some(relay) => state.relays.insert(key.to_string(), relay),
                None => state.relays.remove(key),
            }
        };
        drop(previous);
        self.emit(&ChangeEvent::attribute(key));
        Ok(())
    }

    /// Remove an attribute, returning the value it held.
    ///
    /// A `changed` event is emitted for `key` whether or not it was present.
    pub fn delete(&self, key: &str) -> ModelResult<Option<Value>> {
        let (removed, relay) = {
            let mut guard = self.inner.state.write();
            let state = &mut *guard;
            let Attributes::Mapping(map) = &mut state.attributes else {
                return Err(shape_error(state, "delete"));
            };
            (map.remove(key), state.relays.remove(key))
        };
        drop(relay);
        tracing::debug!(model = %self.id(), key, present = removed.is_some(), "delete attribute");

        let removed = removed.map(|slot| slot.into_value(&self.inner.tracker, Key::from(key)));
        self.emit(&ChangeEvent::attribute(key));
        Ok(removed)
    }

    /// Turn a placeholder into an empty mapping and splice it into its
    /// parent, materializing absent ancestors first.
    ///
    /// Does nothing on a mapping; fails on a terminal value. A placeholder
    /// with nowhere to splice into (read through a scalar, or whose parent
    /// is gone) fails with its captured access, so writes through it are
    /// never silently lost. Only a root placeholder materializes on its own.
    pub fn expand(&self) -> ModelResult<()> {
        let parent = {
            let state = self.inner.state.read();
            match &state.attributes {
                Attributes::Mapping(_) => return Ok(()),
                Attributes::Terminal(_) => {
                    return Err(ModelError::NotAMapping {
                        path: path_label(&state),
                    })
                }
                Attributes::Placeholder { parent: None, origin: None } => None,
                Attributes::Placeholder { parent, origin } => {
                    match parent.as_ref().and_then(Weak::upgrade) {
                        Some(inner) => Some(Model { inner }),
                        None => {
                            return Err(match origin {
                                Some(access) => ModelError::UndefinedAccess(access.clone()),
                                None => ModelError::Detached,
                            })
                        }
                    }
                }
            }
        };

        if let Some(parent) = &parent {
            parent.expand()?;
        }

        let path = {
            let mut state = self.inner.state.write();
            if !matches!(state.attributes, Attributes::Placeholder { .. }) {
                return Ok(());
            }
            state.attributes = Attributes::Mapping(BTreeMap::new());
            state.path.clone()
        };
        tracing::debug!(model = %self.id(), path = ?path, "materialized placeholder");

        match (parent, path) {
            (Some(parent), Some(Key::Name(key))) => parent.store(&key, Value::Model(self.clone())),
            _ => Ok(()),
        }
    }

    /// Append to the sequence stored where this placeholder lives,
    /// creating an empty [`ArrayModel`] there first if it is absent.
    ///
    /// Returns the sequence so further appends can chain.
    pub fn append(&self, value: impl Into<Input>) -> ModelResult<ArrayModel> {
        let (parent, path) = {
            let state = self.inner.state.read();
            match &state.attributes {
                Attributes::Placeholder {
                    parent: Some(parent),
                    ..
                } => (parent.upgrade(), state.path.clone()),
                Attributes::Placeholder { parent: None, origin } => {
                    return Err(origin
                        .clone()
                        .map_or(ModelError::Detached, ModelError::UndefinedAccess))
                }
                _ => {
                    return Err(ModelError::NotASequence {
                        path: path_label(&state),
                    })
                }
            }
        };
        let (Some(inner), Some(Key::Name(key))) = (parent, path) else {
            return Err(ModelError::Detached);
        };
        let parent = Model { inner };
        parent.expand()?;

        let array = match parent.read_attribute(&key) {
            Value::Array(array) => array,
            existing if existing.is_nil() => {
                let array =
                    ArrayModel::from_json(Vec::new(), &parent.inner.tracker, Some(Key::from(key.as_str())));
                parent.store(&key, Value::Array(array.clone()))?;
                array
            }
            _ => return Err(ModelError::NotASequence { path: key }),
        };
        tracing::debug!(model = %parent.id(), key = %key, "append");
        array.push(value)?;
        Ok(array)
    }

    /// Number of attributes.
    pub fn len(&self) -> ModelResult<usize> {
        self.with_mapping("len", |map| map.len())
    }

    pub fn is_empty(&self) -> ModelResult<bool> {
        self.with_mapping("is_empty", |map| map.is_empty())
    }

    /// Attribute names, sorted.
    pub fn keys(&self) -> ModelResult<Vec<String>> {
        self.with_mapping("keys", |map| map.keys().cloned().collect())
    }

    pub fn contains_key(&self, key: &str) -> ModelResult<bool> {
        self.with_mapping("contains_key", |map| map.contains_key(key))
    }

    /// All attributes with their wrapped values.
    pub fn entries(&self) -> ModelResult<Vec<(String, Value)>> {
        let keys = self.with_mapping("entries", |map| map.keys().cloned().collect::<Vec<_>>())?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let value = self.read_attribute(&key);
                (key, value)
            })
            .collect())
    }

    fn with_mapping<R>(
        &self,
        member: &'static str,
        f: impl FnOnce(&BTreeMap<String, Slot>) -> R,
    ) -> ModelResult<R> {
        self.track(Scope::Method(member));
        let state = self.inner.state.read();
        match &state.attributes {
            Attributes::Mapping(map) => Ok(f(map)),
            _ => Err(shape_error(&state, member)),
        }
    }

    /// Export the model as JSON. A placeholder exports as `null`.
    pub fn to_json(&self) -> JsonValue {
        self.track(Scope::Method("to_json"));
        self.snapshot()
    }

    /// Untracked JSON export.
    pub(crate) fn snapshot(&self) -> JsonValue {
        let state = self.inner.state.read();
        match &state.attributes {
            Attributes::Placeholder { .. } => JsonValue::Null,
            Attributes::Mapping(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, slot)| (key.clone(), slot.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Attributes::Terminal(value) => value.to_json(),
        }
    }

    /// Debug rendering: `<Model:path {...}>`.
    pub fn inspect(&self) -> String {
        describe(&self.inner.state.read())
    }

    pub(crate) fn contains_container(&self, id: ContainerId) -> bool {
        if self.id() == id {
            return true;
        }
        match &self.inner.state.read().attributes {
            Attributes::Mapping(map) => map.values().any(|slot| match slot {
                Slot::Wrapped(value) => value.contains_container(id),
                Slot::Raw(_) => false,
            }),
            Attributes::Terminal(value) => value.contains_container(id),
            Attributes::Placeholder { .. } => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn has_raw_slot(&self, key: &str) -> bool {
        match &self.inner.state.read().attributes {
            Attributes::Mapping(map) => matches!(map.get(key), Some(Slot::Raw(_))),
            _ => false,
        }
    }

    /// Register a broad listener: called for every change on this model.
    ///
    /// Changes below this model arrive relayed, so a single deep write
    /// through a placeholder is heard twice: once when the new mapping is
    /// spliced in under its key, then again for the write itself with the
    /// child key as an extra argument.
    pub fn on_change<F>(&self, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(Scope::All, callback)
    }

    /// Register a listener for direct changes of one attribute.
    pub fn on_attribute<F>(&self, key: &str, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(Scope::attribute(key), callback)
    }

    pub fn subscribe<F>(&self, scope: Scope, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.tracker.register(self.id(), scope, callback)
    }

    /// Run `f` now and again whenever anything it read changes.
    pub fn observe<F>(&self, f: F) -> Observer
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.tracker.observe(f)
    }

    fn track(&self, scope: Scope) {
        self.inner.tracker.track_read(self.id(), scope);
    }

    pub(crate) fn emit(&self, event: &ChangeEvent) -> usize {
        self.inner.tracker.emit(self.id(), event)
    }

    /// Relay changes of a child container stored under `key` to this model.
    fn relay_for(&self, key: &str, value: &Value) -> Option<Registration> {
        let (tracker, child) = match value {
            Value::Model(model) => (model.tracker(), model.id()),
            Value::Array(array) => (array.tracker(), array.id()),
            _ => return None,
        };
        tracing::trace!(model = %self.id(), %child, key, "tracking element");

        let parent = Arc::downgrade(&self.inner);
        let key = key.to_string();
        Some(tracker.register_relay(child, move |event| {
            if let Some(inner) = parent.upgrade() {
                Model { inner }.emit(&ChangeEvent::relayed(key.as_str(), event));
            }
        }))
    }

    fn relay_wrapped_children(&self) {
        let mut guard = self.inner.state.write();
        let state = &mut *guard;
        let Attributes::Mapping(map) = &state.attributes else {
            return;
        };
        for (key, slot) in map {
            if let Slot::Wrapped(value) = slot {
                if let Some(relay) = self.relay_for(key, value) {
                    state.relays.insert(key.clone(), relay);
                }
            }
        }
    }

    fn path_label(&self) -> String {
        path_label(&self.inner.state.read())
    }

    /// Replace the validation rules.
    pub fn set_validations(&self, validations: Validations) {
        self.inner.state.write().validation.set_rules(validations);
        self.emit(&ChangeEvent::methods(ERROR_VIEWS));
    }

    /// Start reporting `field` in [`Model::marked_errors`], usually once it
    /// has been edited or blurred.
    pub fn mark_field(&self, field: &str) {
        self.inner.state.write().validation.mark(field);
        self.emit(&ChangeEvent::methods(ERROR_VIEWS));
    }

    /// Stop checking `field` until it is marked again.
    pub fn exclude_from_errors(&self, field: &str) {
        self.inner.state.write().validation.exclude(field);
        self.emit(&ChangeEvent::methods(ERROR_VIEWS));
    }

    /// Errors for every field with rules, except excluded ones.
    pub fn errors(&self) -> Errors {
        self.collect_errors("errors", false)
    }

    /// Errors restricted to marked fields.
    pub fn marked_errors(&self) -> Errors {
        self.collect_errors("marked_errors", true)
    }

    fn collect_errors(&self, member: &'static str, marked_only: bool) -> Errors {
        self.track(Scope::Method(member));
        let validation = self.inner.state.read().validation.clone();
        self.inner
            .tracker
            .untracked(|| validation.collect(self, marked_only))
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new(JsonValue::Object(Map::new()))
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.snapshot() == other.snapshot()
    }
}

impl PartialEq<JsonValue> for Model {
    fn eq(&self, other: &JsonValue) -> bool {
        self.snapshot() == *other
    }
}

fn path_label(state: &ModelState) -> String {
    state
        .path
        .as_ref()
        .map_or_else(|| "<root>".to_string(), ToString::to_string)
}

fn describe(state: &ModelState) -> String {
    let path = state.path.as_ref().map(ToString::to_string).unwrap_or_default();
    let body = match &state.attributes {
        Attributes::Placeholder { .. } => "nil".to_string(),
        Attributes::Mapping(map) => JsonValue::Object(
            map.iter()
                .map(|(key, slot)| (key.clone(), slot.to_json()))
                .collect::<Map<_, _>>(),
        )
        .to_string(),
        Attributes::Terminal(value) => value.inspect(),
    };
    format!("<Model:{path} {body}>")
}

/// The error for a mapping operation on a non-mapping model.
fn shape_error(state: &ModelState, member: &str) -> ModelError {
    match &state.attributes {
        Attributes::Placeholder { origin, .. } => ModelError::UndefinedAccess(
            origin
                .clone()
                .unwrap_or_else(|| UndefinedAccess::new(member, describe(state))),
        ),
        _ => ModelError::NotAMapping {
            path: path_label(state),
        },
    }
}
