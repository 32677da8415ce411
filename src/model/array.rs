use super::model::Model;
use super::value::{Input, Key, Value};
use super::wrap;
use crate::error::{ModelError, ModelResult, UndefinedAccess};
use crate::runtime::{ChangeEvent, ContainerId, Registration, Scope, Tracker};
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

struct ArrayState {
    items: Vec<Value>,
    path: Option<Key>,
    // Relays from child containers, by child identity. Indices shift on
    // removal, so the relay looks its position up when it fires.
    relays: HashMap<ContainerId, ChildRelay>,
}

// One relay per distinct child, however many slots hold it.
struct ChildRelay {
    registration: Registration,
    occurrences: usize,
}

impl ArrayState {
    /// Count one more slot holding `child`. A registration made for a
    /// child that is already relayed is handed back to be dropped.
    fn attach(&mut self, child: ContainerId, registration: Registration) -> Option<Registration> {
        match self.relays.entry(child) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().occurrences += 1;
                Some(registration)
            }
            Entry::Vacant(entry) => {
                entry.insert(ChildRelay {
                    registration,
                    occurrences: 1,
                });
                None
            }
        }
    }

    /// Count one slot fewer holding `value`, returning the relay once the
    /// last one is gone.
    fn detach(&mut self, value: &Value) -> Option<Registration> {
        let child = child_id(value)?;
        let relay = self.relays.get_mut(&child)?;
        relay.occurrences -= 1;
        if relay.occurrences > 0 {
            return None;
        }
        self.relays.remove(&child).map(|relay| relay.registration)
    }
}

struct ArrayInner {
    id: ContainerId,
    tracker: Arc<Tracker>,
    state: RwLock<ArrayState>,
}

/// A reactive sequence, the ordered sibling of [`Model`].
///
/// Items are wrapped like model attributes, reads are tracked per index and
/// every mutation emits a `changed` event keyed by the affected index.
///
/// # Examples
///
/// ```
/// use attrmodel::{ArrayModel, Value};
///
/// let tags = ArrayModel::new();
/// tags.push("rust").unwrap();
/// tags.push("reactive").unwrap();
///
/// assert_eq!(tags.len(), 2);
/// assert_eq!(tags.get(1), Value::from("reactive"));
/// assert!(tags.get(5).is_nil());
/// ```
#[derive(Clone)]
pub struct ArrayModel {
    inner: Arc<ArrayInner>,
}

impl ArrayModel {
    /// An empty sequence with its own tracker.
    pub fn new() -> Self {
        Self::with_tracker(&Tracker::new())
    }

    /// An empty sequence sharing `tracker`.
    pub fn with_tracker(tracker: &Arc<Tracker>) -> Self {
        Self::from_json(Vec::new(), tracker, None)
    }

    /// A sequence holding `items`, wrapped.
    pub fn from_items<I>(items: impl IntoIterator<Item = I>, tracker: &Arc<Tracker>) -> Self
    where
        I: Into<Input>,
    {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| wrap::wrap_input(item.into(), tracker, Some(Key::Index(index))))
            .collect();
        Self::from_values(items, tracker, None)
    }

    pub(crate) fn from_json(items: Vec<JsonValue>, tracker: &Arc<Tracker>, path: Option<Key>) -> Self {
        let items = items
            .into_iter()
            .enumerate()
            .map(|(index, json)| wrap::wrap_json(json, tracker, Some(Key::Index(index))))
            .collect();
        Self::from_values(items, tracker, path)
    }

    fn from_values(items: Vec<Value>, tracker: &Arc<Tracker>, path: Option<Key>) -> Self {
        let array = Self {
            inner: Arc::new(ArrayInner {
                id: ContainerId::next(),
                tracker: Arc::clone(tracker),
                state: RwLock::new(ArrayState {
                    items,
                    path,
                    relays: HashMap::new(),
                }),
            }),
        };

        let mut state = array.inner.state.write();
        let relays: Vec<_> = state
            .items
            .iter()
            .filter_map(|item| array.relay_for(item))
            .collect();
        let redundant: Vec<_> = relays
            .into_iter()
            .filter_map(|(child, relay)| state.attach(child, relay))
            .collect();
        drop(state);
        drop(redundant);
        array
    }

    pub fn id(&self) -> ContainerId {
        self.inner.id
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.inner.tracker
    }

    pub fn path(&self) -> Option<Key> {
        self.inner.state.read().path.clone()
    }

    pub fn ptr_eq(&self, other: &ArrayModel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read an item. Out of range yields a placeholder carrying the access.
    pub fn get(&self, index: usize) -> Value {
        self.track(Scope::attribute(index));
        let state = self.inner.state.read();
        match state.items.get(index) {
            Some(value) => value.clone(),
            None => {
                let access = UndefinedAccess::new(index.to_string(), describe(&state));
                Value::Model(Model::undefined(access, Some(&self.inner.tracker)))
            }
        }
    }

    /// Replace the item at `index`.
    pub fn set(&self, index: usize, value: impl Into<Input>) -> ModelResult<()> {
        let value = self.wrap_checked(value.into(), index)?;
        let relay = self.relay_for(&value);
        let released = {
            let mut state = self.inner.state.write();
            let len = state.items.len();
            let Some(slot) = state.items.get_mut(index) else {
                return Err(ModelError::IndexOutOfBounds { index, len });
            };
            let old = std::mem::replace(slot, value);
            let redundant = relay.and_then(|(child, relay)| state.attach(child, relay));
            (state.detach(&old), redundant, old)
        };
        drop(released);
        tracing::debug!(array = %self.id(), index, "assign item");
        self.emit(&ChangeEvent::attribute(index));
        Ok(())
    }

    /// Append an item, returning its index.
    pub fn push(&self, value: impl Into<Input>) -> ModelResult<usize> {
        let index = self.inner.state.read().items.len();
        let value = self.wrap_checked(value.into(), index)?;
        let relay = self.relay_for(&value);
        let (index, redundant) = {
            let mut state = self.inner.state.write();
            state.items.push(value);
            let redundant = relay.and_then(|(child, relay)| state.attach(child, relay));
            (state.items.len() - 1, redundant)
        };
        drop(redundant);
        tracing::debug!(array = %self.id(), index, "push item");
        self.emit(&ChangeEvent::attribute(index));
        Ok(index)
    }

    /// Remove and return the item at `index`.
    ///
    /// Later items shift down, so the event is broad.
    pub fn remove(&self, index: usize) -> ModelResult<Value> {
        let (removed, relay) = {
            let mut state = self.inner.state.write();
            let len = state.items.len();
            if index >= len {
                return Err(ModelError::IndexOutOfBounds { index, len });
            }
            let removed = state.items.remove(index);
            let relay = state.detach(&removed);
            (removed, relay)
        };
        drop(relay);
        tracing::debug!(array = %self.id(), index, "remove item");
        self.emit(&ChangeEvent::broad());
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.track(Scope::Method("len"));
        self.inner.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the items.
    pub fn to_vec(&self) -> Vec<Value> {
        self.track(Scope::Method("to_vec"));
        self.inner.state.read().items.clone()
    }

    pub fn to_json(&self) -> JsonValue {
        self.track(Scope::Method("to_json"));
        self.snapshot()
    }

    pub(crate) fn snapshot(&self) -> JsonValue {
        JsonValue::Array(
            self.inner
                .state
                .read()
                .items
                .iter()
                .map(Value::to_json)
                .collect(),
        )
    }

    /// Debug rendering: `<ArrayModel:path [...]>`.
    pub fn inspect(&self) -> String {
        describe(&self.inner.state.read())
    }

    pub fn on_change<F>(&self, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribe(Scope::All, callback)
    }

    pub fn subscribe<F>(&self, scope: Scope, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.inner.tracker.register(self.id(), scope, callback)
    }

    pub(crate) fn contains_container(&self, id: ContainerId) -> bool {
        self.id() == id
            || self
                .inner
                .state
                .read()
                .items
                .iter()
                .any(|item| item.contains_container(id))
    }

    fn wrap_checked(&self, input: Input, index: usize) -> ModelResult<Value> {
        let value = wrap::wrap_input(input, &self.inner.tracker, Some(Key::Index(index)));
        if value.contains_container(self.id()) {
            return Err(ModelError::Cycle {
                path: describe_path(&self.inner.state.read().path, index),
            });
        }
        Ok(value)
    }

    fn track(&self, scope: Scope) {
        self.inner.tracker.track_read(self.id(), scope);
    }

    fn emit(&self, event: &ChangeEvent) -> usize {
        self.inner.tracker.emit(self.id(), event)
    }

    fn position_of(&self, child: ContainerId) -> Option<usize> {
        self.inner
            .state
            .read()
            .items
            .iter()
            .position(|item| child_id(item) == Some(child))
    }

    fn relay_for(&self, value: &Value) -> Option<(ContainerId, Registration)> {
        let (tracker, child) = match value {
            Value::Model(model) => (model.tracker(), model.id()),
            Value::Array(array) => (array.tracker(), array.id()),
            _ => return None,
        };
        let parent: Weak<ArrayInner> = Arc::downgrade(&self.inner);
        let registration = tracker.register_relay(child, move |event| {
            let Some(inner) = parent.upgrade() else {
                return;
            };
            let array = ArrayModel { inner };
            if let Some(index) = array.position_of(child) {
                array.emit(&ChangeEvent::relayed(index, event));
            }
        });
        Some((child, registration))
    }
}

impl Default for ArrayModel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArrayModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl PartialEq for ArrayModel {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.snapshot() == other.snapshot()
    }
}

fn child_id(value: &Value) -> Option<ContainerId> {
    match value {
        Value::Model(model) => Some(model.id()),
        Value::Array(array) => Some(array.id()),
        _ => None,
    }
}

fn describe(state: &ArrayState) -> String {
    let path = state.path.as_ref().map(ToString::to_string).unwrap_or_default();
    let items = JsonValue::Array(state.items.iter().map(Value::to_json).collect());
    format!("<ArrayModel:{path} {items}>")
}

fn describe_path(path: &Option<Key>, index: usize) -> String {
    match path {
        Some(path) => format!("{path}[{index}]"),
        None => format!("[{index}]"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn push_get_and_remove() {
        let array = ArrayModel::new();
        assert_eq!(array.push(1).unwrap(), 0);
        assert_eq!(array.push("two").unwrap(), 1);

        assert_eq!(array.get(0), Value::Int(1));
        assert_eq!(array.remove(0).unwrap(), Value::Int(1));
        assert_eq!(array.get(0), Value::from("two"));
        assert!(matches!(
            array.remove(4),
            Err(ModelError::IndexOutOfBounds { index: 4, len: 1 })
        ));
    }

    #[test]
    fn out_of_range_reads_capture_the_access() {
        let array = ArrayModel::new();
        let err = array.get(3).force().unwrap_err();
        assert_eq!(err.to_string(), "undefined method `3' for <ArrayModel: []>");
    }

    #[test]
    fn set_replaces_in_place() {
        let tracker = Tracker::new();
        let array = ArrayModel::from_items(vec![1, 2, 3], &tracker);

        array.set(1, 20).unwrap();
        assert_eq!(array.to_json(), json!([1, 20, 3]));
        assert!(matches!(
            array.set(3, 4),
            Err(ModelError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn item_changes_relay_with_current_index() {
        let tracker = Tracker::new();
        let array = ArrayModel::from_json(
            vec![json!({ "n": 1 }), json!({ "n": 2 })],
            &tracker,
            None,
        );
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _reg = array.on_change({
            let events = events.clone();
            move |event: &ChangeEvent| events.lock().push(event.clone())
        });

        let second = array.get(1);
        array.remove(0).unwrap();
        second.set("n", 3).unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].key(), Some(&Key::Index(0)));
        assert_eq!(events[1].args(), &[Value::from("n")]);
    }

    #[test]
    fn removed_items_stop_relaying() {
        let tracker = Tracker::new();
        let array = ArrayModel::from_json(vec![json!({ "n": 1 })], &tracker, None);
        let count = Arc::new(AtomicUsize::new(0));
        let _reg = array.on_change({
            let count = count.clone();
            move |_: &ChangeEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        let item = array.remove(0).unwrap();
        item.set("n", 2).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pushing_itself_is_a_cycle() {
        let array = ArrayModel::new();
        assert!(matches!(
            array.push(array.clone()),
            Err(ModelError::Cycle { .. })
        ));
    }

    #[test]
    fn duplicate_items_keep_relaying_until_the_last_leaves() {
        let tracker = Tracker::new();
        let array = ArrayModel::with_tracker(&tracker);
        let child = Model::with_tracker(json!({ "n": 1 }), &tracker);
        array.push(child.clone()).unwrap();
        array.push(child.clone()).unwrap();
        assert_eq!(tracker.listener_count(child.id()), 1);

        let count = Arc::new(AtomicUsize::new(0));
        let _reg = array.on_change({
            let count = count.clone();
            move |_: &ChangeEvent| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });

        array.remove(0).unwrap();
        child.set("n", 2).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        array.remove(0).unwrap();
        child.set("n", 3).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.listener_count(child.id()), 0);
    }

    #[test]
    fn replacing_a_duplicate_keeps_the_other_slot_relayed() {
        let tracker = Tracker::new();
        let child = Model::with_tracker(json!({ "n": 1 }), &tracker);
        let array = ArrayModel::from_items(vec![child.clone(), child.clone()], &tracker);
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let _reg = array.on_change({
            let events = events.clone();
            move |event: &ChangeEvent| events.lock().push(event.clone())
        });

        array.set(0, 10).unwrap();
        child.set("n", 2).unwrap();

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].key(), Some(&Key::Index(1)));
        assert_eq!(events[1].args(), &[Value::from("n")]);
    }
}
