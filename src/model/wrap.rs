//! Turning raw JSON into reactive values.
//!
//! Wrapping is deep but lazy: a container built explicitly wraps its direct
//! children at once, while mappings further down keep their entries raw
//! until each one is first touched.

use super::array::ArrayModel;
use super::model::Model;
use super::value::{Input, Key, Value};
use crate::runtime::Tracker;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A mapping entry, either still raw or already wrapped.
#[derive(Clone)]
pub(crate) enum Slot {
    Raw(JsonValue),
    Wrapped(Value),
}

impl Slot {
    pub(crate) fn to_json(&self) -> JsonValue {
        match self {
            Slot::Raw(json) => json.clone(),
            Slot::Wrapped(value) => value.to_json(),
        }
    }

    /// Wrap a raw entry without installing any tracking.
    pub(crate) fn into_value(self, tracker: &Arc<Tracker>, path: Key) -> Value {
        match self {
            Slot::Raw(json) => wrap_json(json, tracker, Some(path)),
            Slot::Wrapped(value) => value,
        }
    }
}

/// Wrap a write. Already wrapped values pass through unchanged.
pub(crate) fn wrap_input(input: Input, tracker: &Arc<Tracker>, path: Option<Key>) -> Value {
    match input {
        Input::Json(json) => wrap_json(json, tracker, path),
        Input::Value(value) => value,
    }
}

/// Wrap one raw value. Objects become models whose entries stay raw.
pub(crate) fn wrap_json(json: JsonValue, tracker: &Arc<Tracker>, path: Option<Key>) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Str(s),
        JsonValue::Array(items) => Value::Array(ArrayModel::from_json(items, tracker, path)),
        JsonValue::Object(map) => Value::Model(Model::lazy(raw_slots(map), tracker, path)),
    }
}

/// Entries of a mapping that is being wrapped lazily.
pub(crate) fn raw_slots(map: Map<String, JsonValue>) -> BTreeMap<String, Slot> {
    map.into_iter()
        .map(|(key, json)| (key, Slot::Raw(json)))
        .collect()
}

/// Entries of an explicitly constructed mapping: direct children wrapped.
pub(crate) fn wrapped_slots(
    map: Map<String, JsonValue>,
    tracker: &Arc<Tracker>,
) -> BTreeMap<String, Slot> {
    map.into_iter()
        .map(|(key, json)| {
            let value = wrap_json(json, tracker, Some(Key::from(key.as_str())));
            (key, Slot::Wrapped(value))
        })
        .collect()
}
