use super::array::ArrayModel;
use super::model::Model;
use crate::error::{ModelError, ModelResult, UndefinedAccess};
use crate::runtime::ContainerId;
use serde_json::Value as JsonValue;
use std::fmt;

/// The key a value lives under: an attribute name or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl Key {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => f.write_str(name),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// A wrapped value as stored in, and read from, a container.
///
/// Nested mappings and sequences are always containers, so every level of
/// the tree is reactive. An absent attribute reads as a placeholder
/// [`Model`], never as an error.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Model(Model),
    Array(ArrayModel),
}

impl Value {
    /// Chain an attribute read.
    ///
    /// Models resolve the attribute normally. Any other shape yields a
    /// detached placeholder carrying the failed access, so chains on
    /// missing data never fault.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Model(model) => model.get(key),
            other => Value::Model(Model::undefined(
                UndefinedAccess::new(key, other.inspect()),
                other.tracker_hint(),
            )),
        }
    }

    /// Chain an attribute write. Only models accept attributes.
    pub fn set(&self, key: &str, value: impl Into<Input>) -> ModelResult<()> {
        match self {
            Value::Model(model) => model.set(key, value),
            other => Err(ModelError::NotAMapping {
                path: other.inspect(),
            }),
        }
    }

    /// Append through this value, creating the sequence if it is absent.
    pub fn append(&self, value: impl Into<Input>) -> ModelResult<ArrayModel> {
        match self {
            Value::Model(model) => model.append(value),
            Value::Array(array) => {
                array.push(value)?;
                Ok(array.clone())
            }
            other => Err(ModelError::NotASequence {
                path: other.inspect(),
            }),
        }
    }

    /// Whether the value is absent: null or a placeholder.
    pub fn is_nil(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Model(model) => model.is_nil(),
            _ => false,
        }
    }

    /// Boolean coercion. Only null, `false` and placeholders are false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Model(model) => model.is_true(),
            _ => true,
        }
    }

    pub fn is_false(&self) -> bool {
        !self.is_true()
    }

    /// Surface a captured undefined access as a real error.
    pub fn force(self) -> ModelResult<Value> {
        if let Value::Model(model) = &self {
            if let Some(access) = model.captured_access() {
                return Err(ModelError::UndefinedAccess(access));
            }
        }
        Ok(self)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&Model> {
        match self {
            Value::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayModel> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    /// Export the value (and everything below it) as JSON.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Model(model) => model.snapshot(),
            Value::Array(array) => array.snapshot(),
        }
    }

    pub fn inspect(&self) -> String {
        match self {
            Value::Null => "nil".to_string(),
            Value::Model(model) => model.inspect(),
            Value::Array(array) => array.inspect(),
            other => other.to_json().to_string(),
        }
    }

    /// Whether `id` names this value or any container below it.
    pub(crate) fn contains_container(&self, id: ContainerId) -> bool {
        match self {
            Value::Model(model) => model.contains_container(id),
            Value::Array(array) => array.contains_container(id),
            _ => false,
        }
    }

    fn tracker_hint(&self) -> Option<&std::sync::Arc<crate::runtime::Tracker>> {
        match self {
            Value::Model(model) => Some(model.tracker()),
            Value::Array(array) => Some(array.tracker()),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Model(a), Value::Model(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Model> for Value {
    fn from(model: Model) -> Self {
        Value::Model(model)
    }
}

impl From<ArrayModel> for Value {
    fn from(array: ArrayModel) -> Self {
        Value::Array(array)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Name(name) => Value::Str(name),
            Key::Index(index) => Value::Int(index as i64),
        }
    }
}

/// Anything that can be written into a container: raw JSON, or a value
/// that is already wrapped.
#[derive(Debug, Clone)]
pub enum Input {
    Json(JsonValue),
    Value(Value),
}

impl From<JsonValue> for Input {
    fn from(json: JsonValue) -> Self {
        Input::Json(json)
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

impl From<Model> for Input {
    fn from(model: Model) -> Self {
        Input::Value(Value::Model(model))
    }
}

impl From<ArrayModel> for Input {
    fn from(array: ArrayModel) -> Self {
        Input::Value(Value::Array(array))
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Value(Value::from(s))
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Value(Value::from(s))
    }
}

impl From<i64> for Input {
    fn from(i: i64) -> Self {
        Input::Value(Value::from(i))
    }
}

impl From<i32> for Input {
    fn from(i: i32) -> Self {
        Input::Value(Value::from(i))
    }
}

impl From<f64> for Input {
    fn from(f: f64) -> Self {
        Input::Value(Value::from(f))
    }
}

impl From<bool> for Input {
    fn from(b: bool) -> Self {
        Input::Value(Value::from(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness() {
        assert!(Value::Null.is_nil());
        assert!(Value::Null.is_false());
        assert!(Value::Bool(false).is_false());
        assert!(Value::Int(0).is_true());
        assert!(Value::from("").is_true());
    }

    #[test]
    fn chaining_through_a_scalar_captures_the_access() {
        let value = Value::from(3);
        let chained = value.get("name").get("first");

        assert!(chained.is_nil());
        let err = chained.force().unwrap_err();
        assert!(err.to_string().contains("undefined method `first'"));
    }

    #[test]
    fn forcing_a_present_value_is_ok() {
        let value = Value::from("Ada").force().unwrap();
        assert_eq!(value.as_str(), Some("Ada"));
    }

    #[test]
    fn key_conversions() {
        assert_eq!(Value::from(Key::from("a")), Value::from("a"));
        assert_eq!(Value::from(Key::from(2usize)), Value::from(2));
        assert_eq!(Key::from(3usize).to_string(), "3");
    }

    #[test]
    fn json_export() {
        assert_eq!(Value::from(1.5).to_json(), json!(1.5));
        assert_eq!(Value::Null.to_json(), JsonValue::Null);
    }
}
