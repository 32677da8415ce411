use crate::model::Value;
use serde::{Deserialize, Deserializer};

/// Bounds on the length of a field, in characters (or items for sequences).
///
/// Deserializes either from a bare number, which is the minimum, or from a
/// table with optional `minimum`, `maximum` and `message` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LengthRule {
    pub minimum: Option<usize>,
    pub maximum: Option<usize>,
    /// Replaces the generated message when set.
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LengthConfig {
    Minimum(usize),
    Bounds(LengthBounds),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct LengthBounds {
    #[serde(default)]
    minimum: Option<usize>,
    #[serde(default)]
    maximum: Option<usize>,
    #[serde(default)]
    message: Option<String>,
}

impl<'de> Deserialize<'de> for LengthRule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match LengthConfig::deserialize(deserializer)? {
            LengthConfig::Minimum(minimum) => LengthRule::at_least(minimum),
            LengthConfig::Bounds(bounds) => LengthRule {
                minimum: bounds.minimum,
                maximum: bounds.maximum,
                message: bounds.message,
            },
        })
    }
}

impl LengthRule {
    pub fn at_least(minimum: usize) -> Self {
        Self {
            minimum: Some(minimum),
            ..Self::default()
        }
    }

    pub fn at_most(maximum: usize) -> Self {
        Self {
            maximum: Some(maximum),
            ..Self::default()
        }
    }

    pub fn between(minimum: usize, maximum: usize) -> Self {
        Self {
            minimum: Some(minimum),
            maximum: Some(maximum),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Check `value`, returning the error message if it is out of bounds.
    ///
    /// An absent value has length zero.
    pub fn check(&self, value: &Value) -> Option<String> {
        let length = measure(value);
        if let Some(minimum) = self.minimum {
            if length < minimum {
                return Some(self.message_or(|| format!("must be at least {minimum} characters")));
            }
        }
        if let Some(maximum) = self.maximum {
            if length > maximum {
                return Some(self.message_or(|| format!("must be at most {maximum} characters")));
            }
        }
        None
    }

    fn message_or(&self, default: impl FnOnce() -> String) -> String {
        self.message.clone().unwrap_or_else(default)
    }
}

fn measure(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.chars().count(),
        Value::Array(array) => array.len(),
        other if other.is_nil() => 0,
        other => other.inspect().chars().count(),
    }
}
