use super::length::LengthRule;
use crate::error::ModelResult;
use crate::model::{Model, Value};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Errors per field, each field with every message its rules produced.
pub type Errors = BTreeMap<String, Vec<String>>;

/// A single declarative rule for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Length(LengthRule),
    /// The field must be present and not an empty string.
    Presence,
}

impl Rule {
    pub fn check(&self, value: &Value) -> Option<String> {
        match self {
            Rule::Length(rule) => rule.check(value),
            Rule::Presence => {
                let blank = value.is_nil() || value.as_str().is_some_and(|s| s.trim().is_empty());
                blank.then(|| "must be specified".to_string())
            }
        }
    }
}

// One field's rule table as written in configuration.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldRulesConfig {
    #[serde(default)]
    length: Option<LengthRule>,
    #[serde(default)]
    presence: Option<bool>,
}

impl FieldRulesConfig {
    fn into_rules(self) -> Vec<Rule> {
        let mut rules = Vec::new();
        if let Some(length) = self.length {
            rules.push(Rule::Length(length));
        }
        if self.presence == Some(true) {
            rules.push(Rule::Presence);
        }
        rules
    }
}

/// Declarative validation rules, keyed by field name.
///
/// # Examples
///
/// ```
/// use attrmodel::{LengthRule, Rule, Validations};
/// use serde_json::json;
///
/// let built = Validations::new()
///     .validate("name", Rule::Length(LengthRule::at_least(5)))
///     .validate("email", Rule::Presence);
///
/// let parsed = Validations::from_json(json!({
///     "name": { "length": 5 },
///     "email": { "presence": true },
/// }))
/// .unwrap();
///
/// assert_eq!(built, parsed);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validations {
    fields: BTreeMap<String, Vec<Rule>>,
}

impl<'de> Deserialize<'de> for Validations {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let config = BTreeMap::<String, FieldRulesConfig>::deserialize(deserializer)?;
        Ok(Self {
            fields: config
                .into_iter()
                .map(|(field, rules)| (field, rules.into_rules()))
                .collect(),
        })
    }
}

impl Validations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for `field`.
    pub fn validate(mut self, field: impl Into<String>, rule: Rule) -> Self {
        self.fields.entry(field.into()).or_default().push(rule);
        self
    }

    /// Parse the `field -> {rule kind -> arguments}` shape.
    pub fn from_json(json: JsonValue) -> ModelResult<Self> {
        Ok(serde_json::from_value(json)?)
    }

    pub fn rules_for(&self, field: &str) -> &[Rule] {
        self.fields.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Validation bookkeeping attached to a model.
#[derive(Debug, Clone, Default)]
pub(crate) struct ValidationState {
    rules: Option<Arc<Validations>>,
    marked: BTreeSet<String>,
    excluded: BTreeSet<String>,
}

impl ValidationState {
    pub(crate) fn set_rules(&mut self, validations: Validations) {
        self.rules = Some(Arc::new(validations));
    }

    pub(crate) fn mark(&mut self, field: &str) {
        self.excluded.remove(field);
        self.marked.insert(field.to_string());
    }

    pub(crate) fn exclude(&mut self, field: &str) {
        self.marked.remove(field);
        self.excluded.insert(field.to_string());
    }

    /// Run every active rule against the current contents of `model`.
    pub(crate) fn collect(&self, model: &Model, marked_only: bool) -> Errors {
        let mut errors = Errors::new();
        let Some(rules) = &self.rules else {
            return errors;
        };

        for (field, field_rules) in &rules.fields {
            if self.excluded.contains(field) {
                continue;
            }
            if marked_only && !self.marked.contains(field) {
                continue;
            }
            let value = model.get(field);
            let messages: Vec<String> = field_rules
                .iter()
                .filter_map(|rule| rule.check(&value))
                .collect();
            if !messages.is_empty() {
                errors.entry(field.clone()).or_default().extend(messages);
            }
        }
        errors
    }
}
