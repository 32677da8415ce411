use super::tracker::{ContainerId, Tracker};
use crate::model::{Key, Value};
use std::collections::HashSet;

/// What a listener is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every change on the container (a broad listener).
    All,
    /// A derived view such as `len` or `errors`. Any attribute change may
    /// affect it, and it can also be targeted by name.
    Method(&'static str),
    /// One attribute, changing with exactly `arity` extra arguments.
    Attribute { key: Key, arity: usize },
}

impl Scope {
    /// A scoped listener on `key` with no extra arguments.
    pub fn attribute(key: impl Into<Key>) -> Self {
        Scope::Attribute {
            key: key.into(),
            arity: 0,
        }
    }
}

/// Where an emission is aimed.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// No key filter: every listener hears it.
    Broad,
    /// A single attribute changed.
    Attribute(Key),
    /// Only method listeners with one of these names.
    Methods(Vec<&'static str>),
}

/// A `changed` event as delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    target: Target,
    args: Vec<Value>,
}

impl ChangeEvent {
    /// The only event name emitted by containers.
    pub const NAME: &'static str = "changed";

    pub fn broad() -> Self {
        Self {
            target: Target::Broad,
            args: Vec::new(),
        }
    }

    pub fn attribute(key: impl Into<Key>) -> Self {
        Self {
            target: Target::Attribute(key.into()),
            args: Vec::new(),
        }
    }

    pub fn methods(names: &[&'static str]) -> Self {
        Self {
            target: Target::Methods(names.to_vec()),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// The event a parent emits for `key` when the child stored there
    /// changed. The child's own key and arguments become the extra
    /// arguments, so they accumulate into the path below `key`. A broad
    /// child change contributes `Value::Null` in place of a key, so the
    /// relayed event never looks like `key` itself was replaced.
    pub(crate) fn relayed(key: impl Into<Key>, child: &ChangeEvent) -> Self {
        let mut args = Vec::with_capacity(child.args.len() + 1);
        args.push(child.key().map_or(Value::Null, |child_key| Value::from(child_key.clone())));
        args.extend(child.args.iter().cloned());
        Self::attribute(key).with_args(args)
    }

    pub fn name(&self) -> &'static str {
        Self::NAME
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// The changed attribute, if the event is scoped to one.
    pub fn key(&self) -> Option<&Key> {
        match &self.target {
            Target::Attribute(key) => Some(key),
            _ => None,
        }
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Whether a listener registered with `scope` should hear `event`.
///
/// Broad events reach everyone. Attribute events reach broad and method
/// listeners, plus attribute listeners on the same key whose arity equals
/// the number of extra arguments. Method events reach only the named
/// method listeners.
pub fn is_relevant(scope: &Scope, event: &ChangeEvent) -> bool {
    match (&event.target, scope) {
        (Target::Broad, _) => true,
        (Target::Attribute(_), Scope::All | Scope::Method(_)) => true,
        (Target::Attribute(changed), Scope::Attribute { key, arity }) => {
            changed == key && event.args.len() == *arity
        }
        (Target::Methods(names), Scope::Method(name)) => names.contains(name),
        (Target::Methods(_), _) => false,
    }
}

/// Fan `event` out to the relevant listeners of `owner`.
///
/// The listener set is snapshotted first so callbacks may register,
/// unregister or emit again. Direct listeners run in registration order,
/// then relays to the parent. An observer runs at most once per emission.
pub(crate) fn route(tracker: &Tracker, owner: ContainerId, event: &ChangeEvent) -> usize {
    let (relays, direct): (Vec<_>, Vec<_>) = tracker
        .listeners(owner)
        .into_iter()
        .filter(|listener| is_relevant(&listener.scope, event))
        .partition(|listener| listener.relay);

    let mut observers = HashSet::new();
    let mut delivered = 0;
    for listener in direct.into_iter().chain(relays) {
        if let Some(observer) = listener.observer {
            if !observers.insert(observer) {
                continue;
            }
        }
        (listener.callback)(event);
        delivered += 1;
    }

    tracing::trace!(%owner, target = ?event.target, delivered, "routed change");
    delivered
}
