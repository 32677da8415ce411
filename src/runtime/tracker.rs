use super::observer::Observer;
use super::registration::Registration;
use super::router::{self, ChangeEvent, Scope};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Identity of a container (model or array).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(usize);

static NEXT_CONTAINER_ID: AtomicUsize = AtomicUsize::new(0);

impl ContainerId {
    /// Allocate a fresh, process-unique container identity.
    pub fn next() -> Self {
        ContainerId(NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// One registered listener.
#[derive(Clone)]
pub(crate) struct Listener {
    pub(crate) id: usize,
    pub(crate) scope: Scope,
    pub(crate) callback: Callback,
    /// Relays forward a child's change to its parent and run after the
    /// child's own listeners.
    pub(crate) relay: bool,
    /// Set when the listener belongs to an observer.
    pub(crate) observer: Option<usize>,
}

struct ObserverEntry {
    run: Arc<dyn Fn() + Send + Sync>,
    registrations: Vec<usize>,
    seen: HashSet<(ContainerId, Scope)>,
    running: bool,
}

#[derive(Default)]
struct TrackerState {
    // `None` marks an untracked section.
    observer_stack: Vec<Option<usize>>,
    // Per container, in registration order.
    listeners: HashMap<ContainerId, Vec<Listener>>,
    // Registration ID -> owning container
    owners: HashMap<usize, ContainerId>,
    observers: HashMap<usize, ObserverEntry>,
}

impl TrackerState {
    fn insert(&mut self, owner: ContainerId, listener: Listener) {
        self.owners.insert(listener.id, owner);
        self.listeners.entry(owner).or_default().push(listener);
    }

    // The detached listener is returned so the caller can drop it, and
    // whatever its callback owns, after releasing the lock.
    fn detach(&mut self, registration_id: usize) -> Option<Listener> {
        let owner = self.owners.remove(&registration_id)?;
        let listeners = self.listeners.get_mut(&owner)?;
        let position = listeners.iter().position(|l| l.id == registration_id)?;
        let listener = listeners.remove(position);
        if listeners.is_empty() {
            self.listeners.remove(&owner);
        }
        Some(listener)
    }
}

/// Dependency tracking context shared by every container of one tree.
///
/// The tracker owns the registration table that maps a container identity
/// to the listeners interested in it, and the stack of observers that are
/// currently recording their reads. It is an explicit object: containers
/// hold an `Arc<Tracker>` and consumers receive [`Registration`] or
/// [`Observer`] handles that release their entries when dropped.
///
/// # Examples
///
/// ```
/// use attrmodel::{Model, Tracker};
/// use serde_json::json;
///
/// let tracker = Tracker::new();
/// let user = Model::with_tracker(json!({ "name": "Ada" }), &tracker);
/// assert!(Arc::ptr_eq(user.tracker(), &tracker));
/// # use std::sync::Arc;
/// ```
pub struct Tracker {
    next_id: AtomicUsize,
    state: Mutex<TrackerState>,
    this: Weak<Tracker>,
}

impl Tracker {
    /// Create a new, empty tracker.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Tracker {
            next_id: AtomicUsize::new(0),
            state: Mutex::new(TrackerState::default()),
            this: this.clone(),
        })
    }

    fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a listener on `owner`, filtered by `scope`.
    ///
    /// The listener stays registered until the returned handle is dropped
    /// or removed.
    pub fn register<F>(&self, owner: ContainerId, scope: Scope, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.register_listener(owner, scope, Arc::new(callback), false)
    }

    /// Register a relay that forwards every change on `owner` to a parent.
    pub(crate) fn register_relay<F>(&self, owner: ContainerId, callback: F) -> Registration
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.register_listener(owner, Scope::All, Arc::new(callback), true)
    }

    fn register_listener(
        &self,
        owner: ContainerId,
        scope: Scope,
        callback: Callback,
        relay: bool,
    ) -> Registration {
        let id = self.next_id();
        tracing::trace!(%owner, registration = id, ?scope, relay, "register listener");
        self.state.lock().insert(
            owner,
            Listener {
                id,
                scope,
                callback,
                relay,
                observer: None,
            },
        );
        Registration::new(id, self.this.clone())
    }

    /// Remove a registration. Unknown IDs are ignored.
    pub(crate) fn unregister(&self, registration_id: usize) -> bool {
        let detached = self.state.lock().detach(registration_id);
        detached.is_some()
    }

    /// Number of listeners currently registered on `owner`.
    pub fn listener_count(&self, owner: ContainerId) -> usize {
        self.state
            .lock()
            .listeners
            .get(&owner)
            .map_or(0, |listeners| listeners.len())
    }

    /// Whether a registration ID is still live.
    pub(crate) fn is_registered(&self, registration_id: usize) -> bool {
        self.state.lock().owners.contains_key(&registration_id)
    }

    /// Snapshot of the listeners on `owner`, in registration order.
    pub(crate) fn listeners(&self, owner: ContainerId) -> Vec<Listener> {
        self.state
            .lock()
            .listeners
            .get(&owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether a read right now would be recorded by an observer.
    pub fn is_tracking(&self) -> bool {
        matches!(self.state.lock().observer_stack.last(), Some(Some(_)))
    }

    /// Record a read of `scope` on `owner` by the current observer.
    ///
    /// Outside of an observer (or inside [`Tracker::untracked`]) this does
    /// nothing. Each distinct `(owner, scope)` pair is registered once per
    /// observer run.
    pub fn track_read(&self, owner: ContainerId, scope: Scope) {
        let mut guard = self.state.lock();
        let Some(Some(observer_id)) = guard.observer_stack.last().copied() else {
            return;
        };
        let state = &mut *guard;
        let Some(entry) = state.observers.get_mut(&observer_id) else {
            return;
        };
        if !entry.seen.insert((owner, scope.clone())) {
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entry.registrations.push(id);

        let tracker = self.this.clone();
        let callback: Callback = Arc::new(move |_event: &ChangeEvent| {
            if let Some(tracker) = tracker.upgrade() {
                tracker.run_observer(observer_id);
            }
        });
        state.insert(
            owner,
            Listener {
                id,
                scope,
                callback,
                relay: false,
                observer: Some(observer_id),
            },
        );
    }

    /// Deliver `event` to the listeners of `owner`.
    ///
    /// Returns the number of callbacks that ran.
    pub fn emit(&self, owner: ContainerId, event: &ChangeEvent) -> usize {
        router::route(self, owner, event)
    }

    /// Run `f` now and again whenever anything it read changes.
    ///
    /// # Examples
    ///
    /// ```
    /// use attrmodel::Model;
    /// use serde_json::json;
    /// use std::sync::{Arc, Mutex};
    ///
    /// let user = Model::new(json!({ "name": "Ada" }));
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    ///
    /// let _observer = user.observe({
    ///     let user = user.clone();
    ///     let seen = seen.clone();
    ///     move || {
    ///         let name = user.get("name").as_str().map(str::to_owned);
    ///         seen.lock().unwrap().push(name);
    ///     }
    /// });
    ///
    /// user.set("name", "Grace").unwrap();
    /// assert_eq!(seen.lock().unwrap().len(), 2);
    /// ```
    pub fn observe<F>(&self, f: F) -> Observer
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.state.lock().observers.insert(
            id,
            ObserverEntry {
                run: Arc::new(f),
                registrations: Vec::new(),
                seen: HashSet::new(),
                running: false,
            },
        );
        self.run_observer(id);
        Observer::new(id, self.this.clone())
    }

    /// Re-run an observer, replacing its recorded dependencies.
    pub(crate) fn run_observer(&self, observer_id: usize) {
        let run = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(entry) = state.observers.get_mut(&observer_id) else {
                return;
            };
            if entry.running {
                tracing::trace!(observer = observer_id, "skipping reentrant observer run");
                return;
            }
            entry.running = true;
            entry.seen.clear();
            let stale = std::mem::take(&mut entry.registrations);
            let run = Arc::clone(&entry.run);
            for registration_id in stale {
                state.detach(registration_id);
            }
            state.observer_stack.push(Some(observer_id));
            run
        };

        tracing::trace!(observer = observer_id, "running observer");
        let _frame = StackFrame {
            tracker: self,
            observer: Some(observer_id),
        };
        run();
    }

    /// Number of dependencies recorded by an observer's last run.
    pub(crate) fn dependency_count(&self, observer_id: usize) -> usize {
        self.state
            .lock()
            .observers
            .get(&observer_id)
            .map_or(0, |entry| entry.registrations.len())
    }

    pub(crate) fn remove_observer(&self, observer_id: usize) {
        let removed = {
            let mut state = self.state.lock();
            let Some(entry) = state.observers.remove(&observer_id) else {
                return;
            };
            let detached: Vec<_> = entry
                .registrations
                .iter()
                .filter_map(|&registration_id| state.detach(registration_id))
                .collect();
            (entry, detached)
        };
        tracing::trace!(observer = observer_id, dependencies = removed.1.len(), "removed observer");
    }

    /// Run `f` without recording any reads.
    pub fn untracked<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.state.lock().observer_stack.push(None);
        let _frame = StackFrame {
            tracker: self,
            observer: None,
        };
        f()
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Tracker")
            .field("containers", &state.listeners.len())
            .field("registrations", &state.owners.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}

/// Pops the observer stack when a run ends, even by unwinding.
struct StackFrame<'a> {
    tracker: &'a Tracker,
    observer: Option<usize>,
}

impl Drop for StackFrame<'_> {
    fn drop(&mut self) {
        let mut state = self.tracker.state.lock();
        state.observer_stack.pop();
        if let Some(observer_id) = self.observer {
            if let Some(entry) = state.observers.get_mut(&observer_id) {
                entry.running = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Key;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn registration_drop_unregisters() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();

        let registration = tracker.register(owner, Scope::All, |_| {});
        assert_eq!(tracker.listener_count(owner), 1);

        drop(registration);
        assert_eq!(tracker.listener_count(owner), 0);
    }

    #[test]
    fn observer_reruns_on_tracked_change() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();
        let runs = Arc::new(AtomicUsize::new(0));

        let observer = tracker.observe({
            let tracker = Arc::clone(&tracker);
            let runs = runs.clone();
            move || {
                tracker.track_read(owner, Scope::attribute("name"));
                runs.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(observer.dependency_count(), 1);

        tracker.emit(owner, &ChangeEvent::attribute("name"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        tracker.emit(owner, &ChangeEvent::attribute("age"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        drop(observer);
        assert_eq!(tracker.listener_count(owner), 0);
        tracker.emit(owner, &ChangeEvent::attribute("name"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_reads_register_once() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();

        let _observer = tracker.observe({
            let tracker = Arc::clone(&tracker);
            move || {
                tracker.track_read(owner, Scope::attribute(Key::from("a")));
                tracker.track_read(owner, Scope::attribute(Key::from("a")));
            }
        });

        assert_eq!(tracker.listener_count(owner), 1);
    }

    #[test]
    fn untracked_reads_are_ignored() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();

        let _observer = tracker.observe({
            let tracker = Arc::clone(&tracker);
            move || {
                assert!(tracker.is_tracking());
                tracker.untracked(|| {
                    assert!(!tracker.is_tracking());
                    tracker.track_read(owner, Scope::All);
                });
            }
        });

        assert_eq!(tracker.listener_count(owner), 0);
        assert!(!tracker.is_tracking());
    }
}
