use super::tracker::Tracker;
use std::fmt;
use std::sync::Weak;

/// RAII handle for a listener registered with a [`Tracker`].
///
/// Dropping the handle unregisters the listener. A registration never
/// keeps its tracker alive.
#[must_use = "dropping a Registration unregisters its listener"]
pub struct Registration {
    id: usize,
    tracker: Weak<Tracker>,
}

impl Registration {
    pub(crate) fn new(id: usize, tracker: Weak<Tracker>) -> Self {
        Self { id, tracker }
    }

    /// The registration's unique ID within its tracker.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|tracker| tracker.is_registered(self.id))
    }

    /// Unregister now rather than at end of scope.
    pub fn remove(self) {
        drop(self);
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration").field("id", &self.id).finish()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.unregister(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{ContainerId, Scope};

    #[test]
    fn remove_deactivates() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();
        let registration = tracker.register(owner, Scope::All, |_| {});
        let id = registration.id();

        assert!(registration.is_active());
        registration.remove();
        assert!(!tracker.is_registered(id));
    }

    #[test]
    fn outliving_the_tracker_is_harmless() {
        let tracker = Tracker::new();
        let owner = ContainerId::next();
        let registration = tracker.register(owner, Scope::All, |_| {});

        drop(tracker);
        assert!(!registration.is_active());
    }
}
