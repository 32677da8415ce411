use super::tracker::Tracker;
use std::fmt;
use std::sync::Weak;

/// A consumer that re-runs whenever an attribute it read changes.
///
/// Created by [`Tracker::observe`] or [`crate::Model::observe`]. The
/// function runs immediately to record its dependencies, and each re-run
/// replaces them with whatever that run read. Dropping the observer
/// releases every registration it holds.
pub struct Observer {
    id: usize,
    tracker: Weak<Tracker>,
}

impl Observer {
    pub(crate) fn new(id: usize, tracker: Weak<Tracker>) -> Self {
        Self { id, tracker }
    }

    /// Manually re-run the observer.
    pub fn run(&self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.run_observer(self.id);
        }
    }

    /// Number of distinct reads recorded by the last run.
    pub fn dependency_count(&self) -> usize {
        self.tracker
            .upgrade()
            .map_or(0, |tracker| tracker.dependency_count(self.id))
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").field("id", &self.id).finish()
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        if let Some(tracker) = self.tracker.upgrade() {
            tracker.remove_observer(self.id);
        }
    }
}
