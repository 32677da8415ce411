//! Dependency tracking and change notification.
//!
//! This module provides the infrastructure every container shares: the
//! [`Tracker`] registration table, the routing rules that decide which
//! listeners hear a change, and the disposable handles consumers hold.

mod observer;
mod registration;
mod router;
mod tracker;

pub use observer::Observer;
pub use registration::Registration;
pub use router::{is_relevant, ChangeEvent, Scope, Target};
pub use tracker::{ContainerId, Tracker};
