//! # attrmodel
//!
//! Reactive attribute containers for data binding.
//!
//! A [`Model`] wraps a nested tree of mappings, sequences and scalars and
//! exposes every level as a reactive container:
//!
//! - Reads never fault. A missing attribute yields a placeholder, and chains
//!   of reads through placeholders stay placeholders (`a.b.c.d` is nil).
//! - Writes through a placeholder materialize it, and every absent ancestor,
//!   before applying the change.
//! - Every read is recorded with the container's [`Tracker`] and every write
//!   emits a `changed` event, so [`Observer`]s and listeners re-run only when
//!   something they depend on changed.
//!
//! [`ArrayModel`] is the ordered sibling of `Model`, and [`Validations`]
//! derive error sets from declarative per-field rules.
//!
//! ```
//! use attrmodel::Model;
//! use serde_json::json;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let user = Model::new(json!({ "name": "Ada" }));
//! let renders = Arc::new(AtomicUsize::new(0));
//!
//! let _listener = user.on_change({
//!     let renders = renders.clone();
//!     move |_| {
//!         renders.fetch_add(1, Ordering::SeqCst);
//!     }
//! });
//!
//! user.get("address").set("city", "Lisbon").unwrap();
//! assert_eq!(user.get("address").get("city").as_str(), Some("Lisbon"));
//! assert!(user.get("phone").get("mobile").is_nil());
//! assert_eq!(renders.load(Ordering::SeqCst), 2);
//! ```

pub mod error;
pub mod model;
pub mod runtime;
pub mod validation;

// Re-export main types for convenience
pub use error::{ModelError, ModelResult, UndefinedAccess};
pub use model::{ArrayModel, Input, Key, Model, Value};
pub use runtime::{ChangeEvent, ContainerId, Observer, Registration, Scope, Target, Tracker};
pub use validation::{Errors, LengthRule, Rule, Validations};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn it_works() {
        let model = Model::new(json!({ "count": 0 }));
        assert_eq!(model.get("count"), Value::Int(0));
        model.set("count", 42).unwrap();
        assert_eq!(model.get("count"), Value::Int(42));
    }
}
