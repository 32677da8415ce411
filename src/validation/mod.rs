//! Declarative field validation on top of model change events.
//!
//! Rules are data: a model re-derives its error set from them whenever
//! [`Model::errors`](crate::Model::errors) is read, and reads made by an
//! observer re-run it when the model changes or fields are marked.

mod length;
mod validations;

pub use length::LengthRule;
pub(crate) use validations::ValidationState;
pub use validations::{Errors, Rule, Validations};
