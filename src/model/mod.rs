//! Reactive containers and the values they hold.

mod array;
mod model;
mod value;
pub(crate) mod wrap;

pub use array::ArrayModel;
pub use model::Model;
pub use value::{Input, Key, Value};
