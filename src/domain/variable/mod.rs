//! Variable pool - producer-scoped outputs, typed paths and templates

mod error;
mod path;
mod pool;
mod template;

pub use error::VariableError;
pub use path::{PathSegment, VariablePath};
pub use pool::VariablePool;
pub use template::{placeholder_names, render_template, value_to_string};
