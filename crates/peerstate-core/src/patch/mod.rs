//! JSON Patch support: application and leaf-level flattening.

mod apply;
mod flatten;

pub use apply::{apply_operation, apply_operation_with, Validator};
pub use flatten::flatten;
