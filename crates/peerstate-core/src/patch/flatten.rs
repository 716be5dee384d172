//! Leaf-level expansion of patch operations.
//!
//! Used only for authorization: a rule can then allow or deny each terminal
//! value an operation touches, not just its top-level path.

use serde_json::Value;

use crate::pointer::{escape, JsonPointer};
use crate::types::Operation;

/// Expand `operation` into one operation per terminal value it touches.
///
/// `add`, `replace` and `test` walk their carried value. `remove` walks
/// whatever currently lives at its path in `document`. A terminal at the
/// top level yields nothing extra, since the operation itself covers it.
/// `move` and `copy` yield nothing.
pub fn flatten(operation: &Operation, document: &Value) -> Vec<Operation> {
    let root = match operation {
        Operation::Add { value, .. }
        | Operation::Replace { value, .. }
        | Operation::Test { value, .. } => Some(value),
        Operation::Remove { path } => JsonPointer::parse(path)
            .ok()
            .and_then(|pointer| pointer.get(document)),
        Operation::Move { .. } | Operation::Copy { .. } => None,
    };

    let mut leaves = Vec::new();
    if let Some(root) = root {
        for (child, value) in children(root) {
            walk(&child, value, &mut |suffix, leaf| {
                let path = format!("{}{}", operation.path(), suffix);
                leaves.push(operation.retarget(path, Some(leaf.clone())));
            });
        }
    }
    leaves
}

/// The `(escaped token, value)` pairs directly under a container.
fn children(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (escape(k), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn walk(token: &str, value: &Value, emit: &mut dyn FnMut(&str, &Value)) {
    let suffix = format!("/{token}");
    let nested = children(value);
    if nested.is_empty() {
        // Scalars and empty containers are terminals.
        emit(&suffix, value);
        return;
    }
    for (child, child_value) in nested {
        walk(&child, child_value, &mut |rest, leaf| {
            emit(&format!("{suffix}{rest}"), leaf)
        });
    }
}
