//! Functional application of a single JSON-Patch operation.

use serde_json::Value;

use crate::error::PatchError;
use crate::pointer::{parse_index, JsonPointer};
use crate::types::Operation;

/// Optional document-shape check run before an operation is applied.
pub type Validator = dyn Fn(&Value, &Operation) -> Result<(), String> + Send + Sync;

/// Apply `operation` to `document`, returning the new document.
///
/// The input is never mutated.
pub fn apply_operation(document: &Value, operation: &Operation) -> Result<Value, PatchError> {
    apply_operation_with(document, operation, None)
}

/// Apply `operation` after running `validator` against the current document.
pub fn apply_operation_with(
    document: &Value,
    operation: &Operation,
    validator: Option<&Validator>,
) -> Result<Value, PatchError> {
    if let Some(validate) = validator {
        validate(document, operation).map_err(PatchError::Validation)?;
    }

    let path = JsonPointer::parse(operation.path())?;
    reject_reserved(operation.path(), &path)?;

    let mut next = document.clone();
    match operation {
        Operation::Add { value, .. } => add(&mut next, &path, value.clone())?,
        Operation::Remove { .. } => {
            remove(&mut next, &path)?;
        }
        Operation::Replace { value, .. } => {
            *lookup_mut(&mut next, &path)? = value.clone();
        }
        Operation::Test { value, .. } => {
            let current = path
                .get(&next)
                .ok_or_else(|| PatchError::PathNotFound(operation.path().to_string()))?;
            if current != value {
                return Err(PatchError::TestFailed(operation.path().to_string()));
            }
        }
        Operation::Move { from, .. } => {
            let source = JsonPointer::parse(from)?;
            reject_reserved(from, &source)?;
            if source.is_proper_prefix_of(&path) {
                return Err(PatchError::MoveIntoChild {
                    from: from.clone(),
                    path: operation.path().to_string(),
                });
            }
            let moved = remove(&mut next, &source)?;
            add(&mut next, &path, moved)?;
        }
        Operation::Copy { from, .. } => {
            let source = JsonPointer::parse(from)?;
            reject_reserved(from, &source)?;
            let copied = source
                .get(&next)
                .cloned()
                .ok_or_else(|| PatchError::PathNotFound(from.clone()))?;
            add(&mut next, &path, copied)?;
        }
    }
    Ok(next)
}

/// Reject writes into prototype-style meta slots.
fn reject_reserved(raw: &str, pointer: &JsonPointer) -> Result<(), PatchError> {
    let tokens = pointer.tokens();
    for (i, token) in tokens.iter().enumerate() {
        let reserved = token == "__proto__"
            || (token == "prototype" && i > 0 && tokens[i - 1] == "constructor");
        if reserved {
            return Err(PatchError::ReservedSegment {
                path: raw.to_string(),
                segment: token.clone(),
            });
        }
    }
    Ok(())
}

fn add(document: &mut Value, path: &JsonPointer, value: Value) -> Result<(), PatchError> {
    let Some((parent, last)) = path.split_last() else {
        *document = value;
        return Ok(());
    };
    match lookup_mut(document, &parent)? {
        Value::Object(map) => {
            map.insert(last.to_string(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = if last == "-" {
                items.len()
            } else {
                array_index(path, last)?
            };
            if index > items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::NotAContainer(parent.to_string())),
    }
}

fn remove(document: &mut Value, path: &JsonPointer) -> Result<Value, PatchError> {
    let Some((parent, last)) = path.split_last() else {
        return Ok(std::mem::take(document));
    };
    match lookup_mut(document, &parent)? {
        Value::Object(map) => map
            .shift_remove(last)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = array_index(path, last)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::NotAContainer(parent.to_string())),
    }
}

fn lookup_mut<'a>(document: &'a mut Value, path: &JsonPointer) -> Result<&'a mut Value, PatchError> {
    let mut node = document;
    for token in path.tokens() {
        node = match node {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => parse_index(token).and_then(|i| items.get_mut(i)),
            _ => None,
        }
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    }
    Ok(node)
}

fn array_index(path: &JsonPointer, token: &str) -> Result<usize, PatchError> {
    parse_index(token).ok_or_else(|| PatchError::InvalidIndex {
        path: path.to_string(),
        index: token.to_string(),
    })
}
