//! # Transform Engine
//!
//! A restricted rewrite language for JSON payloads. A transform is a JSON
//! array of operations, compiled once and applied in order:
//!
//! ```json
//! [
//!   {"op": "set",     "path": "meta.source", "value": "gateway"},
//!   {"op": "set",     "path": "post_id",     "from_param": "id"},
//!   {"op": "remove",  "path": "internal"},
//!   {"op": "rename",  "from": "userId",      "to": "user_id"},
//!   {"op": "default", "path": "page",        "value": 1},
//!   {"op": "map",     "path": "status",      "table": {"A": "active", "I": "inactive"}}
//! ]
//! ```
//!
//! Every path and every key of a literal value is checked against the
//! forbidden-segment list during compilation, so nothing dangerous is ever
//! written. There are no loops, conditionals or expressions.

pub mod error;
pub mod path;

pub use error::TransformError;
pub use path::{FieldPath, FORBIDDEN_SEGMENTS, MAX_PATH_DEPTH};

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Where a `set` operation takes its value from
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSource {
    Literal(Value),
    /// A captured route parameter, written as a string
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set { path: FieldPath, source: ValueSource },
    Remove { path: FieldPath },
    Rename { from: FieldPath, to: FieldPath },
    Default { path: FieldPath, value: Value },
    Map { path: FieldPath, table: Map<String, Value> },
}

/// A compiled, validated list of operations
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transform {
    operations: Vec<Operation>,
}

impl Transform {
    /// Compile a transform document. Any unknown, malformed or unsafe
    /// operation rejects the whole transform.
    pub fn compile(definition: &Value) -> Result<Self, TransformError> {
        let items = definition.as_array().ok_or(TransformError::NotAList)?;
        let operations = items
            .iter()
            .enumerate()
            .map(|(index, item)| compile_operation(index, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { operations })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Apply every operation in order to `doc`.
    ///
    /// Later operations see the results of earlier ones.
    pub fn apply(
        &self,
        doc: &mut Value,
        params: &HashMap<String, String>,
    ) -> Result<(), TransformError> {
        for op in &self.operations {
            match op {
                Operation::Set { path, source } => {
                    let value = match source {
                        ValueSource::Literal(v) => v.clone(),
                        ValueSource::Param(name) => params
                            .get(name)
                            .map(|v| Value::String(v.clone()))
                            .ok_or_else(|| TransformError::MissingParam(name.clone()))?,
                    };
                    path.set(doc, value)?;
                }
                Operation::Remove { path } => {
                    path.remove(doc);
                }
                Operation::Rename { from, to } => {
                    if from == to {
                        continue;
                    }
                    if let Some(value) = from.remove(doc) {
                        to.set(doc, value)?;
                    }
                }
                Operation::Default { path, value } => {
                    if !path.contains(doc) {
                        path.set(doc, value.clone())?;
                    }
                }
                Operation::Map { path, table } => {
                    path.update(doc, |current| {
                        if let Some(replacement) = lookup_key(current).and_then(|k| table.get(&k)) {
                            *current = replacement.clone();
                        }
                    });
                }
            }
        }
        Ok(())
    }

    /// Consuming form of [`Transform::apply`]
    pub fn apply_to(
        &self,
        mut doc: Value,
        params: &HashMap<String, String>,
    ) -> Result<Value, TransformError> {
        self.apply(&mut doc, params)?;
        Ok(doc)
    }
}

/// Scalars are looked up by their JSON text; strings by their content
fn lookup_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn compile_operation(index: usize, item: &Value) -> Result<Operation, TransformError> {
    let malformed = |reason: &str| TransformError::MalformedOperation {
        index,
        reason: reason.to_string(),
    };

    let obj = item.as_object().ok_or_else(|| malformed("operation must be an object"))?;
    let kind = obj.get("op").and_then(Value::as_str).ok_or_else(|| malformed("missing 'op'"))?;

    let allowed: &[&str] = match kind {
        "set" => &["op", "path", "value", "from_param"],
        "remove" => &["op", "path"],
        "rename" => &["op", "from", "to"],
        "default" => &["op", "path", "value"],
        "map" => &["op", "path", "table"],
        other => return Err(TransformError::UnknownOperation { index, kind: other.to_string() }),
    };

    if let Some(extra) = obj.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(malformed(&format!("unexpected field '{}'", extra)));
    }

    let path_field = |name: &str| -> Result<FieldPath, TransformError> {
        let raw = obj
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed(&format!("'{}' must be a string", name)))?;
        FieldPath::parse(raw)
    };

    let literal = |name: &str| -> Result<Value, TransformError> {
        let value = obj.get(name).ok_or_else(|| malformed(&format!("missing '{}'", name)))?;
        check_literal(value, 0).map_err(|reason| malformed(&reason))?;
        Ok(value.clone())
    };

    match kind {
        "set" => {
            let path = path_field("path")?;
            let source = match (obj.get("value"), obj.get("from_param")) {
                (Some(_), None) => ValueSource::Literal(literal("value")?),
                (None, Some(Value::String(name))) if !name.is_empty() => {
                    ValueSource::Param(name.clone())
                }
                (None, Some(_)) => return Err(malformed("'from_param' must be a non-empty string")),
                _ => return Err(malformed("set needs exactly one of 'value' or 'from_param'")),
            };
            Ok(Operation::Set { path, source })
        }
        "remove" => Ok(Operation::Remove { path: path_field("path")? }),
        "rename" => Ok(Operation::Rename { from: path_field("from")?, to: path_field("to")? }),
        "default" => Ok(Operation::Default { path: path_field("path")?, value: literal("value")? }),
        "map" => {
            let path = path_field("path")?;
            let table = obj
                .get("table")
                .and_then(Value::as_object)
                .ok_or_else(|| malformed("'table' must be an object"))?;
            for value in table.values() {
                check_literal(value, 0).map_err(|reason| malformed(&reason))?;
            }
            Ok(Operation::Map { path, table: table.clone() })
        }
        _ => Err(TransformError::UnknownOperation { index, kind: kind.to_string() }),
    }
}

/// Literal values may not smuggle forbidden keys or exceed the depth bound
fn check_literal(value: &Value, depth: usize) -> Result<(), String> {
    if depth > MAX_PATH_DEPTH {
        return Err(format!("literal value nested deeper than {}", MAX_PATH_DEPTH));
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if FORBIDDEN_SEGMENTS.contains(&key.as_str()) {
                    return Err(format!("literal value uses forbidden key '{}'", key));
                }
                check_literal(child, depth + 1)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| check_literal(item, depth + 1)),
        _ => Ok(()),
    }
}
