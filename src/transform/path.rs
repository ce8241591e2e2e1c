//! Dotted field paths and the tree walks over them
//!
//! Paths are validated once at compile time. Walks operate on a plain
//! `serde_json::Value` tree: objects are keyed maps, and numeric segments
//! index into arrays that already exist.

use super::error::TransformError;
use serde_json::{Map, Value};
use std::fmt;

/// Maximum number of segments in a field path
pub const MAX_PATH_DEPTH: usize = 16;

/// Segment names never accepted in a path
pub const FORBIDDEN_SEGMENTS: &[&str] = &[
    "__proto__",
    "constructor",
    "prototype",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();

        if segments.len() > MAX_PATH_DEPTH {
            return Err(TransformError::TooDeep { path: raw.to_string(), max: MAX_PATH_DEPTH });
        }

        for segment in &segments {
            if segment.trim().is_empty() {
                return Err(TransformError::EmptySegment { path: raw.to_string() });
            }
            if FORBIDDEN_SEGMENTS.contains(&segment.as_str()) {
                return Err(TransformError::ForbiddenSegment {
                    path: raw.to_string(),
                    segment: segment.clone(),
                });
            }
        }

        Ok(Self { raw: raw.to_string(), segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn split_last(&self) -> (&[String], &str) {
        match self.segments.split_last() {
            Some((last, parents)) => (parents, last.as_str()),
            // parse never yields an empty path
            None => (&[], ""),
        }
    }

    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments.iter().try_fold(root, |node, segment| child(node, segment))
    }

    fn get_mut<'v>(&self, root: &'v mut Value) -> Option<&'v mut Value> {
        self.segments.iter().try_fold(root, |node, segment| child_mut(node, segment))
    }

    pub fn contains(&self, root: &Value) -> bool {
        self.get(root).is_some()
    }

    /// Write `value`, creating intermediate objects for missing keys
    pub fn set(&self, root: &mut Value, value: Value) -> Result<(), TransformError> {
        let (parents, last) = self.split_last();

        let mut node = root;
        for segment in parents {
            node = match node {
                Value::Object(map) => {
                    map.entry(segment.clone()).or_insert_with(|| Value::Object(Map::new()))
                }
                Value::Array(items) => {
                    match segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                        Some(item) => item,
                        None => return Err(self.not_a_container(segment)),
                    }
                }
                _ => return Err(self.not_a_container(segment)),
            };
        }

        match node {
            Value::Object(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            Value::Array(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(self.not_a_container(last)),
            },
            _ => Err(self.not_a_container(last)),
        }
    }

    /// Remove and return the value at this path, if present
    pub fn remove(&self, root: &mut Value) -> Option<Value> {
        let (parents, last) = self.split_last();

        let parent = parents.iter().try_fold(root, |node, segment| child_mut(node, segment))?;
        match parent {
            Value::Object(map) => map.remove(last),
            Value::Array(items) => {
                let index = last.parse::<usize>().ok().filter(|i| *i < items.len())?;
                Some(items.remove(index))
            }
            _ => None,
        }
    }

    /// Replace the value in place through `f`, if present
    pub fn update(&self, root: &mut Value, f: impl FnOnce(&mut Value)) {
        if let Some(target) = self.get_mut(root) {
            f(target);
        }
    }

    fn not_a_container(&self, segment: &str) -> TransformError {
        TransformError::NotAContainer { path: self.raw.clone(), segment: segment.to_string() }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn child<'v>(node: &'v Value, segment: &str) -> Option<&'v Value> {
    match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

fn child_mut<'v>(node: &'v mut Value, segment: &str) -> Option<&'v mut Value> {
    match node {
        Value::Object(map) => map.get_mut(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}
