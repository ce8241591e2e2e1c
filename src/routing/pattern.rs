//! Compiled route path patterns
//!
//! A pattern is a `/`-separated list of literal segments and named
//! parameters, written `:name` or `{name}`. Trailing slashes are ignored on
//! both sides.

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("Pattern '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("Pattern '{0}' has a parameter without a name")]
    UnnamedParameter(String),

    #[error("Pattern '{pattern}' captures '{name}' more than once")]
    DuplicateParameter { pattern: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| PatternError::MissingLeadingSlash(pattern.to_string()))?;
        let rest = rest.trim_end_matches('/');

        let mut segments = Vec::new();
        let mut seen = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if part.is_empty() {
                    return Err(PatternError::EmptySegment(pattern.to_string()));
                }
                let name = part
                    .strip_prefix(':')
                    .or_else(|| part.strip_prefix('{').and_then(|p| p.strip_suffix('}')));
                match name {
                    Some("") => return Err(PatternError::UnnamedParameter(pattern.to_string())),
                    Some(name) => {
                        if seen.contains(&name) {
                            return Err(PatternError::DuplicateParameter {
                                pattern: pattern.to_string(),
                                name: name.to_string(),
                            });
                        }
                        seen.push(name);
                        segments.push(Segment::Param(name.to_string()));
                    }
                    None => segments.push(Segment::Literal(part.to_string())),
                }
            }
        }

        Ok(Self { raw: pattern.to_string(), segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of literal segments, used to rank equally prioritised routes
    pub fn literal_count(&self) -> usize {
        self.segments.iter().filter(|s| matches!(s, Segment::Literal(_))).count()
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match already split, percent-decoded path segments.
    ///
    /// Parameters never match an empty segment.
    pub fn matches(&self, path: &[String]) -> Option<HashMap<String, String>> {
        if path.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(path) {
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if value.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), value.clone());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Display for CompiledPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split an inbound path into percent-decoded segments.
///
/// Leading and trailing slashes are dropped; inner empty segments are kept so
/// that `//` never silently matches. Returns `None` for invalid UTF-8.
pub fn split_path(path: &str) -> Option<Vec<String>> {
    let trimmed = path.trim_start_matches('/').trim_end_matches('/');
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    trimmed
        .split('/')
        .map(|segment| urlencoding::decode(segment).ok().map(|s| s.into_owned()))
        .collect()
}
