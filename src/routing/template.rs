//! Upstream path templates
//!
//! Placeholders are `:name` (a whole segment) or `{name}` (anywhere inside a
//! segment). Substituted values are percent-encoded.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Template placeholder '{0}' has no captured value")]
    MissingValue(String),

    #[error("Template '{0}' has an unterminated placeholder")]
    Unterminated(String),
}

enum Piece<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    for (i, segment) in template.split('/').enumerate() {
        if i > 0 {
            pieces.push(Piece::Text("/"));
        }
        if let Some(name) = segment.strip_prefix(':').filter(|n| !n.is_empty()) {
            pieces.push(Piece::Placeholder(name));
            continue;
        }

        let mut rest = segment;
        while let Some(start) = rest.find('{') {
            let end = rest[start..]
                .find('}')
                .map(|offset| start + offset)
                .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
            if start > 0 {
                pieces.push(Piece::Text(&rest[..start]));
            }
            pieces.push(Piece::Placeholder(&rest[start + 1..end]));
            rest = &rest[end + 1..];
        }
        if !rest.is_empty() {
            pieces.push(Piece::Text(rest));
        }
    }
    Ok(pieces)
}

/// Names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    parse(template)
        .map(|pieces| {
            pieces
                .into_iter()
                .filter_map(|p| match p {
                    Piece::Placeholder(name) => Some(name.to_string()),
                    Piece::Text(_) => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Substitute captured parameters into `template`
pub fn render(template: &str, params: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    for piece in parse(template)? {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Placeholder(name) => {
                let value =
                    params.get(name).ok_or_else(|| TemplateError::MissingValue(name.to_string()))?;
                out.push_str(&urlencoding::encode(value));
            }
        }
    }
    Ok(out)
}

/// Join a connector base URL, a rendered upstream path and the inbound query
pub fn upstream_url(base_url: &str, path: &str, query: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    let mut url = if path.is_empty() || path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    };
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(query);
    }
    url
}
