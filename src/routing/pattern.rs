//! Route pattern parsing.
//!
//! Patterns use the underlying router's syntax: static segments,
//! `{name}` parameters and a trailing `{*name}` catch-all.
//!
//! # Design Decisions
//! - Two patterns conflict when their shapes match, i.e. they are equal
//!   once parameter names are erased
//! - Validation happens at registration, never at request time

use crate::routing::RouteError;

/// A validated route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    shape: String,
}

impl Pattern {
    /// Parse and validate a route pattern.
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let invalid = |reason: &str| RouteError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;

        let mut shape = String::with_capacity(raw.len());
        let segments: Vec<&str> = rest.split('/').collect();
        for (i, segment) in segments.iter().enumerate() {
            shape.push('/');
            if let Some(inner) = segment.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .ok_or_else(|| invalid("unterminated parameter"))?;
                let (catch_all, name) = match name.strip_prefix('*') {
                    Some(name) => (true, name),
                    None => (false, name),
                };
                if name.is_empty() || name.contains(['{', '}', '*']) {
                    return Err(invalid("bad parameter name"));
                }
                if catch_all && i + 1 != segments.len() {
                    return Err(invalid("catch-all must be the last segment"));
                }
                shape.push_str(if catch_all { "{*}" } else { "{}" });
            } else if segment.starts_with([':', '*']) {
                return Err(invalid("use {name} or {*name} for parameters"));
            } else if segment.contains(['{', '}']) {
                return Err(invalid("parameters must span a whole segment"));
            } else {
                shape.push_str(segment);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            shape,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The pattern with parameter names erased.
    pub fn shape(&self) -> &str {
        &self.shape
    }
}
