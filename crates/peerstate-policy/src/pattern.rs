//! Path patterns for policy rules.
//!
//! Patterns are slash-delimited, one element per path segment:
//!
//! | Element   | Matches                                   |
//! |-----------|-------------------------------------------|
//! | `public`  | the literal segment                       |
//! | `:id`     | exactly one segment, captured as `id`     |
//! | `:id?`    | zero or one segment                       |
//! | `:rest+`  | one or more segments, captured as a list  |
//! | `:rest*`  | zero or more segments                     |
//! | `*`       | zero or more segments, captured by index  |
//!
//! Captured segments are percent-decoded. A trailing slash in the path is
//! ignored.

use std::collections::BTreeMap;

use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repeat {
    One,
    Optional,
    OneOrMore,
    ZeroOrMore,
}

impl Repeat {
    fn bounds(self) -> (usize, usize) {
        match self {
            Repeat::One => (1, 1),
            Repeat::Optional => (0, 1),
            Repeat::OneOrMore => (1, usize::MAX),
            Repeat::ZeroOrMore => (0, usize::MAX),
        }
    }

    fn is_list(self) -> bool {
        matches!(self, Repeat::OneOrMore | Repeat::ZeroOrMore)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Element {
    Literal(String),
    Param { name: String, repeat: Repeat },
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    source: String,
    elements: Vec<Element>,
}

/// A captured parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    List(Vec<String>),
}

/// The result of matching a path against a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathMatch {
    path: String,
    params: BTreeMap<String, ParamValue>,
}

impl PathMatch {
    /// The matched path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// A single-segment parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        match self.params.get(name)? {
            ParamValue::Single(value) => Some(value),
            ParamValue::List(_) => None,
        }
    }

    /// A repeated parameter; an absent optional list is empty.
    pub fn segments(&self, name: &str) -> &[String] {
        match self.params.get(name) {
            Some(ParamValue::List(values)) => values,
            Some(ParamValue::Single(value)) => std::slice::from_ref(value),
            None => &[],
        }
    }

    /// All captured parameters.
    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }
}

impl PathPattern {
    /// Compile a pattern.
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = |reason: &str| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let body = pattern
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;

        let mut elements = Vec::new();
        let mut wildcards = 0usize;
        for raw in body.split('/').filter(|s| !s.is_empty()) {
            let element = if raw == "*" {
                let name = wildcards.to_string();
                wildcards += 1;
                Element::Param {
                    name,
                    repeat: Repeat::ZeroOrMore,
                }
            } else if let Some(spec) = raw.strip_prefix(':') {
                let (name, repeat) = match spec.as_bytes().last() {
                    Some(b'?') => (&spec[..spec.len() - 1], Repeat::Optional),
                    Some(b'+') => (&spec[..spec.len() - 1], Repeat::OneOrMore),
                    Some(b'*') => (&spec[..spec.len() - 1], Repeat::ZeroOrMore),
                    _ => (spec, Repeat::One),
                };
                let valid_name = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid_name {
                    return Err(invalid("parameter names must be [A-Za-z0-9_]+"));
                }
                if elements.iter().any(
                    |e| matches!(e, Element::Param { name: existing, .. } if existing == name),
                ) {
                    return Err(invalid("duplicate parameter name"));
                }
                Element::Param {
                    name: name.to_string(),
                    repeat,
                }
            } else if raw.contains(':') || raw.contains('*') {
                return Err(invalid("parameters must occupy a whole segment"));
            } else {
                Element::Literal(raw.to_string())
            };
            elements.push(element);
        }

        Ok(Self {
            source: pattern.to_string(),
            elements,
        })
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `path`, returning captured parameters on success.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let body = path.strip_prefix('/')?;
        let mut segments: Vec<&str> = if body.is_empty() {
            Vec::new()
        } else {
            body.split('/').collect()
        };
        if segments.len() > 1 && segments.last() == Some(&"") {
            segments.pop();
        }

        let mut params = BTreeMap::new();
        if self.match_from(0, &segments, &mut params) {
            Some(PathMatch {
                path: path.to_string(),
                params,
            })
        } else {
            None
        }
    }

    fn match_from(
        &self,
        index: usize,
        segments: &[&str],
        params: &mut BTreeMap<String, ParamValue>,
    ) -> bool {
        let Some(element) = self.elements.get(index) else {
            return segments.is_empty();
        };

        match element {
            Element::Literal(literal) => match segments.split_first() {
                Some((first, rest)) if first == literal => self.match_from(index + 1, rest, params),
                _ => false,
            },
            Element::Param { name, repeat } => {
                let (min, max) = repeat.bounds();
                let max = max.min(segments.len());
                if min > max {
                    return false;
                }
                // Greedy: try the longest capture first.
                for take in (min..=max).rev() {
                    let (captured, rest) = segments.split_at(take);
                    if captured.iter().any(|s| s.is_empty()) {
                        continue;
                    }
                    let Some(decoded) = captured
                        .iter()
                        .map(|s| percent_decode(s))
                        .collect::<Option<Vec<_>>>()
                    else {
                        return false;
                    };

                    let value = if repeat.is_list() {
                        Some(ParamValue::List(decoded))
                    } else {
                        decoded.into_iter().next().map(ParamValue::Single)
                    };
                    match value {
                        Some(value) => params.insert(name.clone(), value),
                        None => params.remove(name),
                    };

                    if self.match_from(index + 1, rest, params) {
                        return true;
                    }
                    params.remove(name);
                }
                false
            }
        }
    }
}

/// Decode `%XX` escapes. Malformed escapes or invalid UTF-8 fail the match.
fn percent_decode(segment: &str) -> Option<String> {
    if !segment.contains('%') {
        return Some(segment.to_string());
    }
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let pair = bytes.get(i + 1..i + 3)?;
            let mut decoded = [0u8; 1];
            hex::decode_to_slice(pair, &mut decoded).ok()?;
            out.push(decoded[0]);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
