//! Path expressions locating values inside a vendor response.
//!
//! The grammar is deliberately small: a path is a chain of field names and
//! array indices, e.g. `choices[0].message.content` or `[1][2]`.
//!
//! - a name is one or more Unicode letters, ASCII digits or underscores;
//! - an index is `[`, one or more ASCII digits, `]`;
//! - the first component stands alone, later names are introduced by `.`
//!   and later indices directly by `[`.
//!
//! Paths are parsed once, when the adapter configuration is built. Walking a
//! parsed path never re-validates it.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ExtractionError;

static VALID_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[\p{L}0-9_]+|\[[0-9]+\])(?:\.[\p{L}0-9_]+|\[[0-9]+\])*$")
        .expect("path grammar regex is valid")
});

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([0-9]+)\]|([\p{L}0-9_]+)").expect("segment regex is valid")
});

/// Returns `true` if `path` satisfies the path grammar.
pub fn is_valid(path: &str) -> bool {
    VALID_PATH.is_match(path)
}

/// A path string rejected by the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{path}' is not a valid path: {reason}")]
pub struct PathSyntaxError {
    pub path: String,
    pub reason: &'static str,
}

/// One component of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

/// A validated path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, PathSyntaxError> {
        if !is_valid(path) {
            return Err(PathSyntaxError {
                path: path.to_string(),
                reason: "expected names separated by '.' and indices written as '[n]'",
            });
        }

        let mut segments = Vec::new();
        for caps in SEGMENT.captures_iter(path) {
            if let Some(index) = caps.get(1) {
                let index = index.as_str().parse().map_err(|_| PathSyntaxError {
                    path: path.to_string(),
                    reason: "array index is too large",
                })?;
                segments.push(Segment::Index(index));
            } else if let Some(name) = caps.get(2) {
                segments.push(Segment::Field(name.as_str().to_string()));
            }
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walk `root` along the path and return the node it designates.
    ///
    /// On failure the error names the prefix of the path ending with the
    /// segment that could not be resolved.
    pub fn extract<'a>(&self, root: &'a Value) -> Result<&'a Value, ExtractionError> {
        let mut node = root;
        for (i, segment) in self.segments.iter().enumerate() {
            let next = match (segment, node) {
                (Segment::Field(name), Value::Object(map)) => map
                    .get(name)
                    .ok_or_else(|| format!("'{}' field not found", name)),
                (Segment::Index(index), Value::Array(items)) => {
                    items.get(*index).ok_or_else(|| {
                        format!(
                            "index {} not found in array of {} element(s)",
                            index,
                            items.len()
                        )
                    })
                }
                (Segment::Field(name), other) => Err(format!(
                    "cannot look up field '{}' in {}",
                    name,
                    kind_of(other)
                )),
                (Segment::Index(index), other) => Err(format!(
                    "cannot take index {} of {}",
                    index,
                    kind_of(other)
                )),
            };

            node = next.map_err(|reason| ExtractionError::NotFound {
                path: self.raw.clone(),
                prefix: render_segments(&self.segments[..=i]),
                reason,
            })?;
        }
        Ok(node)
    }

    /// Extract a scalar as text. Numbers and booleans render as their JSON
    /// text; strings are returned unquoted.
    pub fn extract_text(&self, root: &Value) -> Result<String, ExtractionError> {
        match self.extract(root)? {
            Value::String(s) => Ok(s.clone()),
            v @ (Value::Number(_) | Value::Bool(_)) => Ok(v.to_string()),
            other => Err(self.wrong_kind("a scalar", other)),
        }
    }

    pub fn extract_array<'a>(&self, root: &'a Value) -> Result<&'a Vec<Value>, ExtractionError> {
        match self.extract(root)? {
            Value::Array(items) => Ok(items),
            other => Err(self.wrong_kind("an array", other)),
        }
    }

    pub fn extract_object<'a>(
        &self,
        root: &'a Value,
    ) -> Result<&'a serde_json::Map<String, Value>, ExtractionError> {
        match self.extract(root)? {
            Value::Object(map) => Ok(map),
            other => Err(self.wrong_kind("an object", other)),
        }
    }

    /// Extract a token count. Accepts a JSON integer or a string of digits.
    pub fn extract_u32(&self, root: &Value) -> Result<u32, ExtractionError> {
        let node = self.extract(root)?;
        let parsed = match node {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.wrong_kind("a non-negative integer", node))
    }

    fn wrong_kind(&self, expected: &'static str, found: &Value) -> ExtractionError {
        ExtractionError::WrongKind {
            path: self.raw.clone(),
            expected,
            found: kind_of(found).to_string(),
        }
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for JsonPath {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> serde::Deserialize<'de> for JsonPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for JsonPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.raw)
    }
}

/// Human name of a JSON value's kind, used in error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn render_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Field(name) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(name);
            }
            Segment::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
        }
    }
    out
}
