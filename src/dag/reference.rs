// src/dag/reference.rs

//! Symbolic handles to values that only exist after a job has run.

use std::fmt;

use serde_json::Value;

use crate::types::JobId;

/// Dot-separated accessor applied to a producer's result.
///
/// `properties.band_gap` walks into nested objects; a segment made only of
/// digits (e.g. `zt_values.3`) indexes into an array. The empty path refers to
/// the whole result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AttrPath {
    segments: Vec<String>,
}

impl AttrPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-separated path. Empty segments are ignored, so `""` and
    /// `"."` both yield the root path.
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append `suffix` to this path.
    pub fn join(&self, suffix: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(AttrPath::parse(suffix).segments);
        Self { segments }
    }

    /// Apply the path to a value.
    ///
    /// On failure, returns the prefix of the path (as a dotted string) that
    /// could not be found.
    pub fn lookup<'v>(&self, value: &'v Value) -> Result<&'v Value, String> {
        let mut current = value;

        for (idx, segment) in self.segments.iter().enumerate() {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };

            current = match next {
                Some(v) => v,
                None => return Err(self.segments[..=idx].join(".")),
            };
        }

        Ok(current)
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl From<&str> for AttrPath {
    fn from(s: &str) -> Self {
        AttrPath::parse(s)
    }
}

/// A pointer to (part of) the output of a specific job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputReference {
    producer: JobId,
    path: AttrPath,
}

impl OutputReference {
    pub fn new(producer: JobId, path: AttrPath) -> Self {
        Self { producer, path }
    }

    pub fn producer(&self) -> JobId {
        self.producer
    }

    pub fn path(&self) -> &AttrPath {
        &self.path
    }

    /// A reference to a sub-attribute of this reference.
    pub fn at(&self, suffix: &str) -> Self {
        Self {
            producer: self.producer,
            path: self.path.join(suffix),
        }
    }

    /// Apply this reference's path to the producer's completed result.
    pub fn apply(&self, result: &Value) -> Result<Value, ResolveError> {
        self.path
            .lookup(result)
            .cloned()
            .map_err(|missing| ResolveError::MissingAttribute {
                producer: self.producer,
                path: missing,
            })
    }
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{}", self.producer.short())
        } else {
            write!(f, "{}.{}", self.producer.short(), self.path)
        }
    }
}

/// Why a reference could not be turned into a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The producer has no record in the result store.
    Missing { producer: JobId },
    /// The producer finished but failed.
    ProducerFailed { producer: JobId },
    /// The producer succeeded but its result has no such attribute.
    MissingAttribute { producer: JobId, path: String },
}

impl ResolveError {
    pub fn producer(&self) -> JobId {
        match self {
            ResolveError::Missing { producer }
            | ResolveError::ProducerFailed { producer }
            | ResolveError::MissingAttribute { producer, .. } => *producer,
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Missing { producer } => {
                write!(f, "producer {} has no recorded result", producer.short())
            }
            ResolveError::ProducerFailed { producer } => {
                write!(f, "producer {} failed", producer.short())
            }
            ResolveError::MissingAttribute { producer, path } => {
                write!(f, "result of {} has no attribute '{}'", producer.short(), path)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_walk_objects_and_index_arrays() {
        let value = json!({ "properties": { "zt_values": [0.1, 0.7, 0.4] } });

        assert_eq!(AttrPath::parse("properties.zt_values.1").lookup(&value), Ok(&json!(0.7)));
        assert_eq!(AttrPath::parse("").lookup(&value), Ok(&value));
        assert_eq!(
            AttrPath::parse("properties.band_gap").lookup(&value),
            Err("properties.band_gap".to_string())
        );
        assert_eq!(
            AttrPath::parse("properties.zt_values.9").lookup(&value),
            Err("properties.zt_values.9".to_string())
        );
    }

    #[test]
    fn at_extends_the_path() {
        let producer = JobId::new();
        let r = OutputReference::new(producer, AttrPath::parse("a")).at("b.0");

        assert_eq!(r.path().segments(), ["a", "b", "0"]);
        assert_eq!(r.apply(&json!({ "a": { "b": ["x"] } })), Ok(json!("x")));
        assert_eq!(
            r.apply(&json!({ "a": {} })),
            Err(ResolveError::MissingAttribute {
                producer,
                path: "a.b".to_string()
            })
        );
    }
}
