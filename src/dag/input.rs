// src/dag/input.rs

//! Job input values: literals, references, and containers of either.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::dag::reference::{OutputReference, ResolveError};
use crate::store::{JobRecord, ResultStore};
use crate::types::JobId;

/// A single job parameter as seen at graph-build time.
///
/// References may appear at any depth inside lists and maps; resolution
/// replaces each one with the referenced value and leaves literals as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Literal(Value),
    Ref(OutputReference),
    List(Vec<Input>),
    Map(BTreeMap<String, Input>),
    /// Resolves to `null` instead of failing the consumer when the wrapped
    /// input cannot be resolved. The consumer still waits for its producers
    /// to reach a terminal state.
    Optional(Box<Input>),
}

impl Input {
    pub fn literal(value: impl Into<Value>) -> Self {
        Input::Literal(value.into())
    }

    pub fn null() -> Self {
        Input::Literal(Value::Null)
    }

    pub fn optional(inner: impl Into<Input>) -> Self {
        Input::Optional(Box::new(inner.into()))
    }

    /// All references contained in this input, depth-first.
    pub fn references(&self) -> Vec<&OutputReference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a OutputReference>) {
        match self {
            Input::Literal(_) => {}
            Input::Ref(r) => out.push(r),
            Input::List(items) => items.iter().for_each(|i| i.collect_references(out)),
            Input::Map(entries) => entries.values().for_each(|i| i.collect_references(out)),
            Input::Optional(inner) => inner.collect_references(out),
        }
    }

    /// Producers whose failure fails the consumer: every referenced job
    /// except those reached only through [`Input::Optional`].
    pub fn required_producers(&self) -> Vec<JobId> {
        let mut ids = Vec::new();
        self.collect_required(&mut ids);
        ids
    }

    fn collect_required(&self, out: &mut Vec<JobId>) {
        match self {
            Input::Literal(_) | Input::Optional(_) => {}
            Input::Ref(r) => {
                if !out.contains(&r.producer()) {
                    out.push(r.producer());
                }
            }
            Input::List(items) => items.iter().for_each(|i| i.collect_required(out)),
            Input::Map(entries) => entries.values().for_each(|i| i.collect_required(out)),
        }
    }

    /// Distinct producer jobs referenced by this input, in first-seen order.
    pub fn producers(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = Vec::new();
        for r in self.references() {
            if !ids.contains(&r.producer()) {
                ids.push(r.producer());
            }
        }
        ids
    }

    /// Whether this input contains no references at all.
    pub fn is_concrete(&self) -> bool {
        self.references().is_empty()
    }

    /// Depth-first substitution of every reference with its value from the
    /// result store.
    pub fn resolve(&self, store: &ResultStore) -> Result<Value, ResolveError> {
        match self {
            Input::Literal(v) => Ok(v.clone()),
            Input::Ref(r) => match store.get(&r.producer()) {
                Some(JobRecord::Succeeded(result)) => r.apply(result),
                Some(JobRecord::Failed(_)) => Err(ResolveError::ProducerFailed {
                    producer: r.producer(),
                }),
                None => Err(ResolveError::Missing {
                    producer: r.producer(),
                }),
            },
            Input::List(items) => items
                .iter()
                .map(|i| i.resolve(store))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Input::Map(entries) => {
                let mut map = Map::new();
                for (key, input) in entries {
                    map.insert(key.clone(), input.resolve(store)?);
                }
                Ok(Value::Object(map))
            }
            Input::Optional(inner) => Ok(inner.resolve(store).unwrap_or(Value::Null)),
        }
    }
}

impl From<Value> for Input {
    fn from(v: Value) -> Self {
        Input::Literal(v)
    }
}

impl From<OutputReference> for Input {
    fn from(r: OutputReference) -> Self {
        Input::Ref(r)
    }
}

impl From<&OutputReference> for Input {
    fn from(r: &OutputReference) -> Self {
        Input::Ref(r.clone())
    }
}

impl From<Vec<Input>> for Input {
    fn from(items: Vec<Input>) -> Self {
        Input::List(items)
    }
}

impl From<BTreeMap<String, Input>> for Input {
    fn from(entries: BTreeMap<String, Input>) -> Self {
        Input::Map(entries)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Literal(Value::from(s))
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Literal(Value::from(s))
    }
}

impl From<f64> for Input {
    fn from(v: f64) -> Self {
        Input::Literal(Value::from(v))
    }
}

impl From<i64> for Input {
    fn from(v: i64) -> Self {
        Input::Literal(Value::from(v))
    }
}

impl From<bool> for Input {
    fn from(v: bool) -> Self {
        Input::Literal(Value::from(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::reference::AttrPath;
    use crate::errors::{FailureKind, JobFailure};
    use serde_json::json;

    #[test]
    fn nested_references_resolve_depth_first() {
        let producer = JobId::new();
        let mut store = ResultStore::new();
        store.insert(producer, JobRecord::Succeeded(json!({ "gap": 1.1 })));

        let gap = Input::Ref(OutputReference::new(producer, AttrPath::parse("gap")));
        let input = Input::Map(BTreeMap::from([
            ("list".to_string(), Input::List(vec![gap.clone(), Input::literal(2)])),
            ("plain".to_string(), Input::literal("x")),
        ]));

        assert_eq!(input.producers(), vec![producer]);
        assert!(!input.is_concrete());
        assert_eq!(
            input.resolve(&store),
            Ok(json!({ "list": [1.1, 2], "plain": "x" }))
        );
    }

    #[test]
    fn failed_or_missing_producers_do_not_resolve() {
        let failed = JobId::new();
        let absent = JobId::new();
        let mut store = ResultStore::new();
        store.insert(
            failed,
            JobRecord::Failed(JobFailure::new(FailureKind::CallableError, "boom")),
        );

        let from_failed = Input::Ref(OutputReference::new(failed, AttrPath::root()));
        let from_absent = Input::Ref(OutputReference::new(absent, AttrPath::root()));

        assert_eq!(
            from_failed.resolve(&store),
            Err(ResolveError::ProducerFailed { producer: failed })
        );
        assert_eq!(
            from_absent.resolve(&store),
            Err(ResolveError::Missing { producer: absent })
        );
    }

    #[test]
    fn optional_input_tolerates_a_failed_producer() {
        let failed = JobId::new();
        let ok = JobId::new();
        let mut store = ResultStore::new();
        store.insert(
            failed,
            JobRecord::Failed(JobFailure::new(FailureKind::CallableError, "boom")),
        );
        store.insert(ok, JobRecord::Succeeded(json!(0.9)));

        let input = Input::List(vec![
            Input::optional(OutputReference::new(failed, AttrPath::root())),
            Input::optional(OutputReference::new(ok, AttrPath::root())),
        ]);

        assert_eq!(input.producers(), vec![failed, ok]);
        assert!(input.required_producers().is_empty());
        assert_eq!(input.resolve(&store), Ok(json!([null, 0.9])));
    }
}
