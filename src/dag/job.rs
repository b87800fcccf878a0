// src/dag/job.rs

//! Jobs and the callable contract the runner invokes.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use serde_json::Value;

use crate::dag::input::Input;
use crate::dag::reference::{AttrPath, OutputReference};
use crate::response::Response;
use crate::types::{JobId, RunId};

/// Boxed future returned by callables.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// The opaque unit of work behind a job.
///
/// Inputs arrive fully resolved. The callable returns either a plain value
/// or a [`Response`] requesting graph expansion; any error is treated as a
/// (possibly retryable) callable failure and never inspected further.
pub trait Callable: Send + Sync {
    fn call(&self, inputs: JobInputs, ctx: JobContext) -> BoxFuture<anyhow::Result<Response>>;

    /// Stable name used in logs and structural fingerprints.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Resolved inputs handed to a callable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobInputs {
    values: BTreeMap<String, Value>,
}

impl JobInputs {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("missing input '{name}'"))
    }

    pub fn f64(&self, name: &str) -> anyhow::Result<f64> {
        self.require(name)?
            .as_f64()
            .with_context(|| format!("input '{name}' is not a number"))
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.require(name)?
            .as_str()
            .with_context(|| format!("input '{name}' is not a string"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Run-scoped information passed alongside the inputs.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: RunId,
    pub job_id: JobId,
    pub job_name: String,
    /// 1 for the first invocation, incremented on each retry.
    pub attempt: u32,
}

/// A callable built from a synchronous closure.
pub struct FnCallable<F, R> {
    name: String,
    f: Arc<F>,
    _out: PhantomData<fn() -> R>,
}

impl<F, R> Callable for FnCallable<F, R>
where
    F: Fn(JobInputs) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Response>,
{
    fn call(&self, inputs: JobInputs, _ctx: JobContext) -> BoxFuture<anyhow::Result<Response>> {
        let f = Arc::clone(&self.f);
        Box::pin(async move { f(inputs).map(Into::into) })
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// A callable built from an async closure that also receives the context.
pub struct AsyncFnCallable<F, Fut, R> {
    name: String,
    f: Arc<F>,
    _out: PhantomData<fn() -> (Fut, R)>,
}

impl<F, Fut, R> Callable for AsyncFnCallable<F, Fut, R>
where
    F: Fn(JobInputs, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Response>,
{
    fn call(&self, inputs: JobInputs, ctx: JobContext) -> BoxFuture<anyhow::Result<Response>> {
        let fut = (self.f)(inputs, ctx);
        Box::pin(async move { fut.await.map(Into::into) })
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// Wrap a synchronous closure as a shared callable.
pub fn fn_callable<F, R>(name: impl Into<String>, f: F) -> Arc<dyn Callable>
where
    F: Fn(JobInputs) -> anyhow::Result<R> + Send + Sync + 'static,
    R: Into<Response> + 'static,
{
    Arc::new(FnCallable {
        name: name.into(),
        f: Arc::new(f),
        _out: PhantomData,
    })
}

/// Wrap an async closure as a shared callable.
pub fn async_callable<F, Fut, R>(name: impl Into<String>, f: F) -> Arc<dyn Callable>
where
    F: Fn(JobInputs, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    R: Into<Response> + 'static,
{
    Arc::new(AsyncFnCallable {
        name: name.into(),
        f: Arc::new(f),
        _out: PhantomData,
    })
}

/// A named unit of work: a callable plus its (possibly symbolic) inputs.
///
/// The id is fixed at construction. Once a job is placed in a flow only its
/// name may change.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    name: String,
    callable: Arc<dyn Callable>,
    inputs: BTreeMap<String, Input>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("callable", &self.callable.name())
            .field("inputs", &self.inputs)
            .finish()
    }
}

impl Job {
    pub fn new(name: impl Into<String>, callable: Arc<dyn Callable>) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            callable,
            inputs: BTreeMap::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.inputs.insert(name.into(), input.into());
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn callable(&self) -> &Arc<dyn Callable> {
        &self.callable
    }

    pub fn inputs(&self) -> &BTreeMap<String, Input> {
        &self.inputs
    }

    /// Reference to this job's whole result.
    pub fn output(&self) -> OutputReference {
        OutputReference::new(self.id, AttrPath::root())
    }

    /// Reference to an attribute of this job's result.
    pub fn output_at(&self, path: &str) -> OutputReference {
        OutputReference::new(self.id, AttrPath::parse(path))
    }

    /// Distinct producers referenced anywhere in this job's inputs.
    pub fn dependencies(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = Vec::new();
        for input in self.inputs.values() {
            for id in input.producers() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Producers whose failure fails this job; see [`Input::required_producers`].
    pub fn required_dependencies(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = Vec::new();
        for input in self.inputs.values() {
            for id in input.required_producers() {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}
