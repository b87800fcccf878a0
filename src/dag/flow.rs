// src/dag/flow.rs

//! Flows: ordered, nestable collections of jobs with a declared output.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dag::graph::check_acyclic;
use crate::dag::input::Input;
use crate::dag::job::Job;
use crate::errors::{FlowdagError, Result};
use crate::types::JobId;

/// Element of a flow.
#[derive(Debug, Clone)]
pub enum Node {
    Job(Job),
    Flow(Flow),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Job(j) => j.name(),
            Node::Flow(f) => f.name(),
        }
    }

    /// The node's result as an input for downstream jobs: the whole job
    /// result, or the flow's declared output mapping.
    pub fn output(&self) -> Input {
        match self {
            Node::Job(j) => Input::Ref(j.output()),
            Node::Flow(f) => Input::Map(f.output.clone()),
        }
    }

    /// A single attribute of the node's result.
    ///
    /// For a flow, the first path segment selects a declared output entry.
    pub fn output_at(&self, path: &str) -> Option<Input> {
        match self {
            Node::Job(j) => Some(Input::Ref(j.output_at(path))),
            Node::Flow(f) => {
                let (head, rest) = match path.split_once('.') {
                    Some((h, r)) => (h, Some(r)),
                    None => (path, None),
                };
                let entry = f.output_entry(head)?;
                match (entry, rest) {
                    (entry, None) => Some(entry),
                    (Input::Ref(r), Some(rest)) => Some(Input::Ref(r.at(rest))),
                    (Input::Map(mut m), Some(rest)) => m.remove(rest),
                    _ => None,
                }
            }
        }
    }
}

impl From<Job> for Node {
    fn from(job: Job) -> Self {
        Node::Job(job)
    }
}

impl From<Flow> for Node {
    fn from(flow: Flow) -> Self {
        Node::Flow(flow)
    }
}

/// An ordered collection of jobs and nested flows forming a DAG.
///
/// A flow has no execution semantics of its own: running it means running
/// its jobs (recursively flattened) and then resolving `output`.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    name: String,
    nodes: Vec<Node>,
    output: BTreeMap<String, Input>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            output: BTreeMap::new(),
        }
    }

    pub fn with_node(mut self, node: impl Into<Node>) -> Self {
        self.nodes.push(node.into());
        self
    }

    pub fn with_nodes<N: Into<Node>>(mut self, nodes: impl IntoIterator<Item = N>) -> Self {
        self.nodes.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        self.output.insert(name.into(), input.into());
        self
    }

    pub fn with_output_map(mut self, output: BTreeMap<String, Input>) -> Self {
        self.output = output;
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.nodes.push(node.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn output(&self) -> &BTreeMap<String, Input> {
        &self.output
    }

    /// A declared output entry, for wiring into downstream jobs.
    pub fn output_entry(&self, name: &str) -> Option<Input> {
        self.output.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All jobs, with nested flows flattened depth-first in insertion order.
    pub fn jobs(&self) -> Vec<&Job> {
        let mut out = Vec::new();
        self.collect_jobs(&mut out);
        out
    }

    fn collect_jobs<'a>(&'a self, out: &mut Vec<&'a Job>) {
        for node in &self.nodes {
            match node {
                Node::Job(j) => out.push(j),
                Node::Flow(f) => f.collect_jobs(out),
            }
        }
    }

    /// Consume the flow, returning its jobs in flattened order.
    pub fn into_jobs(self) -> Vec<Job> {
        let mut out = Vec::new();
        for node in self.nodes {
            match node {
                Node::Job(j) => out.push(j),
                Node::Flow(f) => out.extend(f.into_jobs()),
            }
        }
        out
    }

    pub fn job_count(&self) -> usize {
        self.jobs().len()
    }

    /// Producers referenced by this flow's declared output and by the
    /// outputs of nested flows.
    pub fn output_producers(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.output.values().flat_map(Input::producers).collect();
        for node in &self.nodes {
            if let Node::Flow(f) = node {
                ids.extend(f.output_producers());
            }
        }
        ids
    }

    /// Check that the flow is a well-formed, self-contained DAG.
    pub fn validate(&self) -> Result<()> {
        self.validate_against(&HashSet::new())
    }

    /// Check that the flow is a DAG whose references point either at its
    /// own jobs or at one of `external` (jobs already present in a running
    /// graph, used when splicing an expansion).
    pub fn validate_against(&self, external: &HashSet<JobId>) -> Result<()> {
        let jobs = self.jobs();

        let mut own: HashSet<JobId> = HashSet::new();
        for job in &jobs {
            if !own.insert(job.id()) || external.contains(&job.id()) {
                return Err(FlowdagError::config(format!(
                    "job '{}' is placed in the graph more than once",
                    job.name()
                )));
            }
        }

        let known = |id: &JobId| own.contains(id) || external.contains(id);

        for job in &jobs {
            for dep in job.dependencies() {
                if !known(&dep) {
                    return Err(FlowdagError::DanglingReference {
                        job: job.name().to_string(),
                        producer: dep,
                    });
                }
            }
        }

        self.validate_outputs(&known)?;
        check_acyclic(&jobs)
    }

    fn validate_outputs(&self, known: &dyn Fn(&JobId) -> bool) -> Result<()> {
        for (key, input) in &self.output {
            for producer in input.producers() {
                if !known(&producer) {
                    return Err(FlowdagError::DanglingReference {
                        job: format!("{}.output[{}]", self.name, key),
                        producer,
                    });
                }
            }
        }
        for node in &self.nodes {
            if let Node::Flow(f) = node {
                f.validate_outputs(known)?;
            }
        }
        Ok(())
    }

    /// Structural fingerprint of the flow.
    ///
    /// Job ids are replaced by their position in the flattened job list, so
    /// two flows built from the same configuration and input hash equally
    /// even though their ids differ.
    pub fn fingerprint(&self) -> String {
        let positions: HashMap<JobId, usize> = self
            .jobs()
            .iter()
            .enumerate()
            .map(|(i, j)| (j.id(), i))
            .collect();

        let mut hasher = blake3::Hasher::new();
        self.hash_into(&mut hasher, &positions);
        hasher.finalize().to_hex().to_string()
    }

    fn hash_into(&self, hasher: &mut blake3::Hasher, positions: &HashMap<JobId, usize>) {
        hasher.update(format!("flow:{}\n", self.name).as_bytes());
        for node in &self.nodes {
            match node {
                Node::Job(job) => {
                    hasher.update(
                        format!("job:{}:{}\n", job.name(), job.callable().name()).as_bytes(),
                    );
                    for (key, input) in job.inputs() {
                        hasher.update(format!("in:{}=", key).as_bytes());
                        hash_input(hasher, input, positions);
                        hasher.update(b"\n");
                    }
                }
                Node::Flow(flow) => flow.hash_into(hasher, positions),
            }
        }
        for (key, input) in &self.output {
            hasher.update(format!("out:{}=", key).as_bytes());
            hash_input(hasher, input, positions);
            hasher.update(b"\n");
        }
        hasher.update(b"end\n");
    }
}

fn hash_input(hasher: &mut blake3::Hasher, input: &Input, positions: &HashMap<JobId, usize>) {
    match input {
        Input::Literal(v) => {
            hasher.update(b"lit:");
            hasher.update(v.to_string().as_bytes());
        }
        Input::Ref(r) => {
            let target = positions
                .get(&r.producer())
                .map(|p| p.to_string())
                .unwrap_or_else(|| "external".to_string());
            hasher.update(format!("ref:{}:{}", target, r.path()).as_bytes());
        }
        Input::List(items) => {
            hasher.update(b"[");
            for item in items {
                hash_input(hasher, item, positions);
                hasher.update(b",");
            }
            hasher.update(b"]");
        }
        Input::Map(entries) => {
            hasher.update(b"{");
            for (key, item) in entries {
                hasher.update(format!("{}:", key).as_bytes());
                hash_input(hasher, item, positions);
                hasher.update(b",");
            }
            hasher.update(b"}");
        }
        Input::Optional(inner) => {
            hasher.update(b"opt:");
            hash_input(hasher, inner, positions);
        }
    }
}
