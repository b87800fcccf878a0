// src/dag/graph.rs

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::dag::job::Job;
use crate::errors::{FlowdagError, Result};
use crate::types::JobId;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Producers referenced by this job's inputs.
    deps: Vec<JobId>,
    /// Jobs whose inputs reference this one.
    dependents: Vec<JobId>,
}

/// In-memory job dependency graph keyed by job id.
///
/// Edges are derived from the output references found in each job's inputs.
/// The graph only grows: dynamic expansion adds nodes while a run is in
/// progress, but never removes or rewires existing ones.
#[derive(Debug, Clone, Default)]
pub struct JobGraph {
    nodes: HashMap<JobId, DagNode>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a set of jobs (typically a flattened flow).
    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut graph = Self::new();
        graph.add_jobs(jobs);
        graph
    }

    /// Add jobs to the graph.
    ///
    /// Jobs may reference each other in any order; dependents are populated
    /// in a second pass once every new node exists.
    pub fn add_jobs<'a>(&mut self, jobs: impl IntoIterator<Item = &'a Job>) {
        let mut added = Vec::new();

        // First pass: create nodes with their dependency lists.
        for job in jobs {
            self.nodes.insert(
                job.id(),
                DagNode {
                    deps: job.dependencies(),
                    dependents: Vec::new(),
                },
            );
            added.push(job.id());
        }

        // Second pass: populate dependents based on deps.
        for id in added {
            let deps = self
                .nodes
                .get(&id)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = self.nodes.get_mut(&dep) {
                    if !dep_node.dependents.contains(&id) {
                        dep_node.dependents.push(id);
                    }
                }
            }
        }
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn job_ids(&self) -> impl Iterator<Item = &JobId> {
        self.nodes.keys()
    }

    /// Immediate producers of a job.
    pub fn dependencies_of(&self, id: &JobId) -> &[JobId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate consumers of a job.
    pub fn dependents_of(&self, id: &JobId) -> &[JobId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// All transitive dependents of a job, excluding the job itself.
    pub fn descendants_of(&self, id: &JobId) -> HashSet<JobId> {
        let mut seen = HashSet::new();
        let mut stack: Vec<JobId> = self.dependents_of(id).to_vec();

        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependents_of(&next).iter().copied());
            }
        }

        seen
    }
}

/// Fail if the references between `jobs` form a cycle.
///
/// References to producers outside `jobs` are ignored here; dangling
/// references are reported separately by flow validation.
pub fn check_acyclic(jobs: &[&Job]) -> Result<()> {
    // Edge direction: producer -> consumer.
    let mut graph: DiGraphMap<JobId, ()> = DiGraphMap::new();
    let mut names: HashMap<JobId, &str> = HashMap::new();

    for job in jobs {
        graph.add_node(job.id());
        names.insert(job.id(), job.name());
    }

    for job in jobs {
        for dep in job.dependencies() {
            if dep == job.id() {
                return Err(FlowdagError::DagCycle(format!(
                    "job '{}' references its own output",
                    job.name()
                )));
            }
            if names.contains_key(&dep) {
                graph.add_edge(dep, job.id(), ());
            }
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            let name = names.get(&node).copied().unwrap_or("<unknown>");
            Err(FlowdagError::DagCycle(format!(
                "cycle detected in job graph involving job '{}'",
                name
            )))
        }
    }
}
