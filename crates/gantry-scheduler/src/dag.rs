//! Job-graph resolution.
//!
//! Builds a directed graph over a pipeline's jobs from their `needs`
//! declarations and resolves it into an execution plan: ordered concurrency
//! groups where jobs within a group carry no ordering constraint between
//! them. A pipeline with no `needs` resolves to a single group holding every
//! job.

use gantry_core::ids::JobId;
use gantry_core::pipeline::{JobDefinition, PipelineDefinition};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DagError {
    #[error("Dependency cycle among jobs: {}", jobs.join(", "))]
    Cycle { jobs: Vec<String> },
    #[error("Unknown job dependency: {job} needs {dependency}")]
    UnknownDependency { job: String, dependency: String },
    #[error("Pipeline declares no jobs")]
    EmptyPipeline,
}

impl From<DagError> for gantry_core::Error {
    fn from(err: DagError) -> Self {
        match err {
            DagError::Cycle { jobs } => gantry_core::Error::Cycle { jobs },
            DagError::UnknownDependency { job, dependency } => {
                gantry_core::Error::UnknownDependency { job, dependency }
            }
            DagError::EmptyPipeline => {
                gantry_core::Error::Configuration("pipeline declares no jobs".into())
            }
        }
    }
}

/// A job in the graph.
#[derive(Debug, Clone)]
pub struct JobNode {
    pub job_id: JobId,
    pub name: String,
    pub definition: JobDefinition,
    /// Position in the pipeline's declaration order; ties within a
    /// concurrency group are broken by this index.
    pub declaration_index: usize,
}

/// The resolved execution plan: concurrency groups in dependency order.
///
/// Every job in group N depends only on jobs in groups 0..N, so a group may
/// execute fully in parallel once all earlier groups have completed.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub groups: Vec<Vec<JobNode>>,
}

impl ExecutionPlan {
    pub fn job_count(&self) -> usize {
        self.groups.iter().map(|g| g.len()).sum()
    }

    /// Job names per group, useful for display.
    pub fn group_names(&self) -> Vec<Vec<&str>> {
        self.groups
            .iter()
            .map(|g| g.iter().map(|n| n.name.as_str()).collect())
            .collect()
    }
}

/// Directed graph of jobs and their dependency edges.
#[derive(Debug)]
pub struct JobDag {
    graph: DiGraph<JobNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl JobDag {
    /// Jobs with no dependencies.
    pub fn roots(&self) -> Vec<&JobNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Jobs that must complete before the named job can start.
    pub fn dependencies(&self, job_name: &str) -> Vec<&JobNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Jobs unblocked by the named job's completion.
    pub fn dependents(&self, job_name: &str) -> Vec<&JobNode> {
        self.name_to_index
            .get(job_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                    .filter_map(|n| self.graph.node_weight(n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All jobs in declaration order.
    pub fn jobs(&self) -> Vec<&JobNode> {
        let mut nodes: Vec<&JobNode> = self
            .graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect();
        nodes.sort_by_key(|n| n.declaration_index);
        nodes
    }

    /// The names of jobs participating in dependency cycles, in declaration
    /// order. Empty when the graph is acyclic.
    fn cycle_participants(&self) -> Vec<String> {
        let mut implicated: Vec<&JobNode> = Vec::new();

        for component in tarjan_scc(&self.graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if is_cycle {
                implicated.extend(
                    component
                        .iter()
                        .filter_map(|&idx| self.graph.node_weight(idx)),
                );
            }
        }

        implicated.sort_by_key(|n| n.declaration_index);
        implicated.iter().map(|n| n.name.clone()).collect()
    }

    /// Resolve the graph into ordered concurrency groups.
    ///
    /// Kahn layering: each group holds every job whose dependencies are all
    /// satisfied by earlier groups. Within a group, jobs keep declaration
    /// order.
    pub fn resolve(&self) -> Result<ExecutionPlan, DagError> {
        let cycle = self.cycle_participants();
        if !cycle.is_empty() {
            return Err(DagError::Cycle { jobs: cycle });
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph
                        .neighbors_directed(idx, petgraph::Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut groups = Vec::new();
        let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();

        while !remaining.is_empty() {
            let mut ready: Vec<NodeIndex> = remaining
                .iter()
                .copied()
                .filter(|idx| in_degree[idx] == 0)
                .collect();
            ready.sort_by_key(|&idx| self.graph[idx].declaration_index);

            for &idx in &ready {
                for successor in self
                    .graph
                    .neighbors_directed(idx, petgraph::Direction::Outgoing)
                {
                    *in_degree.get_mut(&successor).unwrap() -= 1;
                }
            }
            remaining.retain(|idx| !ready.contains(idx));

            groups.push(ready.iter().map(|&idx| self.graph[idx].clone()).collect());
        }

        Ok(ExecutionPlan { groups })
    }
}

/// Builder for constructing job graphs.
pub struct DagBuilder;

impl DagBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build a graph from a pipeline definition.
    pub fn build(&self, pipeline: &PipelineDefinition) -> Result<JobDag, DagError> {
        if pipeline.jobs.is_empty() {
            return Err(DagError::EmptyPipeline);
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for (declaration_index, (name, definition)) in pipeline.jobs.iter().enumerate() {
            let node = JobNode {
                job_id: JobId::new(name),
                name: name.clone(),
                definition: definition.clone(),
                declaration_index,
            };
            let idx = graph.add_node(node);
            name_to_index.insert(name.clone(), idx);
        }

        for (name, definition) in &pipeline.jobs {
            let job_idx = name_to_index[name];
            for dep in &definition.needs {
                let dep_idx =
                    name_to_index
                        .get(dep)
                        .ok_or_else(|| DagError::UnknownDependency {
                            job: name.clone(),
                            dependency: dep.clone(),
                        })?;
                graph.add_edge(*dep_idx, job_idx, ());
            }
        }

        Ok(JobDag {
            graph,
            name_to_index,
        })
    }

    /// Build and resolve in one go.
    pub fn plan(&self, pipeline: &PipelineDefinition) -> Result<ExecutionPlan, DagError> {
        self.build(pipeline)?.resolve()
    }
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self::new()
    }
}
