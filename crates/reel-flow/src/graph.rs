//! Static task graphs.
//!
//! A graph is declared once with [`TaskGraphBuilder`] and then only read. Task
//! groups exist at build time only: a dependency on a group id expands to a
//! dependency on every member, so the orchestrator never sees groups.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use reel_core::TaskId;
use rustworkx_core::petgraph::algo::toposort;
use rustworkx_core::petgraph::graph::{DiGraph, NodeIndex};
use rustworkx_core::petgraph::visit::Bfs;
use serde::Serialize;

use crate::error::FlowError;
use crate::task::{RetryPolicy, Task};

/// Declaration of one task before the graph is built.
pub struct TaskSpec {
    name: String,
    task: Arc<dyn Task>,
    upstream: Vec<String>,
    retry: RetryPolicy,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, task: impl Task + 'static) -> Self {
        Self {
            name: name.into(),
            task: Arc::new(task),
            upstream: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Depend on a task id or a group id.
    #[must_use]
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.upstream.push(dependency.into());
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Named set of tasks that other tasks can depend on as one unit.
///
/// Member ids are prefixed with the group id: member `ingest_movies` of group
/// `ingest_transform_parallel` becomes `ingest_transform_parallel.ingest_movies`.
pub struct TaskGroup {
    id: String,
    members: Vec<TaskSpec>,
}

impl TaskGroup {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn member(mut self, spec: TaskSpec) -> Self {
        self.members.push(spec);
        self
    }
}

/// A task inside a built graph.
pub struct TaskNode {
    pub id: TaskId,
    pub task: Arc<dyn Task>,
    pub upstream: BTreeSet<TaskId>,
    pub retry: RetryPolicy,
}

/// Serializable summary of a node, used for `reel graph`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id: TaskId,
    pub upstream: Vec<TaskId>,
    pub retry: RetryPolicy,
}

#[derive(Default)]
pub struct TaskGraphBuilder {
    tasks: Vec<TaskSpec>,
    groups: Vec<TaskGroup>,
}

impl TaskGraphBuilder {
    #[must_use]
    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        self
    }

    #[must_use]
    pub fn group(mut self, group: TaskGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Resolve dependencies and validate the graph.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::DuplicateId`], [`FlowError::EmptyGroup`],
    /// [`FlowError::UnknownDependency`], or [`FlowError::Cycle`].
    pub fn build(self) -> Result<TaskGraph, FlowError> {
        let mut specs: Vec<(TaskId, TaskSpec)> = Vec::new();
        let mut group_members: HashMap<String, Vec<TaskId>> = HashMap::new();
        let mut group_order = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for group in self.groups {
            if group.members.is_empty() {
                return Err(FlowError::EmptyGroup(group.id));
            }
            if !seen.insert(group.id.clone()) {
                return Err(FlowError::DuplicateId(group.id));
            }
            let mut members = Vec::with_capacity(group.members.len());
            for spec in group.members {
                let id = TaskId::in_group(&group.id, &spec.name);
                members.push(id.clone());
                specs.push((id, spec));
            }
            group_order.push(group.id.clone());
            group_members.insert(group.id, members);
        }
        for spec in self.tasks {
            specs.push((TaskId::new(spec.name.clone()), spec));
        }

        let mut index = HashMap::with_capacity(specs.len());
        for (position, (id, _)) in specs.iter().enumerate() {
            if !seen.insert(id.as_str().to_string()) {
                return Err(FlowError::DuplicateId(id.to_string()));
            }
            index.insert(id.clone(), position);
        }

        let mut graph: DiGraph<TaskId, ()> = DiGraph::new();
        for (id, _) in &specs {
            graph.add_node(id.clone());
        }

        let mut nodes = Vec::with_capacity(specs.len());
        for (position, (id, spec)) in specs.into_iter().enumerate() {
            let mut upstream = BTreeSet::new();
            for dependency in &spec.upstream {
                let as_task = TaskId::new(dependency.clone());
                let resolved = if let Some(members) = group_members.get(dependency) {
                    members.clone()
                } else if index.contains_key(&as_task) {
                    vec![as_task]
                } else {
                    return Err(FlowError::UnknownDependency {
                        task: id,
                        dependency: dependency.clone(),
                    });
                };
                upstream.extend(resolved);
            }
            for dependency in &upstream {
                graph.add_edge(NodeIndex::new(index[dependency]), NodeIndex::new(position), ());
            }
            nodes.push(TaskNode {
                id,
                task: spec.task,
                upstream,
                retry: spec.retry,
            });
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| FlowError::Cycle(graph[cycle.node_id()].clone()))?
            .into_iter()
            .map(NodeIndex::index)
            .collect();

        let groups = group_order
            .into_iter()
            .map(|id| {
                let members = group_members.remove(&id).unwrap_or_default();
                (id, members)
            })
            .collect();

        Ok(TaskGraph {
            nodes,
            index,
            groups,
            order,
            graph,
        })
    }
}

/// Validated, immutable task graph.
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
    groups: Vec<(String, Vec<TaskId>)>,
    order: Vec<usize>,
    graph: DiGraph<TaskId, ()>,
}

impl TaskGraph {
    #[must_use]
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub(crate) fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub(crate) fn position(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Node positions in a dependency-consistent order.
    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    /// Task ids in a dependency-consistent order.
    #[must_use]
    pub fn topological_order(&self) -> Vec<&TaskId> {
        self.order.iter().map(|&p| &self.nodes[p].id).collect()
    }

    /// Members of each declared group, in declaration order.
    #[must_use]
    pub fn groups(&self) -> &[(String, Vec<TaskId>)] {
        &self.groups
    }

    /// Every task that transitively depends on `id`, excluding `id` itself.
    #[must_use]
    pub fn downstream_closure(&self, id: &TaskId) -> BTreeSet<TaskId> {
        let Some(&start) = self.index.get(id) else {
            return BTreeSet::new();
        };
        let mut closure = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, NodeIndex::new(start));
        while let Some(next) = bfs.next(&self.graph) {
            if next.index() != start {
                closure.insert(self.graph[next].clone());
            }
        }
        closure
    }

    /// Summaries in topological order.
    #[must_use]
    pub fn summaries(&self) -> Vec<NodeSummary> {
        self.order
            .iter()
            .map(|&p| {
                let node = &self.nodes[p];
                NodeSummary {
                    id: node.id.clone(),
                    upstream: node.upstream.iter().cloned().collect(),
                    retry: node.retry,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::task::TaskContext;

    fn noop(_: &TaskContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn ids(set: &BTreeSet<TaskId>) -> Vec<&str> {
        set.iter().map(TaskId::as_str).collect()
    }

    fn position_of(order: &[&TaskId], id: &str) -> usize {
        order.iter().position(|t| t.as_str() == id).unwrap()
    }

    fn etl_shape() -> TaskGraph {
        TaskGraph::builder()
            .group(
                TaskGroup::new("ingest")
                    .member(TaskSpec::new("movies", noop))
                    .member(TaskSpec::new("ratings", noop)),
            )
            .task(TaskSpec::new("merge", noop).after("ingest"))
            .task(TaskSpec::new("validate", noop).after("merge"))
            .task(TaskSpec::new("analyze", noop).after("validate"))
            .task(TaskSpec::new("cleanup_db", noop).after("analyze"))
            .task(TaskSpec::new("cleanup_files", noop).after("analyze"))
            .build()
            .expect("graph builds")
    }

    #[test]
    fn group_dependency_expands_to_members() {
        let graph = etl_shape();
        let merge = graph.node(&TaskId::new("merge")).unwrap();
        assert_eq!(ids(&merge.upstream), vec!["ingest.movies", "ingest.ratings"]);
        assert_eq!(graph.groups()[0].0, "ingest");
        assert_eq!(graph.groups()[0].1.len(), 2);
    }

    #[test]
    fn topological_order_respects_edges() {
        let graph = etl_shape();
        let order = graph.topological_order();
        assert_eq!(order.len(), 7);
        for node in graph.nodes() {
            for upstream in &node.upstream {
                assert!(
                    position_of(&order, upstream.as_str()) < position_of(&order, node.id.as_str()),
                    "{upstream} must precede {}",
                    node.id
                );
            }
        }
    }

    #[test]
    fn downstream_closure_is_transitive() {
        let graph = etl_shape();
        let closure = graph.downstream_closure(&TaskId::new("ingest.ratings"));
        assert_eq!(
            ids(&closure),
            vec!["analyze", "cleanup_db", "cleanup_files", "merge", "validate"]
        );
        assert!(graph
            .downstream_closure(&TaskId::new("cleanup_db"))
            .is_empty());
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = TaskGraph::builder()
            .task(TaskSpec::new("merge", noop).after("ingest"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::UnknownDependency { dependency, .. } if dependency == "ingest"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = TaskGraph::builder()
            .task(TaskSpec::new("a", noop))
            .task(TaskSpec::new("a", noop))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::DuplicateId(id) if id == "a"));
    }

    #[test]
    fn task_may_not_reuse_a_group_id() {
        let err = TaskGraph::builder()
            .group(TaskGroup::new("ingest").member(TaskSpec::new("movies", noop)))
            .task(TaskSpec::new("ingest", noop))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::DuplicateId(_)));
    }

    #[test]
    fn empty_group_is_rejected() {
        let err = TaskGraph::builder()
            .group(TaskGroup::new("ingest"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::EmptyGroup(_)));
    }

    #[test]
    fn cycles_are_rejected() {
        let err = TaskGraph::builder()
            .task(TaskSpec::new("a", noop).after("b"))
            .task(TaskSpec::new("b", noop).after("a"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::Cycle(_)));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = TaskGraph::builder()
            .task(TaskSpec::new("a", noop).after("a"))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, FlowError::Cycle(id) if id.as_str() == "a"));
    }
}
