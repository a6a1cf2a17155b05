// src/graph/workflow_graph.rs

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::errors::{FlowError, Result};
use crate::expr::Expression;
use crate::graph::join::JoinPolicy;
use crate::spec::WorkflowSpec;

/// A named node in the workflow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub join: JoinPolicy,
    pub action: Option<String>,
    /// Input expressions, evaluated against the task's incoming context.
    pub input: Vec<(String, Expression)>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            join: JoinPolicy::None,
            action: None,
            input: Vec::new(),
        }
    }

    pub fn with_join(mut self, join: JoinPolicy) -> Self {
        self.join = join;
        self
    }
}

/// A conditional edge between two tasks.
///
/// `index` is the position of the owning `next` clause among the source
/// task's clauses; destinations listed in the same clause share it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub source: String,
    pub destination: String,
    pub index: usize,
    pub guard: Option<Expression>,
    /// Ordered `(name, expression)` pairs evaluated to extend the context.
    pub publish: Vec<(String, Expression)>,
}

impl Transition {
    pub fn new(source: impl Into<String>, destination: impl Into<String>, index: usize) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            index,
            guard: None,
            publish: Vec::new(),
        }
    }

    pub fn when(mut self, guard: impl Into<Expression>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    pub fn publish(mut self, name: impl Into<String>, expr: impl Into<Expression>) -> Self {
        self.publish.push((name.into(), expr.into()));
        self
    }

    /// Key under which the source entry records this transition in `next`
    /// and the destination entry records it in `prev`.
    pub fn key(task: &str, index: usize) -> String {
        format!("{task}__t{index}")
    }
}

/// Directed graph of tasks and transitions.
///
/// Cycles are allowed. Cycle membership is computed once (Tarjan SCC) on the
/// first query and reused until the graph is mutated again.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    graph: DiGraph<Task, Transition>,
    index: HashMap<String, NodeIndex>,
    cycles: OnceLock<HashSet<NodeIndex>>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a structurally valid [`WorkflowSpec`].
    pub fn from_spec(spec: &WorkflowSpec) -> Result<Self> {
        let mut graph = WorkflowGraph::new();

        for (name, task) in spec.tasks.iter() {
            graph.add_task(Task {
                id: name.clone(),
                join: task.join.unwrap_or_default(),
                action: task.action.clone(),
                input: task
                    .input
                    .iter()
                    .map(|(k, v)| (k.clone(), Expression::new(v.as_str())))
                    .collect(),
            })?;
        }

        for (name, task) in spec.tasks.iter() {
            for (idx, next) in task.next.iter().enumerate() {
                for dest in next.targets.iter() {
                    let mut transition = Transition::new(name.as_str(), dest.as_str(), idx);
                    transition.guard = next.when.as_deref().map(Expression::new);
                    transition.publish = next
                        .publish
                        .iter()
                        .map(|(k, v)| (k.clone(), Expression::new(v.as_str())))
                        .collect();
                    graph.add_transition(transition)?;
                }
            }
        }

        debug!(
            tasks = graph.graph.node_count(),
            transitions = graph.graph.edge_count(),
            "workflow graph built"
        );
        Ok(graph)
    }

    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.index.contains_key(&task.id) {
            return Err(FlowError::ConfigError(format!(
                "task '{}' is declared more than once",
                task.id
            )));
        }
        let id = task.id.clone();
        let node = self.graph.add_node(task);
        self.index.insert(id, node);
        self.cycles = OnceLock::new();
        Ok(())
    }

    /// Add a transition between two existing tasks.
    pub fn add_transition(&mut self, transition: Transition) -> Result<()> {
        let from = self.node(&transition.source)?;
        let to = self.node(&transition.destination)?;
        self.graph.add_edge(from, to, transition);
        self.cycles = OnceLock::new();
        Ok(())
    }

    fn node(&self, id: &str) -> Result<NodeIndex> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| FlowError::InvalidTask(id.to_string()))
    }

    pub fn has_task(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|n| &self.graph[*n])
    }

    /// Tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.graph.node_indices().map(move |n| &self.graph[n])
    }

    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn join_policy(&self, id: &str) -> Option<JoinPolicy> {
        self.task(id).map(|t| t.join)
    }

    /// Outgoing transitions in clause order, then declaration order.
    pub fn next_transitions(&self, id: &str) -> Vec<&Transition> {
        self.transitions(id, Direction::Outgoing)
    }

    /// Incoming transitions in declaration order.
    pub fn prev_transitions(&self, id: &str) -> Vec<&Transition> {
        self.transitions(id, Direction::Incoming)
    }

    fn transitions(&self, id: &str, dir: Direction) -> Vec<&Transition> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut edges: Vec<_> = self.graph.edges_directed(node, dir).collect();
        edges.sort_by_key(|e| (e.weight().index, e.id()));
        edges.into_iter().map(|e| e.weight()).collect()
    }

    /// Whether the task can reach itself through one or more transitions.
    pub fn in_cycle(&self, id: &str) -> bool {
        match self.index.get(id) {
            Some(node) => self.cycle_members().contains(node),
            None => false,
        }
    }

    fn cycle_members(&self) -> &HashSet<NodeIndex> {
        self.cycles.get_or_init(|| {
            let mut members = HashSet::new();
            for scc in tarjan_scc(&self.graph) {
                let cyclic = scc.len() > 1
                    || scc
                        .first()
                        .is_some_and(|n| self.graph.find_edge(*n, *n).is_some());
                if cyclic {
                    members.extend(scc);
                }
            }
            members
        })
    }

    /// Tasks with no inbound transitions.
    ///
    /// When every task has an inbound transition (the whole workflow is one
    /// loop), the first declared task is the entry point.
    pub fn start_tasks(&self) -> Vec<&str> {
        let starts: Vec<&str> = self
            .graph
            .node_indices()
            .filter(|n| {
                self.graph
                    .edges_directed(*n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].id.as_str())
            .collect();

        if starts.is_empty() {
            return self.tasks().take(1).map(|t| t.id.as_str()).collect();
        }
        starts
    }

    pub fn is_start_task(&self, id: &str) -> bool {
        self.start_tasks().contains(&id)
    }

    /// A non-join task reached by more than one transition outside a cycle.
    ///
    /// Every arrival at a split task runs on its own route.
    pub fn is_split_task(&self, id: &str) -> bool {
        let Some(task) = self.task(id) else {
            return false;
        };
        !task.join.is_join() && self.prev_transitions(id).len() > 1 && !self.in_cycle(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cyclic_graph() -> WorkflowGraph {
        let mut g = WorkflowGraph::new();
        for i in 1..=5 {
            g.add_task(Task::new(format!("task{i}"))).unwrap();
        }
        g.add_transition(Transition::new("task1", "task2", 0)).unwrap();
        g.add_transition(Transition::new("task1", "task5", 0)).unwrap();
        g.add_transition(Transition::new("task2", "task3", 0)).unwrap();
        g.add_transition(Transition::new("task3", "task4", 0)).unwrap();
        g.add_transition(Transition::new("task4", "task2", 0)).unwrap();
        g
    }

    #[test]
    fn detects_cycle_membership() {
        let g = cyclic_graph();
        assert!(!g.in_cycle("task1"));
        assert!(g.in_cycle("task2"));
        assert!(g.in_cycle("task3"));
        assert!(g.in_cycle("task4"));
        assert!(!g.in_cycle("task5"));
        assert!(!g.in_cycle("missing"));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut g = WorkflowGraph::new();
        g.add_task(Task::new("retry")).unwrap();
        g.add_transition(Transition::new("retry", "retry", 0)).unwrap();
        assert!(g.in_cycle("retry"));
    }

    #[test]
    fn cycle_cache_is_reset_on_mutation() {
        let mut g = WorkflowGraph::new();
        g.add_task(Task::new("a")).unwrap();
        g.add_task(Task::new("b")).unwrap();
        g.add_transition(Transition::new("a", "b", 0)).unwrap();
        assert!(!g.in_cycle("a"));

        g.add_transition(Transition::new("b", "a", 0)).unwrap();
        assert!(g.in_cycle("a"));
    }

    #[test]
    fn transition_to_unknown_task_fails() {
        let mut g = cyclic_graph();
        let err = g
            .add_transition(Transition::new("task1", "task9", 1))
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTask(ref t) if t == "task9"));
    }

    #[test]
    fn start_and_split_tasks() {
        let g = cyclic_graph();
        assert_eq!(g.start_tasks(), vec!["task1"]);
        // task2 has two inbound transitions but one of them closes a cycle.
        assert!(!g.is_split_task("task2"));

        let mut diamond = WorkflowGraph::new();
        for t in ["a", "b", "c", "d"] {
            diamond.add_task(Task::new(t)).unwrap();
        }
        diamond.add_transition(Transition::new("a", "b", 0)).unwrap();
        diamond.add_transition(Transition::new("a", "c", 1)).unwrap();
        diamond.add_transition(Transition::new("b", "d", 0)).unwrap();
        diamond.add_transition(Transition::new("c", "d", 0)).unwrap();
        assert!(diamond.is_split_task("d"));
    }

    #[test]
    fn next_transitions_follow_clause_order() {
        let mut g = WorkflowGraph::new();
        for t in ["a", "b", "c"] {
            g.add_task(Task::new(t)).unwrap();
        }
        g.add_transition(Transition::new("a", "c", 1)).unwrap();
        g.add_transition(Transition::new("a", "b", 0)).unwrap();

        let order: Vec<_> = g
            .next_transitions("a")
            .iter()
            .map(|t| t.destination.as_str())
            .collect();
        assert_eq!(order, vec!["b", "c"]);
    }
}
