// src/conducting/conductor.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::conducting::events::TaskEvent;
use crate::conducting::flow::{TaskFlow, TaskFlowEntry};
use crate::conducting::routes::Routes;
use crate::conducting::states::{State, task_transition_allowed, workflow_transition_allowed};
use crate::context::ContextStore;
use crate::errors::{FlowError, Result};
use crate::expr::{CurrentTask, Evaluator, Expression, ExpressionEvaluator, Scope, truthy};
use crate::graph::{Transition, WorkflowGraph};
use crate::spec::{WorkflowSpec, validate_structure};

/// Execution-time error record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionError {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub task_id: String,
    pub route: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_transition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ExecutionError {
    fn new(message: impl Into<String>, task_id: &str, route: usize) -> Self {
        Self {
            kind: "error".to_string(),
            message: message.into(),
            task_id: task_id.to_string(),
            route,
            task_transition_id: None,
            result: None,
        }
    }
}

/// A task waiting to be handed to an executor, with its rendered input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NextTask {
    pub id: String,
    pub route: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub input: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct Arrival {
    prev_key: String,
    prev_idx: usize,
    ctx: usize,
    route: usize,
}

/// Arrivals collected at a join task that has not fired yet.
#[derive(Debug, Clone, Default)]
struct JoinBarrier {
    arrivals: Vec<Arrival>,
}

impl JoinBarrier {
    /// Record an arrival. A second arrival through the same transition
    /// replaces the first.
    fn arrive(&mut self, arrival: Arrival) {
        match self
            .arrivals
            .iter_mut()
            .find(|a| a.prev_key == arrival.prev_key)
        {
            Some(existing) => *existing = arrival,
            None => self.arrivals.push(arrival),
        }
    }
}

/// Event-driven task-flow state machine for one workflow execution.
///
/// The conductor owns every piece of mutable execution state: the context
/// snapshots, the task-flow sequence, the route registry and pending join
/// barriers. The graph is shared read-only and may back any number of
/// conductors.
///
/// A satisfied transition stages its destination; the entry is appended to
/// the sequence when the task is first updated (or added explicitly), so the
/// sequence only holds tasks that actually ran.
pub struct WorkflowConductor {
    graph: Arc<WorkflowGraph>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    contexts: ContextStore,
    flow: TaskFlow,
    /// Reached but not entered yet, in staging order.
    staged: Vec<TaskFlowEntry>,
    routes: Routes,
    barriers: HashMap<String, JoinBarrier>,
    /// Newest fired entry per join task; late arrivals are attached to it.
    joined: HashMap<String, usize>,
    errors: Vec<ExecutionError>,
    state: State,
}

impl WorkflowConductor {
    /// Conductor over `graph` with `initial` as context snapshot `0`.
    pub fn new(graph: Arc<WorkflowGraph>, initial: Map<String, Value>) -> Self {
        Self {
            graph,
            evaluator: Arc::new(Evaluator::new()),
            contexts: ContextStore::new(initial),
            flow: TaskFlow::new(),
            staged: Vec::new(),
            routes: Routes::new(),
            barriers: HashMap::new(),
            joined: HashMap::new(),
            errors: Vec::new(),
            state: State::Unset,
        }
    }

    /// Build a conductor for a definition.
    ///
    /// The initial context is `inputs` plus every top-level variable
    /// evaluated against `inputs` alone.
    pub fn from_spec(spec: &WorkflowSpec, inputs: Map<String, Value>) -> Result<Self> {
        validate_structure(spec)?;
        let graph = spec.graph()?;

        let evaluator = Evaluator::new();
        let mut initial = inputs.clone();
        {
            let scope = Scope::new(&inputs);
            for (name, raw) in spec.vars.iter() {
                let value = evaluator.evaluate(&Expression::new(raw.as_str()), &scope)?;
                initial.insert(name.clone(), value);
            }
        }

        Ok(Self::new(Arc::new(graph), initial))
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn flow(&self) -> &TaskFlow {
        &self.flow
    }

    pub fn contexts(&self) -> &ContextStore {
        &self.contexts
    }

    pub fn errors(&self) -> &[ExecutionError] {
        &self.errors
    }

    pub fn workflow_state(&self) -> State {
        self.state
    }

    /// Move the workflow to `state`.
    ///
    /// The first move to `running` stages every start task on route 0.
    pub fn request_workflow_state(&mut self, state: State) -> Result<()> {
        if state == self.state {
            return Ok(());
        }
        if !workflow_transition_allowed(self.state, state) {
            return Err(FlowError::InvalidWorkflowStateTransition {
                from: self.state,
                to: state,
            });
        }

        info!(from = %self.state, to = %state, "workflow state changed");
        self.state = state;

        if state == State::Running && self.flow.is_empty() && self.staged.is_empty() {
            for task in self.graph.start_tasks() {
                debug!(task = %task, "start task staged");
                self.staged
                    .push(TaskFlowEntry::new(task, 0, vec![0], BTreeMap::new()));
            }
        }

        self.try_complete();
        Ok(())
    }

    /// Enter `task_id` on `route` and return the new entry's index.
    ///
    /// Takes over the oldest staged arrival for `(task_id, route)` if there
    /// is one; otherwise the entry starts from the initial context. Always
    /// appends; re-entering a task keeps its earlier entries.
    pub fn add_task_flow(&mut self, task_id: &str, route: usize) -> Result<usize> {
        if !self.graph.has_task(task_id) {
            return Err(FlowError::InvalidTask(task_id.to_string()));
        }

        let entry = match self.staged_position(task_id, route) {
            Some(pos) => self.staged.remove(pos),
            None => TaskFlowEntry::new(task_id, route, vec![0], BTreeMap::new()),
        };
        let idx = self.flow.push(entry);
        if self.graph.join_policy(task_id).is_some_and(|j| j.is_join()) {
            self.joined.insert(task_id.to_string(), idx);
        }
        debug!(task = %task_id, route, idx, "task flow entry appended");
        Ok(idx)
    }

    fn staged_position(&self, task_id: &str, route: usize) -> Option<usize> {
        self.staged
            .iter()
            .position(|e| e.id == task_id && e.route == route)
    }

    fn stage(&mut self, entry: TaskFlowEntry) {
        debug!(task = %entry.id, route = entry.route, "task staged");
        self.staged.push(entry);
    }

    /// Sequence index of the newest entry for `(task_id, route)`.
    pub fn get_task_flow_idx(&self, task_id: &str, route: usize) -> Option<usize> {
        self.flow.current_idx(task_id, route)
    }

    pub fn get_task_flow_entry(&self, task_id: &str, route: usize) -> Option<&TaskFlowEntry> {
        self.get_task_flow_idx(task_id, route)
            .and_then(|idx| self.flow.get(idx))
    }

    pub fn get_start_tasks(&self) -> Vec<&str> {
        self.graph.start_tasks()
    }

    /// Context a task on `route` runs with: its staged arrival if one is
    /// waiting, otherwise its current entry.
    pub fn get_task_context(&self, task_id: &str, route: usize) -> Result<Map<String, Value>> {
        let entry = match self.staged_position(task_id, route) {
            Some(pos) => &self.staged[pos],
            None => self.require_entry(task_id, route)?,
        };
        self.contexts.union(&entry.ctxs.inbound)
    }

    /// Tasks waiting to be dispatched, with their input rendered: entries
    /// added but not started, then staged arrivals.
    pub fn get_next_tasks(&self) -> Result<Vec<NextTask>> {
        let mut next = Vec::new();

        let waiting = self
            .flow
            .sequence()
            .iter()
            .filter(|e| e.state.is_unset())
            .chain(self.staged.iter());
        for entry in waiting {
            let Some(task) = self.graph.task(&entry.id) else {
                continue;
            };
            let vars = self.contexts.union(&entry.ctxs.inbound)?;
            let scope = Scope::new(&vars);

            let mut input = Map::new();
            for (name, expr) in task.input.iter() {
                input.insert(name.clone(), self.evaluator.evaluate(expr, &scope)?);
            }

            next.push(NextTask {
                id: entry.id.clone(),
                route: entry.route,
                action: task.action.clone(),
                input,
            });
        }

        Ok(next)
    }

    fn require_entry(&self, task_id: &str, route: usize) -> Result<&TaskFlowEntry> {
        if !self.graph.has_task(task_id) {
            return Err(FlowError::InvalidTask(task_id.to_string()));
        }
        self.get_task_flow_entry(task_id, route)
            .ok_or_else(|| FlowError::InvalidTaskFlowEntry {
                task: task_id.to_string(),
                route,
            })
    }

    /// Apply a lifecycle event to the current entry for `(task_id, route)`.
    ///
    /// When the task is staged and its current entry (if any) is terminal,
    /// the staged arrival is entered first. A start task on route 0 with no
    /// entry is entered implicitly. An event that is not a legal forward move
    /// leaves the entry unchanged.
    ///
    /// Reaching `succeeded` evaluates outgoing transitions and stages every
    /// satisfied destination; any other terminal state advances nothing.
    pub fn update_task_flow(&mut self, task_id: &str, route: usize, event: TaskEvent) -> Result<()> {
        if !self.graph.has_task(task_id) {
            return Err(FlowError::InvalidTask(task_id.to_string()));
        }

        let current = self.get_task_flow_idx(task_id, route);
        let settled = current
            .and_then(|idx| self.flow.get(idx))
            .is_none_or(|e| e.state.is_terminal());

        let idx = match current {
            _ if settled && self.staged_position(task_id, route).is_some() => {
                self.add_task_flow(task_id, route)?
            }
            Some(idx) => idx,
            None if route == 0 && self.graph.is_start_task(task_id) => {
                self.add_task_flow(task_id, 0)?
            }
            None => {
                return Err(FlowError::InvalidTaskFlowEntry {
                    task: task_id.to_string(),
                    route,
                });
            }
        };

        let to = event.state();
        let entry = self
            .flow
            .get_mut(idx)
            .ok_or_else(|| FlowError::InvalidTaskFlowEntry {
                task: task_id.to_string(),
                route,
            })?;
        let from = entry.state;

        if from == to {
            debug!(task = %task_id, route, state = %to, "duplicate task event ignored");
            return Ok(());
        }
        if !task_transition_allowed(from, to) {
            warn!(task = %task_id, route, %from, %to, "invalid task state transition ignored");
            return Ok(());
        }

        entry.state = to;
        if let Some(result) = event.into_result() {
            entry.result = Some(result);
        }
        debug!(task = %task_id, route, idx, %from, %to, "task state applied");

        if to.is_terminal() {
            let advanced = if to == State::Succeeded {
                self.advance(idx)?
            } else {
                self.halt(idx)
            };

            if let Some(entry) = self.flow.get_mut(idx) {
                entry.term = !advanced;
            }
        }

        self.try_complete();
        Ok(())
    }

    /// Record every outgoing transition as not taken. Abended tasks also
    /// leave an error record.
    fn halt(&mut self, idx: usize) -> bool {
        let graph = Arc::clone(&self.graph);
        let Some(entry) = self.flow.get_mut(idx) else {
            return false;
        };

        for transition in graph.next_transitions(&entry.id) {
            entry
                .next
                .insert(Transition::key(&transition.destination, transition.index), false);
        }

        if entry.state.is_abended() {
            let mut error =
                ExecutionError::new("Execution failed. See result for details.", &entry.id, entry.route);
            error.result = entry.result.clone();
            info!(task = %entry.id, route = entry.route, state = %entry.state, "task failed");
            self.errors.push(error);
        }
        false
    }

    /// Evaluate outgoing transitions of a succeeded entry, clause by clause,
    /// and stage each satisfied destination. Returns whether any transition
    /// was taken.
    fn advance(&mut self, idx: usize) -> Result<bool> {
        let graph = Arc::clone(&self.graph);
        let (task_id, route, inbound, result) = match self.flow.get(idx) {
            Some(e) => (e.id.clone(), e.route, e.ctxs.inbound.clone(), e.result.clone()),
            None => return Ok(false),
        };

        let ctx = self.contexts.merge(&inbound)?;
        let vars = self.contexts.union(&[ctx])?;
        let task_states = self.flow.task_states();
        let scope = Scope::new(&vars)
            .with_current_task(CurrentTask {
                id: &task_id,
                route,
                state: State::Succeeded.as_str(),
                result: result.as_ref(),
            })
            .with_task_states(&task_states);

        let transitions = graph.next_transitions(&task_id);
        let mut next = BTreeMap::new();
        let mut arrivals = Vec::new();

        for clause in transitions.chunk_by(|a, b| a.index == b.index) {
            let first = clause[0];
            let prev_key = Transition::key(&task_id, first.index);

            let out_ctx = match self.evaluate_clause(first, &scope) {
                Ok(Some(bindings)) if bindings.is_empty() => Some(ctx),
                Ok(Some(bindings)) => Some(self.contexts.extend(ctx, bindings)?),
                Ok(None) => None,
                Err(err) => {
                    let mut error = ExecutionError::new(err.to_string(), &task_id, route);
                    error.task_transition_id = Some(prev_key.clone());
                    warn!(task = %task_id, route, transition = %prev_key, error = %err, "transition evaluation failed");
                    self.errors.push(error);
                    None
                }
            };

            for transition in clause {
                let satisfied = out_ctx.is_some();
                next.insert(Transition::key(&transition.destination, transition.index), satisfied);
                debug!(
                    task = %task_id,
                    route,
                    destination = %transition.destination,
                    satisfied,
                    "transition evaluated"
                );
                if let Some(out_ctx) = out_ctx {
                    arrivals.push((transition.destination.clone(), prev_key.clone(), out_ctx));
                }
            }
        }

        if let Some(entry) = self.flow.get_mut(idx) {
            entry.next.extend(next);
        }

        let advanced = !arrivals.is_empty();
        for (destination, prev_key, ctx) in arrivals {
            self.arrive(
                &destination,
                Arrival {
                    prev_key,
                    prev_idx: idx,
                    ctx,
                    route,
                },
            )?;
        }
        Ok(advanced)
    }

    /// `None` when the guard is not satisfied; otherwise the published
    /// bindings, all evaluated against the pre-publish scope.
    fn evaluate_clause(
        &self,
        transition: &Transition,
        scope: &Scope<'_>,
    ) -> std::result::Result<Option<Vec<(String, Value)>>, crate::expr::ExprError> {
        if let Some(guard) = &transition.guard {
            if !truthy(&self.evaluator.evaluate(guard, scope)?) {
                return Ok(None);
            }
        }

        let mut bindings = Vec::with_capacity(transition.publish.len());
        for (name, expr) in transition.publish.iter() {
            bindings.push((name.clone(), self.evaluator.evaluate(expr, scope)?));
        }
        Ok(Some(bindings))
    }

    fn arrive(&mut self, destination: &str, arrival: Arrival) -> Result<()> {
        let graph = Arc::clone(&self.graph);
        let Some(task) = graph.task(destination) else {
            return Err(FlowError::InvalidTask(destination.to_string()));
        };

        if !task.join.is_join() {
            let route = if graph.is_split_task(destination) {
                self.routes.branch(arrival.route, &arrival.prev_key)
            } else {
                arrival.route
            };
            let prev = BTreeMap::from([(arrival.prev_key, arrival.prev_idx)]);
            self.stage(TaskFlowEntry::new(destination, route, vec![arrival.ctx], prev));
            return Ok(());
        }

        // Arrivals after the join fired are attached to the staged or running
        // entry.
        if !self.barriers.contains_key(destination) {
            let fired = match self.staged.iter_mut().rev().find(|e| e.id == destination) {
                Some(entry) => Some(entry),
                None => self
                    .joined
                    .get(destination)
                    .copied()
                    .and_then(|idx| self.flow.get_mut(idx)),
            };
            if let Some(entry) = fired {
                if !entry.state.is_terminal() && !entry.prev.contains_key(&arrival.prev_key) {
                    debug!(task = %destination, transition = %arrival.prev_key, "late arrival at fired join");
                    entry.prev.insert(arrival.prev_key, arrival.prev_idx);
                    return Ok(());
                }
            }
        }

        let required = task.join.required(graph.prev_transitions(destination).len());
        let barrier = self.barriers.entry(destination.to_string()).or_default();
        barrier.arrive(arrival);
        debug!(
            task = %destination,
            arrived = barrier.arrivals.len(),
            required,
            "join barrier progress"
        );
        if barrier.arrivals.len() < required {
            return Ok(());
        }

        let Some(barrier) = self.barriers.remove(destination) else {
            return Ok(());
        };
        let routes: Vec<usize> = barrier.arrivals.iter().map(|a| a.route).collect();
        let route = self.routes.common(&routes);

        let mut inbound = Vec::new();
        let mut prev = BTreeMap::new();
        for arrival in barrier.arrivals {
            if !inbound.contains(&arrival.ctx) {
                inbound.push(arrival.ctx);
            }
            prev.insert(arrival.prev_key, arrival.prev_idx);
        }

        info!(task = %destination, route, "join satisfied");
        self.stage(TaskFlowEntry::new(destination, route, inbound, prev));
        Ok(())
    }

    /// Settle the workflow once nothing is left in flight.
    ///
    /// A join barrier still waiting at that point can never fire, so it does
    /// not hold the workflow open.
    fn try_complete(&mut self) {
        let entries = self.flow.sequence();
        let next = match self.state {
            State::Running | State::Resuming => {
                if entries.is_empty()
                    || !self.staged.is_empty()
                    || !entries.iter().all(|e| e.state.is_terminal())
                {
                    return;
                }
                for task in self.barriers.keys() {
                    warn!(task = %task, "join never satisfied");
                }
                if self.errors.is_empty() {
                    State::Succeeded
                } else {
                    State::Failed
                }
            }
            State::Canceling if !entries.iter().any(|e| e.state.is_active()) => State::Canceled,
            State::Pausing if !entries.iter().any(|e| e.state.is_active()) => State::Paused,
            _ => return,
        };

        info!(from = %self.state, to = %next, "workflow completed");
        self.state = next;
    }
}
