// src/validation/definiteness.rs

//! Must-be-defined dataflow analysis.
//!
//! Each task gets the set of variables guaranteed to be bound when it runs.
//! The sets are solved as a greatest fixpoint with a work-list: tasks not
//! reached yet hold `None` (every variable), so the first pass through a loop
//! does not wrongly shrink the loop head, and every later update can only
//! remove variables. The lattice is finite, so the loop terminates.
//!
//! Merge rules at a task with several inbound transitions mirror the
//! conductor:
//! - no join: any single arrival fires the task, so only variables present
//!   on every branch are guaranteed (intersection);
//! - `join = n` over `k` branches: a variable is guaranteed unless `n`
//!   branches can arrive without it, i.e. fewer than `n` branches lack it.
//!   For `all` this is the union; for `n = 1` it is the intersection.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::expr::{Expression, ExpressionEvaluator};
use crate::graph::{JoinPolicy, Transition, WorkflowGraph};
use crate::validation::diagnostics::{Diagnostic, DiagnosticKind, Location, ValidationReport};

type VarSet = BTreeSet<String>;

/// Validate every expression in the workflow and return all findings.
///
/// `inputs` are the declared input names and `vars` the top-level variable
/// expressions; the graph supplies task inputs, guards and publishes.
pub fn validate_workflow(
    graph: &WorkflowGraph,
    inputs: &[String],
    vars: &BTreeMap<String, String>,
    evaluator: &dyn ExpressionEvaluator,
) -> ValidationReport {
    let mut report = ValidationReport::new();
    let input_set: VarSet = inputs.iter().cloned().collect();

    // Top-level vars only ever see the inputs, never each other.
    for raw in vars.values() {
        check(
            &Expression::new(raw.as_str()),
            &input_set,
            &Location::Vars,
            evaluator,
            &mut report,
        );
    }

    let mut initial = input_set;
    initial.extend(vars.keys().cloned());

    let available = available_variables(graph, &initial);

    for task in graph.tasks() {
        let avail = &available[&task.id];

        let input_loc = Location::TaskInput {
            task: task.id.clone(),
        };
        for (_, expr) in task.input.iter() {
            check(expr, avail, &input_loc, evaluator, &mut report);
        }

        for transition in clauses(graph.next_transitions(&task.id)) {
            if let Some(guard) = &transition.guard {
                let loc = Location::TransitionGuard {
                    task: task.id.clone(),
                    index: transition.index,
                };
                check(guard, avail, &loc, evaluator, &mut report);
            }

            // Right-hand sides see the context before this publish applies.
            let loc = Location::TransitionPublish {
                task: task.id.clone(),
                index: transition.index,
            };
            for (_, expr) in transition.publish.iter() {
                check(expr, avail, &loc, evaluator, &mut report);
            }
        }
    }

    check_join_conflicts(graph, &mut report);

    debug!(diagnostics = report.len(), "variable validation finished");
    report
}

/// Guaranteed-available variables at each task's entry.
///
/// Tasks unreachable from any start task are given the initial set.
pub fn available_variables(graph: &WorkflowGraph, initial: &VarSet) -> HashMap<String, VarSet> {
    let starts: HashSet<&str> = graph.start_tasks().into_iter().collect();
    let mut state: HashMap<&str, Option<VarSet>> =
        graph.tasks().map(|t| (t.id.as_str(), None)).collect();

    let mut queue: VecDeque<&str> = graph.tasks().map(|t| t.id.as_str()).collect();
    let mut queued: HashSet<&str> = queue.iter().copied().collect();
    let mut updates = 0usize;

    while let Some(task) = queue.pop_front() {
        queued.remove(task);

        let entry = starts.contains(task).then_some(initial);
        let computed = incoming(graph, task, entry, &state);
        if state.get(task) == Some(&computed) {
            continue;
        }

        state.insert(task, computed);
        updates += 1;

        for transition in graph.next_transitions(task) {
            let dest = transition.destination.as_str();
            if queued.insert(dest) {
                queue.push_back(dest);
            }
        }
    }

    debug!(updates, "definiteness fixpoint reached");

    state
        .into_iter()
        .map(|(task, set)| (task.to_string(), set.unwrap_or_else(|| initial.clone())))
        .collect()
}

/// Variables on the far side of a transition: the source's set plus the
/// names the transition publishes.
fn outgoing(transition: &Transition, source: &Option<VarSet>) -> Option<VarSet> {
    source.as_ref().map(|avail| {
        let mut out = avail.clone();
        out.extend(transition.publish.iter().map(|(name, _)| name.clone()));
        out
    })
}

fn incoming(
    graph: &WorkflowGraph,
    task: &str,
    entry: Option<&VarSet>,
    state: &HashMap<&str, Option<VarSet>>,
) -> Option<VarSet> {
    let branches: Vec<Option<VarSet>> = graph
        .prev_transitions(task)
        .into_iter()
        .map(|t| outgoing(t, state.get(t.source.as_str()).unwrap_or(&None)))
        .collect();

    let arrived = match graph.join_policy(task).unwrap_or_default() {
        JoinPolicy::None => branches.into_iter().flatten().reduce(|acc, branch| {
            acc.intersection(&branch).cloned().collect()
        }),
        policy => {
            let required = policy.required(branches.len());
            let reached: Vec<VarSet> = branches.into_iter().flatten().collect();

            // Too few branches reached to fire the join: still unconstrained.
            if reached.is_empty() || reached.len() < required {
                None
            } else {
                let candidates: VarSet = reached.iter().flatten().cloned().collect();
                Some(
                    candidates
                        .into_iter()
                        .filter(|var| {
                            reached.iter().filter(|b| !b.contains(var)).count() < required
                        })
                        .collect(),
                )
            }
        }
    };

    // A start task is also entered directly with the initial context.
    match (entry, arrived) {
        (Some(initial), Some(arrived)) => Some(initial.intersection(&arrived).cloned().collect()),
        (Some(initial), None) => Some(initial.clone()),
        (None, arrived) => arrived,
    }
}

/// First transition of each `next` clause; destinations listed in the same
/// clause share their guard and publish.
fn clauses(transitions: Vec<&Transition>) -> impl Iterator<Item = &Transition> {
    let mut last = None;
    transitions.into_iter().filter(move |t| {
        let fresh = last != Some(t.index);
        last = Some(t.index);
        fresh
    })
}

fn check(
    expr: &Expression,
    available: &VarSet,
    location: &Location,
    evaluator: &dyn ExpressionEvaluator,
    report: &mut ValidationReport,
) {
    let Some(dialect) = expr.dialect() else {
        return;
    };
    for var in evaluator.extract_variables(expr) {
        if !available.contains(&var) {
            report.push(Diagnostic::undefined_variable(
                dialect,
                expr.source(),
                &var,
                location,
            ));
        }
    }
}

/// Variables published by more than one inbound branch of a join that waits
/// for several branches. Which value survives the merge depends on arrival
/// order, so each later publisher is reported.
fn check_join_conflicts(graph: &WorkflowGraph, report: &mut ValidationReport) {
    for task in graph.tasks() {
        let prev = graph.prev_transitions(&task.id);
        if !task.join.is_join() || task.join.required(prev.len()) < 2 {
            continue;
        }

        let mut publishers: HashMap<&str, (&str, usize)> = HashMap::new();
        for transition in prev {
            for (name, expr) in transition.publish.iter() {
                let here = (transition.source.as_str(), transition.index);
                match publishers.get(name.as_str()) {
                    None => {
                        publishers.insert(name.as_str(), here);
                    }
                    Some(first) if *first == here => {}
                    Some((first_task, _)) => {
                        let location = Location::TransitionPublish {
                            task: transition.source.clone(),
                            index: transition.index,
                        };
                        report.push(Diagnostic::new(
                            DiagnosticKind::Conflict,
                            expr.source(),
                            format!(
                                "Variable \"{name}\" is also published by task \"{first_task}\"; \
                                 both branches join at task \"{}\".",
                                task.id
                            ),
                            &location,
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Task;

    fn set(names: &[&str]) -> VarSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn threshold_join_generalizes_union_and_intersection() {
        let mut g = WorkflowGraph::new();
        for t in ["s", "a", "b", "c"] {
            g.add_task(Task::new(t)).unwrap();
        }
        g.add_task(Task::new("all").with_join(JoinPolicy::All)).unwrap();
        g.add_task(Task::new("two").with_join(JoinPolicy::Count(2))).unwrap();
        g.add_task(Task::new("one").with_join(JoinPolicy::Count(1))).unwrap();
        for (i, b) in ["a", "b", "c"].into_iter().enumerate() {
            g.add_transition(Transition::new("s", b, i)).unwrap();
        }
        for join in ["all", "two", "one"] {
            g.add_transition(Transition::new("a", join, 0).publish("x", "1").publish("y", "1"))
                .unwrap();
            g.add_transition(Transition::new("b", join, 0).publish("x", "1")).unwrap();
            g.add_transition(Transition::new("c", join, 0).publish("z", "1")).unwrap();
        }

        let avail = available_variables(&g, &set(&["in"]));
        assert_eq!(avail["all"], set(&["in", "x", "y", "z"]));
        // Any two of three: x is missing only on c, y and z on two branches.
        assert_eq!(avail["two"], set(&["in", "x"]));
        assert_eq!(avail["one"], set(&["in"]));
    }

    #[test]
    fn loop_head_keeps_what_every_pass_guarantees() {
        let mut g = WorkflowGraph::new();
        for t in ["init", "head", "body"] {
            g.add_task(Task::new(t)).unwrap();
        }
        g.add_transition(Transition::new("init", "head", 0).publish("i", "0")).unwrap();
        g.add_transition(Transition::new("head", "body", 0)).unwrap();
        g.add_transition(Transition::new("body", "head", 0).publish("acc", "1")).unwrap();

        let avail = available_variables(&g, &set(&[]));
        assert_eq!(avail["head"], set(&["i"]));
        assert_eq!(avail["body"], set(&["i"]));
    }

    #[test]
    fn unreachable_tasks_fall_back_to_initial() {
        let mut g = WorkflowGraph::new();
        for t in ["start", "x", "y"] {
            g.add_task(Task::new(t)).unwrap();
        }
        g.add_transition(Transition::new("x", "y", 0)).unwrap();
        g.add_transition(Transition::new("y", "x", 0)).unwrap();

        let avail = available_variables(&g, &set(&["in"]));
        assert_eq!(avail["x"], set(&["in"]));
    }
}
