use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::Map;
use taskflow::conducting::{State, WorkflowConductor};
use taskflow::graph::{JoinPolicy, Task, Transition, WorkflowGraph};
use taskflow::validation::available_variables;
use taskflow_test_utils::run_to_completion;

const NAMES: [&str; 4] = ["a", "b", "c", "d"];

/// Raw edge: (source, destination, published variable).
type RawEdge = (usize, usize, Option<usize>);

// Forward edges only go from a lower to a higher task index, so the graph is
// acyclic unless back edges are added explicitly.
fn edges_strategy(max_tasks: usize) -> impl Strategy<Value = (usize, Vec<RawEdge>, Vec<RawEdge>)> {
    (2..=max_tasks).prop_flat_map(|n| {
        let edge = (0..n, 0..n, proptest::option::of(0..NAMES.len()));
        (
            Just(n),
            proptest::collection::vec(edge.clone(), 1..(n * 2)),
            proptest::collection::vec(edge, 0..3),
        )
    })
}

fn build(n: usize, forward: &[RawEdge], back: &[RawEdge], join: JoinPolicy) -> WorkflowGraph {
    let mut g = WorkflowGraph::new();
    for i in 0..n {
        g.add_task(Task::new(format!("t{i}")).with_join(join)).unwrap();
    }

    let mut clause = vec![0usize; n];
    let mut add = |g: &mut WorkflowGraph, src: usize, dst: usize, publish: Option<usize>| {
        let mut t = Transition::new(format!("t{src}"), format!("t{dst}"), clause[src]);
        clause[src] += 1;
        if let Some(p) = publish {
            t = t.publish(NAMES[p], "1");
        }
        g.add_transition(t).unwrap();
    };

    for &(a, b, publish) in forward {
        if a != b {
            add(&mut g, a.min(b), a.max(b), publish);
        }
    }
    for &(a, b, publish) in back {
        if a != b {
            add(&mut g, a.max(b), a.min(b), publish);
        }
    }
    g
}

proptest! {
    #[test]
    fn join_all_never_guarantees_less_than_no_join(
        (n, forward, _back) in edges_strategy(7)
    ) {
        // Acyclic, so every task is reached and no set falls back to the
        // initial one.
        let initial: BTreeSet<String> = ["input".to_string()].into_iter().collect();
        let plain = available_variables(&build(n, &forward, &[], JoinPolicy::None), &initial);
        let joined = available_variables(&build(n, &forward, &[], JoinPolicy::All), &initial);

        for (task, vars) in plain.iter() {
            prop_assert!(vars.is_subset(&joined[task]), "{task}: {vars:?} vs {:?}", joined[task]);
        }
    }

    #[test]
    fn start_tasks_always_see_the_initial_set(
        (n, forward, back) in edges_strategy(7)
    ) {
        let g = build(n, &forward, &back, JoinPolicy::None);
        let initial: BTreeSet<String> = ["input".to_string()].into_iter().collect();
        let avail = available_variables(&g, &initial);

        prop_assert_eq!(avail.len(), n);
        for task in g.start_tasks() {
            prop_assert!(avail[task].contains("input"));
        }
    }

    #[test]
    fn acyclic_runs_only_append_and_settle(
        (n, forward, _back) in edges_strategy(6)
    ) {
        let g = build(n, &forward, &[], JoinPolicy::None);
        let mut c = WorkflowConductor::new(Arc::new(g), Map::new());
        c.request_workflow_state(State::Running).unwrap();

        let ran = run_to_completion(&mut c, 500).unwrap();
        prop_assert_eq!(ran.len(), c.flow().len());
        prop_assert_eq!(c.workflow_state(), State::Succeeded);

        for (idx, entry) in c.flow().sequence().iter().enumerate() {
            prop_assert!(entry.state.is_terminal());
            for (key, prev) in entry.prev.iter() {
                prop_assert!(*prev < idx);
                let prefix = format!("{}__t", c.flow().sequence()[*prev].id);
                prop_assert!(key.starts_with(&prefix), "{key}");
            }
        }
    }
}
