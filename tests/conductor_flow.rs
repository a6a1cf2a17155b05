mod common;

use std::collections::BTreeMap;
use std::error::Error;

use serde_json::{Map, json};
use taskflow::conducting::{State, TaskEvent, WorkflowConductor};
use taskflow_test_utils::{forward_task_states, init_tracing, run_to_completion};

use common::{inputs, spec};

type TestResult = Result<(), Box<dyn Error>>;

fn keys(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

const SPLIT: &str = r#"
[tasks.task1]
[[tasks.task1.next]]
do = "task2, task3"

[tasks.task2]
[[tasks.task2.next]]
do = "task4"

[tasks.task3]
[[tasks.task3.next]]
do = "task4"

[tasks.task4]
[[tasks.task4.next]]
do = "task5"

[tasks.task5]
"#;

#[test]
fn split_task_runs_each_arrival_on_its_own_route() -> TestResult {
    init_tracing();
    let mut c = WorkflowConductor::from_spec(&spec(SPLIT), Map::new())?;
    c.request_workflow_state(State::Running)?;

    let ran = run_to_completion(&mut c, 20)?;
    assert_eq!(
        ran,
        vec!["task1", "task2", "task3", "task4", "task4", "task5", "task5"]
    );

    let via_task2 = c.get_task_flow_entry("task4", 1).ok_or("task4 route 1")?;
    assert_eq!(via_task2.prev, keys(&[("task2__t0", 1)]));
    let via_task3 = c.get_task_flow_entry("task4", 2).ok_or("task4 route 2")?;
    assert_eq!(via_task3.prev, keys(&[("task3__t0", 2)]));

    // Downstream of the split stays on the branch's route.
    assert!(c.get_task_flow_entry("task5", 1).is_some());
    assert!(c.get_task_flow_entry("task5", 2).is_some());
    assert_eq!(c.get_task_flow_idx("task5", 0), None);

    assert_eq!(c.workflow_state(), State::Succeeded);
    Ok(())
}

const JOIN_ALL: &str = r#"
input = ["x"]

[tasks.task1]
[[tasks.task1.next]]
do = "task2, task3"

[tasks.task2]
[[tasks.task2.next]]
publish = { foo = "<% $.x + 1 %>" }
do = "task4"

[tasks.task3]
[[tasks.task3.next]]
publish = { bar = "b" }
do = "task4"

[tasks.task4]
join = "all"
input = { total = "<% $.foo + $.x %>" }
"#;

#[test]
fn join_all_waits_for_every_branch_and_merges_contexts() -> TestResult {
    init_tracing();
    let mut c = WorkflowConductor::from_spec(&spec(JOIN_ALL), inputs(json!({"x": 1})))?;
    c.request_workflow_state(State::Running)?;

    forward_task_states(&mut c, "task1", 0, State::Succeeded, None)?;
    forward_task_states(&mut c, "task2", 0, State::Succeeded, None)?;
    assert_eq!(c.get_task_flow_idx("task4", 0), None);
    assert_eq!(c.workflow_state(), State::Running);

    forward_task_states(&mut c, "task3", 0, State::Succeeded, None)?;
    let next = c.get_next_tasks()?;
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, "task4");
    assert_eq!(next[0].input.get("total"), Some(&json!(3)));

    let ctx = c.get_task_context("task4", 0)?;
    assert_eq!(ctx.get("foo"), Some(&json!(2)));
    assert_eq!(ctx.get("bar"), Some(&json!("b")));
    assert_eq!(ctx.get("x"), Some(&json!(1)));

    forward_task_states(&mut c, "task4", 0, State::Succeeded, None)?;
    let join = c.get_task_flow_entry("task4", 0).ok_or("join entry")?;
    assert_eq!(join.prev, keys(&[("task2__t0", 1), ("task3__t0", 2)]));
    assert_eq!(join.ctxs.inbound, vec![1, 2]);
    assert_eq!(c.workflow_state(), State::Succeeded);
    Ok(())
}

const JOIN_TWO: &str = r#"
[tasks.task1]
[[tasks.task1.next]]
do = ["task2", "task3", "task4"]

[tasks.task2]
[[tasks.task2.next]]
do = "task5"

[tasks.task3]
[[tasks.task3.next]]
do = "task5"

[tasks.task4]
[[tasks.task4.next]]
do = "task5"

[tasks.task5]
join = 2
"#;

#[test]
fn count_join_fires_once_and_records_late_arrival() -> TestResult {
    let mut c = WorkflowConductor::from_spec(&spec(JOIN_TWO), Map::new())?;
    for task in ["task1", "task2", "task3"] {
        forward_task_states(&mut c, task, 0, State::Succeeded, None)?;
    }

    assert_eq!(c.get_task_flow_idx("task5", 0), None);
    let next: Vec<String> = c.get_next_tasks()?.into_iter().map(|t| t.id).collect();
    assert_eq!(next, vec!["task4", "task5"]);

    forward_task_states(&mut c, "task4", 0, State::Succeeded, None)?;
    assert_eq!(c.flow().len(), 4);

    c.update_task_flow("task5", 0, TaskEvent::Running)?;
    assert_eq!(c.get_task_flow_idx("task5", 0), Some(4));
    assert_eq!(c.flow().len(), 5);
    assert_eq!(
        c.get_task_flow_entry("task5", 0).ok_or("join entry")?.prev,
        keys(&[("task2__t0", 1), ("task3__t0", 2), ("task4__t0", 3)])
    );
    Ok(())
}

const GUARDED: &str = r#"
[tasks.task1]

[[tasks.task1.next]]
when = "<% succeeded() and result().code = 0 %>"
publish = { out = "<% result().stdout %>" }
do = "task2"

[[tasks.task1.next]]
when = "<% result().code != 0 %>"
do = "task3"

[tasks.task2]
[tasks.task3]
"#;

#[test]
fn guards_and_publish_see_the_task_result() -> TestResult {
    let mut c = WorkflowConductor::from_spec(&spec(GUARDED), Map::new())?;
    forward_task_states(
        &mut c,
        "task1",
        0,
        State::Succeeded,
        Some(json!({"code": 0, "stdout": "hi"})),
    )?;

    let entry = c.get_task_flow_entry("task1", 0).ok_or("task1")?;
    assert_eq!(
        entry.next,
        BTreeMap::from([("task2__t0".to_string(), true), ("task3__t1".to_string(), false)])
    );
    assert!(!entry.term);
    assert_eq!(c.get_task_context("task2", 0)?.get("out"), Some(&json!("hi")));
    assert_eq!(c.get_task_flow_idx("task3", 0), None);
    Ok(())
}

#[test]
fn failing_guard_is_recorded_and_not_taken() -> TestResult {
    let def = r#"
[tasks.task1]
[[tasks.task1.next]]
when = "<% $.missing %>"
do = "task2"

[tasks.task2]
"#;
    let mut c = WorkflowConductor::from_spec(&spec(def), Map::new())?;
    forward_task_states(&mut c, "task1", 0, State::Succeeded, None)?;

    let entry = c.get_task_flow_entry("task1", 0).ok_or("task1")?;
    assert_eq!(entry.next.get("task2__t0"), Some(&false));
    assert!(entry.term);

    let errors = c.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].task_id, "task1");
    assert_eq!(errors[0].task_transition_id.as_deref(), Some("task1__t0"));
    assert!(errors[0].message.contains("missing"));
    Ok(())
}

#[test]
fn vars_are_evaluated_into_the_initial_context() -> TestResult {
    let def = r#"
input = ["y"]

[vars]
double = "<% $.y * 2 %>"
greeting = "hello {{ _.y }}"

[tasks.task1]
"#;
    let c = WorkflowConductor::from_spec(&spec(def), inputs(json!({"y": 2})))?;
    assert_eq!(c.contexts().lookup(0, "double"), Some(&json!(4)));
    assert_eq!(c.contexts().lookup(0, "greeting"), Some(&json!("hello 2")));
    assert_eq!(c.contexts().lookup(0, "y"), Some(&json!(2)));
    Ok(())
}

#[test]
fn failed_task_fails_the_workflow_once_settled() -> TestResult {
    let def = r#"
[tasks.task1]
[[tasks.task1.next]]
when = "<% succeeded() %>"
do = "task2"

[tasks.task2]
"#;
    let mut c = WorkflowConductor::from_spec(&spec(def), Map::new())?;
    c.request_workflow_state(State::Running)?;
    forward_task_states(&mut c, "task1", 0, State::Failed, Some(json!("boom")))?;

    assert_eq!(c.workflow_state(), State::Failed);
    assert_eq!(c.errors().len(), 1);
    assert_eq!(c.errors()[0].result, Some(json!("boom")));
    assert!(c.get_next_tasks()?.is_empty());
    Ok(())
}

#[test]
fn duplicate_events_are_dropped() -> TestResult {
    let mut c = WorkflowConductor::from_spec(&spec(SPLIT), Map::new())?;
    forward_task_states(&mut c, "task1", 0, State::Succeeded, None)?;
    let len = c.flow().len();

    c.update_task_flow("task1", 0, TaskEvent::Succeeded { result: None })?;
    c.update_task_flow("task1", 0, TaskEvent::Running)?;
    assert_eq!(c.flow().len(), len);
    assert_eq!(
        c.get_task_flow_entry("task1", 0).ok_or("task1")?.state,
        State::Succeeded
    );
    Ok(())
}

#[test]
fn unsatisfiable_join_does_not_hold_the_workflow_open() -> TestResult {
    let def = r#"
[tasks.task1]
[[tasks.task1.next]]
do = "task2, task3"

[tasks.task2]
[[tasks.task2.next]]
do = "task4"

[tasks.task3]
[[tasks.task3.next]]
when = "<% failed() %>"
do = "task4"

[tasks.task4]
join = "all"
"#;
    let mut c = WorkflowConductor::from_spec(&spec(def), Map::new())?;
    c.request_workflow_state(State::Running)?;

    let ran = run_to_completion(&mut c, 10)?;
    assert_eq!(ran, vec!["task1", "task2", "task3"]);
    assert_eq!(c.get_task_flow_idx("task4", 0), None);
    assert!(c.errors().is_empty());
    assert_eq!(c.workflow_state(), State::Succeeded);
    Ok(())
}

#[test]
fn malformed_event_is_rejected_before_it_reaches_the_flow() {
    assert!(TaskEvent::try_from("foobar").is_err());
}
