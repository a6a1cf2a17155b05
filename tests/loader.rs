mod common;

use std::error::Error;

use serde_json::json;
use taskflow::errors::FlowError;
use taskflow::spec::{load_and_validate, load_from_path};
use taskflow::State;
use taskflow_test_utils::init_tracing;

use common::{inputs, write_definition};

type TestResult = Result<(), Box<dyn Error>>;

const LENIENT: &str = r#"
version = "1.0"
description = "two steps"
input = ["who"]

[tasks.greet]
action = "core.echo"
input = { message = "hello <% $.who %>" }

[[tasks.greet.next]]
when = "<% succeeded() %>"
publish = { greeted = "<% $.who %>" }
do = "done"

[tasks.done]
input = { note = "<% $.missing %>" }
"#;

#[test]
fn loads_definition_from_disk() -> TestResult {
    let (_dir, path) = write_definition(LENIENT);
    let spec = load_from_path(&path)?;

    assert_eq!(spec.description.as_deref(), Some("two steps"));
    assert_eq!(spec.tasks.len(), 2);
    assert_eq!(spec.tasks["greet"].action.as_deref(), Some("core.echo"));
    assert!(!spec.config.strict);
    Ok(())
}

#[test]
fn lenient_mode_keeps_definitions_with_diagnostics() -> TestResult {
    init_tracing();
    let (_dir, path) = write_definition(LENIENT);
    assert!(load_and_validate(&path).is_ok());

    let report = taskflow::lint(&path)?;
    assert_eq!(report.len(), 1);
    assert_eq!(report.context[0].spec_path, "tasks.done.input");
    Ok(())
}

#[test]
fn strict_mode_rejects_definitions_with_diagnostics() {
    let strict = format!("{LENIENT}\n[config]\nstrict = true\n");
    let (_dir, path) = write_definition(&strict);

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, FlowError::ConfigError(ref m) if m.contains("missing")));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, FlowError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let (_dir, path) = write_definition("[tasks.a\n");
    assert!(matches!(
        load_from_path(&path).unwrap_err(),
        FlowError::TomlError(_)
    ));
}

#[test]
fn start_returns_a_running_conductor() -> TestResult {
    let (_dir, path) = write_definition(LENIENT);
    let conductor = taskflow::start(&path, inputs(json!({"who": "world"})))?;

    assert_eq!(conductor.workflow_state(), State::Running);
    let next = conductor.get_next_tasks()?;
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].id, "greet");
    assert_eq!(next[0].action.as_deref(), Some("core.echo"));
    assert_eq!(next[0].input.get("message"), Some(&json!("hello world")));
    Ok(())
}
