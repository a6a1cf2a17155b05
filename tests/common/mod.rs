#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use serde_json::{Map, Value};
use taskflow::WorkflowSpec;
use tempfile::TempDir;

/// Parse an inline TOML definition.
pub fn spec(toml: &str) -> WorkflowSpec {
    WorkflowSpec::from_toml_str(toml).expect("test definition must parse")
}

/// Write a definition into a fresh temp directory.
///
/// Keep the returned `TempDir` alive for as long as the path is used.
pub fn write_definition(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("workflow.toml");
    fs::write(&path, contents).expect("write definition");
    (dir, path)
}

pub fn inputs(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("inputs must be a JSON object, got {other}"),
    }
}
