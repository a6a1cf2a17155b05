// src/lib.rs

pub mod conducting;
pub mod context;
pub mod errors;
pub mod expr;
pub mod graph;
pub mod logging;
pub mod spec;
pub mod validation;

use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, info};

pub use crate::conducting::{State, TaskEvent, TaskFlowEntry, WorkflowConductor};
pub use crate::errors::{FlowError, Result};
pub use crate::graph::WorkflowGraph;
pub use crate::spec::WorkflowSpec;
pub use crate::validation::ValidationReport;

use crate::spec::{load_and_validate, load_from_path, validate_structure};

/// High-level entry point for embedding applications.
///
/// This wires together:
/// - definition loading and structural checks
/// - variable validation (rejecting the definition in strict mode)
/// - initial context evaluation
/// - a conductor already moved to `running`, with its start tasks staged
///
/// The caller then dispatches [`WorkflowConductor::get_next_tasks`] and feeds
/// the results back through [`WorkflowConductor::update_task_flow`].
pub fn start(path: impl AsRef<Path>, inputs: Map<String, Value>) -> Result<WorkflowConductor> {
    let path = path.as_ref();
    let spec = load_and_validate(path)?;

    let mut conductor = WorkflowConductor::from_spec(&spec, inputs)?;
    conductor.request_workflow_state(State::Running)?;

    info!(
        path = ?path,
        start_tasks = ?conductor.get_start_tasks(),
        "workflow started"
    );
    Ok(conductor)
}

/// Load a definition and return every variable diagnostic without failing
/// on them, regardless of `[config] strict`.
pub fn lint(path: impl AsRef<Path>) -> Result<ValidationReport> {
    let spec = load_from_path(&path)?;
    validate_structure(&spec)?;

    let report = spec.validate()?;
    debug!(diagnostics = report.len(), "lint complete");
    Ok(report)
}
