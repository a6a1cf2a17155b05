// src/spec/loader.rs

use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::{FlowError, Result};
use crate::spec::model::WorkflowSpec;
use crate::spec::validate::validate_structure;

/// Load a workflow definition from a given path and return the raw
/// `WorkflowSpec`.
///
/// This only performs TOML deserialization; it does **not** perform
/// structural or variable validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<WorkflowSpec> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let spec = WorkflowSpec::from_toml_str(&contents)?;
    debug!(path = ?path, tasks = spec.tasks.len(), "workflow definition loaded");
    Ok(spec)
}

/// Load a workflow definition from path and validate it.
///
/// This is the recommended entry point for embedding applications:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks structure: unknown `do` targets, join thresholds, empty workflows.
/// - Runs variable validation; with `[config] strict = true` any diagnostic
///   rejects the definition, otherwise diagnostics are only logged.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowSpec> {
    let spec = load_from_path(&path)?;
    validate_structure(&spec)?;

    let report = spec.validate()?;
    if !report.is_empty() {
        for diag in report.all() {
            warn!(
                path = %diag.spec_path,
                expression = %diag.expression,
                "{}",
                diag.message
            );
        }
        if spec.config.strict {
            return Err(FlowError::ConfigError(format!(
                "workflow has {} variable diagnostic(s); first: {}",
                report.len(),
                report
                    .all()
                    .next()
                    .map(|d| d.message.as_str())
                    .unwrap_or_default()
            )));
        }
    }

    Ok(spec)
}
