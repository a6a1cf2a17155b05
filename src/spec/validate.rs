// src/spec/validate.rs

use std::collections::HashMap;

use crate::errors::{FlowError, Result};
use crate::graph::JoinPolicy;
use crate::spec::model::WorkflowSpec;

/// Run structural validation against a loaded definition.
///
/// This checks:
/// - there is at least one task
/// - every `do` target refers to an existing task
/// - join thresholds are between 1 and the task's inbound transition count
/// - join tasks have at least one inbound transition
///
/// Cycles are allowed; they are how workflows express loops.
pub fn validate_structure(spec: &WorkflowSpec) -> Result<()> {
    ensure_has_tasks(spec)?;
    validate_targets(spec)?;
    validate_joins(spec)?;
    Ok(())
}

fn ensure_has_tasks(spec: &WorkflowSpec) -> Result<()> {
    if spec.tasks.is_empty() {
        return Err(FlowError::ConfigError(
            "workflow must contain at least one [tasks.<name>] section".into(),
        ));
    }
    Ok(())
}

fn validate_targets(spec: &WorkflowSpec) -> Result<()> {
    for (name, task) in spec.tasks.iter() {
        for (idx, next) in task.next.iter().enumerate() {
            for target in next.targets.iter() {
                if !spec.tasks.contains_key(target) {
                    return Err(FlowError::ConfigError(format!(
                        "task '{name}' has unknown task '{target}' in next[{idx}].do"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_joins(spec: &WorkflowSpec) -> Result<()> {
    let mut inbound: HashMap<&str, usize> = HashMap::new();
    for task in spec.tasks.values() {
        for next in task.next.iter() {
            for target in next.targets.iter() {
                *inbound.entry(target.as_str()).or_default() += 1;
            }
        }
    }

    for (name, task) in spec.tasks.iter() {
        let Some(join) = task.join else {
            continue;
        };
        let count = inbound.get(name.as_str()).copied().unwrap_or(0);

        match join {
            JoinPolicy::None => {}
            _ if count == 0 => {
                return Err(FlowError::ConfigError(format!(
                    "task '{name}' declares join = {join} but has no inbound transitions"
                )));
            }
            JoinPolicy::Count(0) => {
                return Err(FlowError::ConfigError(format!(
                    "task '{name}' declares join = 0; the count must be at least 1"
                )));
            }
            JoinPolicy::Count(n) if n > count => {
                return Err(FlowError::ConfigError(format!(
                    "task '{name}' waits for {n} transitions but only {count} lead to it"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
