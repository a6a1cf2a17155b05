use anyhow::{Context, Result, bail};
use serde_json::Value;
use taskflow::conducting::{State, TaskEvent, WorkflowConductor};
use tracing::debug;

/// Drive one task through `running` and then `final_state`.
///
/// Mirrors what an executor reports for a task that was dispatched and
/// finished.
pub fn forward_task_states(
    conductor: &mut WorkflowConductor,
    task: &str,
    route: usize,
    final_state: State,
    result: Option<Value>,
) -> Result<()> {
    conductor
        .update_task_flow(task, route, TaskEvent::Running)
        .with_context(|| format!("failed to mark {task} on route {route} running"))?;

    let event = match final_state {
        State::Succeeded => TaskEvent::Succeeded { result },
        State::Failed => TaskEvent::Failed { result },
        other => TaskEvent::try_from(other)?,
    };
    conductor
        .update_task_flow(task, route, event)
        .with_context(|| format!("failed to mark {task} on route {route} {final_state}"))?;

    debug!(task, route, state = %final_state, "forwarded task states");
    Ok(())
}

/// Succeed every staged task, in staging order, until nothing is left.
///
/// Returns the ids of the tasks that ran, in order. Gives up after `limit`
/// tasks so a workflow that loops forever fails the test instead of hanging.
pub fn run_to_completion(conductor: &mut WorkflowConductor, limit: usize) -> Result<Vec<String>> {
    let mut ran = Vec::new();

    loop {
        let staged = conductor.get_next_tasks()?;
        let Some(next) = staged.first() else {
            return Ok(ran);
        };
        if ran.len() >= limit {
            bail!("workflow still has staged tasks after {limit} runs");
        }

        forward_task_states(conductor, &next.id, next.route, State::Succeeded, None)?;
        ran.push(next.id.clone());
    }
}
