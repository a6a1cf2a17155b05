#![allow(dead_code)]

use taskflow::graph::JoinPolicy;
use taskflow::spec::{ConfigSection, NextSpec, TaskSpec, WorkflowSpec};

/// Builder for `WorkflowSpec` to simplify test setup.
pub struct WorkflowSpecBuilder {
    spec: WorkflowSpec,
}

impl WorkflowSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: WorkflowSpec::default(),
        }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.spec.input.push(name.to_string());
        self
    }

    pub fn var(mut self, name: &str, expr: &str) -> Self {
        self.spec.vars.insert(name.to_string(), expr.to_string());
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskSpec) -> Self {
        self.spec.tasks.insert(name.to_string(), task);
        self
    }

    pub fn strict(mut self, val: bool) -> Self {
        self.spec.config = ConfigSection { strict: val };
        self
    }

    pub fn build(self) -> WorkflowSpec {
        self.spec
    }
}

impl Default for WorkflowSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskSpec`.
///
/// `next`, `next_when` and `publish` follow the order of a definition file:
/// `publish` applies to the most recently added clause.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskSpec::default(),
        }
    }

    pub fn action(mut self, action: &str) -> Self {
        self.task.action = Some(action.to_string());
        self
    }

    pub fn join(mut self, join: JoinPolicy) -> Self {
        self.task.join = Some(join);
        self
    }

    pub fn input(mut self, name: &str, expr: &str) -> Self {
        self.task.input.insert(name.to_string(), expr.to_string());
        self
    }

    /// Unconditional clause to the given destinations.
    pub fn next(mut self, targets: &[&str]) -> Self {
        self.task.next.push(NextSpec {
            when: None,
            publish: Vec::new(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn next_when(mut self, when: &str, targets: &[&str]) -> Self {
        self.task.next.push(NextSpec {
            when: Some(when.to_string()),
            publish: Vec::new(),
            targets: targets.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    pub fn publish(mut self, name: &str, expr: &str) -> Self {
        if self.task.next.is_empty() {
            self.task.next.push(NextSpec::default());
        }
        if let Some(clause) = self.task.next.last_mut() {
            clause.publish.push((name.to_string(), expr.to_string()));
        }
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}
