// src/validation/diagnostics.rs

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::expr::Dialect;

/// Which construct in the workflow definition owns an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The top-level `vars` block.
    Vars,
    /// A task's `input` block.
    TaskInput { task: String },
    /// The `when` guard of a task's `next[index]` clause.
    TransitionGuard { task: String, index: usize },
    /// The `publish` block of a task's `next[index]` clause.
    TransitionPublish { task: String, index: usize },
}

impl Location {
    /// Location in the abstract workflow-definition schema.
    pub fn schema_path(&self) -> String {
        match self {
            Location::Vars => "properties.vars".to_string(),
            Location::TaskInput { task } => {
                format!("properties.tasks.properties.{task}.properties.input")
            }
            Location::TransitionGuard { task, .. } => {
                format!("properties.tasks.properties.{task}.properties.next.items.properties.when")
            }
            Location::TransitionPublish { task, .. } => format!(
                "properties.tasks.properties.{task}.properties.next.items.properties.publish"
            ),
        }
    }

    /// Location in the concrete workflow definition.
    pub fn spec_path(&self) -> String {
        match self {
            Location::Vars => "vars".to_string(),
            Location::TaskInput { task } => format!("tasks.{task}.input"),
            Location::TransitionGuard { task, index } => format!("tasks.{task}.next[{index}].when"),
            Location::TransitionPublish { task, index } => {
                format!("tasks.{task}.next[{index}].publish")
            }
        }
    }
}

/// The `type` field of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Yaql,
    Jinja,
    /// The same variable is published on more than one branch of a join.
    Conflict,
}

impl From<Dialect> for DiagnosticKind {
    fn from(d: Dialect) -> Self {
        match d {
            Dialect::Yaql => DiagnosticKind::Yaql,
            Dialect::Jinja => DiagnosticKind::Jinja,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Yaql => f.write_str("yaql"),
            DiagnosticKind::Jinja => f.write_str("jinja"),
            DiagnosticKind::Conflict => f.write_str("conflict"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    #[serde(rename = "type")]
    pub kind: DiagnosticKind,
    pub expression: String,
    pub message: String,
    pub schema_path: String,
    pub spec_path: String,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        expression: impl Into<String>,
        message: impl Into<String>,
        location: &Location,
    ) -> Self {
        Self {
            kind,
            expression: expression.into(),
            message: message.into(),
            schema_path: location.schema_path(),
            spec_path: location.spec_path(),
        }
    }

    pub fn undefined_variable(
        dialect: Dialect,
        expression: impl Into<String>,
        variable: &str,
        location: &Location,
    ) -> Self {
        Self::new(
            dialect.into(),
            expression,
            format!("Variable \"{variable}\" is referenced before assignment."),
            location,
        )
    }

    fn dedup_key(&self) -> (DiagnosticKind, String, String, String) {
        (
            self.kind,
            self.expression.clone(),
            self.message.clone(),
            self.spec_path.clone(),
        )
    }
}

/// Result of validating one workflow.
///
/// An empty report means the workflow is sound. Serializes to
/// `{"context": [...], "conflicts": [...]}` with empty lists omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<Diagnostic>,
    #[serde(skip)]
    seen: HashSet<(DiagnosticKind, String, String, String)>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.conflicts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.context.len() + self.conflicts.len()
    }

    /// Every diagnostic, context problems first.
    pub fn all(&self) -> impl Iterator<Item = &Diagnostic> {
        self.context.iter().chain(self.conflicts.iter())
    }

    /// Add a diagnostic unless an identical one is already recorded.
    pub fn push(&mut self, diag: Diagnostic) {
        if !self.seen.insert(diag.dedup_key()) {
            return;
        }
        match diag.kind {
            DiagnosticKind::Conflict => self.conflicts.push(diag),
            _ => self.context.push(diag),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
