// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::conducting::State;
use crate::expr::ExprError;

#[derive(Error, Debug)]
pub enum FlowError {
    /// The task id is not part of the workflow graph.
    #[error("Task not found in graph: {0}")]
    InvalidTask(String),

    /// The task exists but has not been entered on the given route.
    #[error("No task flow entry for task '{task}' on route {route}")]
    InvalidTaskFlowEntry { task: String, route: usize },

    #[error("Context snapshot {0} does not exist")]
    InvalidContext(usize),

    /// A state or event value outside the recognised lifecycle vocabulary.
    #[error("Invalid state or event: {0}")]
    InvalidState(String),

    #[error("Workflow cannot move from {from} to {to}")]
    InvalidWorkflowStateTransition { from: State, to: State },

    #[error("Expression error: {0}")]
    Expression(#[from] ExprError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
