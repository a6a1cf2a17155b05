// src/graph/mod.rs

//! Workflow graph representation.
//!
//! - [`join`] holds the per-task join policy and its threshold arithmetic.
//! - [`workflow_graph`] holds tasks, conditional transitions and memoized
//!   cycle membership. The graph is built once and then shared read-only by
//!   the conductor and the validator.

pub mod join;
pub mod workflow_graph;

pub use join::JoinPolicy;
pub use workflow_graph::{Task, Transition, WorkflowGraph};
