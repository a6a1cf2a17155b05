// src/conducting/mod.rs

//! Runtime conductor.
//!
//! - [`states`] holds the lifecycle vocabulary and the task / workflow
//!   transition tables.
//! - [`events`] is the closed set of events an executor reports.
//! - [`flow`] is the append-only execution history.
//! - [`routes`] tracks concurrently-live branches.
//! - [`conductor`] ties them together: one [`WorkflowConductor`] per
//!   workflow execution, driven one event at a time.

pub mod conductor;
pub mod events;
pub mod flow;
pub mod routes;
pub mod states;

pub use conductor::{ExecutionError, NextTask, WorkflowConductor};
pub use events::TaskEvent;
pub use flow::{EntryContexts, TaskFlow, TaskFlowEntry};
pub use routes::Routes;
pub use states::{State, task_transition_allowed, workflow_transition_allowed};
