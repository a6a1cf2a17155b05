// src/spec/mod.rs

//! Workflow definitions.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition from disk (`loader.rs`).
//! - Check structural invariants before a graph is built (`validate.rs`).
//!
//! Variable-definiteness checks live in [`crate::validation`]; this module
//! only rejects definitions that cannot be turned into a graph at all.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, NextSpec, TaskSpec, WorkflowSpec};
pub use validate::validate_structure;
