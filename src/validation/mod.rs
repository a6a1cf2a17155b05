// src/validation/mod.rs

//! Static variable-definiteness validation.
//!
//! - [`diagnostics`] defines the report returned to workflow authors.
//! - [`definiteness`] runs the must-be-defined dataflow analysis over the
//!   (possibly cyclic) workflow graph.
//!
//! Validation never fails: every problem found is returned as data.

pub mod definiteness;
pub mod diagnostics;

pub use definiteness::{available_variables, validate_workflow};
pub use diagnostics::{Diagnostic, DiagnosticKind, Location, ValidationReport};
