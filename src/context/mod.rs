// src/context/mod.rs

//! Scoped variable snapshots.
//!
//! Every context the conductor ever builds lives in one append-only
//! [`ContextStore`]; task-flow entries refer to snapshots by index only.

pub mod store;

pub use store::{ContextStore, Snapshot};
