// src/context/store.rs

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{FlowError, Result};

/// One immutable variable-binding set.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    vars: Map<String, Value>,
    /// Snapshots this one was derived from; empty for the initial context.
    parents: Vec<usize>,
}

impl Snapshot {
    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }
}

/// Append-only list of context snapshots.
///
/// Snapshot `0` is always the initial workflow context. New snapshots are only
/// ever produced by [`ContextStore::extend`] (publish) or
/// [`ContextStore::merge`] (join), so every snapshot's variables are a superset
/// of its parents'.
#[derive(Debug, Clone)]
pub struct ContextStore {
    snapshots: Vec<Snapshot>,
}

impl ContextStore {
    pub fn new(initial: Map<String, Value>) -> Self {
        Self {
            snapshots: vec![Snapshot {
                vars: initial,
                parents: Vec::new(),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Snapshot> {
        self.snapshots.get(idx)
    }

    /// Look up one variable in a snapshot.
    pub fn lookup(&self, idx: usize, name: &str) -> Option<&Value> {
        self.get(idx)?.get(name)
    }

    fn require(&self, idx: usize) -> Result<&Snapshot> {
        self.get(idx).ok_or(FlowError::InvalidContext(idx))
    }

    /// Create a new snapshot from `parent` plus the given bindings.
    pub fn extend<I>(&mut self, parent: usize, bindings: I) -> Result<usize>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut vars = self.require(parent)?.vars.clone();
        for (name, value) in bindings {
            vars.insert(name, value);
        }

        let idx = self.push(vars, vec![parent]);
        debug!(idx, parent, "context extended");
        Ok(idx)
    }

    /// Union of several snapshots without storing the result.
    ///
    /// Overlapping names with different values are logged and resolved in
    /// favour of the later snapshot; the validator reports them as conflicts.
    pub fn union(&self, idxs: &[usize]) -> Result<Map<String, Value>> {
        let mut vars = Map::new();
        for &idx in idxs {
            for (name, value) in self.require(idx)?.vars.iter() {
                if let Some(existing) = vars.get(name) {
                    if existing != value {
                        warn!(
                            variable = %name,
                            snapshot = idx,
                            "conflicting bindings while merging contexts; later branch wins"
                        );
                    }
                }
                vars.insert(name.clone(), value.clone());
            }
        }
        Ok(vars)
    }

    /// Store the union of several snapshots as a new snapshot.
    ///
    /// A single parent is returned as-is without allocating a new snapshot.
    pub fn merge(&mut self, parents: &[usize]) -> Result<usize> {
        match parents {
            [] => Ok(0),
            [only] => self.require(*only).map(|_| *only),
            _ => {
                let vars = self.union(parents)?;
                let idx = self.push(vars, parents.to_vec());
                debug!(idx, ?parents, "contexts merged");
                Ok(idx)
            }
        }
    }

    fn push(&mut self, vars: Map<String, Value>, parents: Vec<usize>) -> usize {
        self.snapshots.push(Snapshot { vars, parents });
        self.snapshots.len() - 1
    }
}
