// src/conducting/flow.rs

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::conducting::states::State;

/// Context snapshots an entry was entered with.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryContexts {
    #[serde(rename = "in")]
    pub inbound: Vec<usize>,
}

/// One pass of a task on a route.
///
/// `next` maps `<destination>__t<clause>` to whether that transition was
/// satisfied; `prev` maps `<source>__t<clause>` to the sequence index of the
/// entry that arrived through it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFlowEntry {
    pub id: String,
    pub route: usize,
    pub ctxs: EntryContexts,
    #[serde(skip_serializing_if = "State::is_unset")]
    pub state: State,
    pub next: BTreeMap<String, bool>,
    pub prev: BTreeMap<String, usize>,
    /// Terminal without advancing any transition.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub term: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl TaskFlowEntry {
    pub(crate) fn new(
        id: impl Into<String>,
        route: usize,
        inbound: Vec<usize>,
        prev: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            id: id.into(),
            route,
            ctxs: EntryContexts { inbound },
            state: State::Unset,
            next: BTreeMap::new(),
            prev,
            term: false,
            result: None,
        }
    }
}

/// Append-only execution history plus the index of the newest entry per
/// `(task, route)`.
#[derive(Debug, Clone, Default)]
pub struct TaskFlow {
    sequence: Vec<TaskFlowEntry>,
    current: HashMap<(String, usize), usize>,
}

impl TaskFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sequence(&self) -> &[TaskFlowEntry] {
        &self.sequence
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&TaskFlowEntry> {
        self.sequence.get(idx)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut TaskFlowEntry> {
        self.sequence.get_mut(idx)
    }

    /// Sequence index of the newest entry for `(task, route)`.
    pub fn current_idx(&self, task: &str, route: usize) -> Option<usize> {
        self.current.get(&(task.to_string(), route)).copied()
    }

    /// Append an entry; it becomes the current one for its `(task, route)`.
    /// Older entries for the same pair stay in the sequence untouched.
    pub(crate) fn push(&mut self, entry: TaskFlowEntry) -> usize {
        let idx = self.sequence.len();
        self.current.insert((entry.id.clone(), entry.route), idx);
        self.sequence.push(entry);
        idx
    }

    /// Latest state of every task that has been entered, by task id.
    pub fn task_states(&self) -> HashMap<String, String> {
        self.sequence
            .iter()
            .map(|e| (e.id.clone(), e.state.to_string()))
            .collect()
    }
}
