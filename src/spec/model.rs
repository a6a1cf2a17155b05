// src/spec/model.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::errors::Result;
use crate::expr::Evaluator;
use crate::graph::{JoinPolicy, WorkflowGraph};
use crate::validation::{ValidationReport, validate_workflow};

/// Top-level workflow definition as read from a TOML file.
///
/// ```toml
/// version = "1.0"
/// input = ["y"]
///
/// [vars]
/// foo = "<% $.y %>"
///
/// [tasks.task1]
/// action = "core.noop"
///
/// [[tasks.task1.next]]
/// when = "<% succeeded() %>"
/// publish = { bar = "<% $.foo %>" }
/// do = "task2, task3"
///
/// [tasks.task2]
/// join = "all"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Declared input variable names.
    #[serde(default)]
    pub input: Vec<String>,

    /// Top-level variables, evaluated once against the inputs alone.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    /// All tasks from `[tasks.<name>]`.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskSpec>,

    /// Loader behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for WorkflowSpec {
    fn default() -> Self {
        Self {
            version: default_version(),
            description: None,
            input: Vec::new(),
            vars: BTreeMap::new(),
            tasks: BTreeMap::new(),
            config: ConfigSection::default(),
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Reject the definition on load if variable validation reports anything.
    #[serde(default)]
    pub strict: bool,
}

/// `[tasks.<name>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskSpec {
    /// Action reference; executing it is the caller's concern.
    #[serde(default)]
    pub action: Option<String>,

    /// `"all"`, `"none"` or a count. Absent means no join.
    #[serde(default)]
    pub join: Option<JoinPolicy>,

    /// Action input expressions.
    #[serde(default)]
    pub input: BTreeMap<String, String>,

    /// Outgoing transition clauses, in evaluation order.
    #[serde(default)]
    pub next: Vec<NextSpec>,
}

/// One `[[tasks.<name>.next]]` clause.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextSpec {
    /// Guard; absent means always satisfied on success.
    #[serde(default)]
    pub when: Option<String>,

    /// Variables to publish when the guard is satisfied, in authored order.
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub publish: Vec<(String, String)>,

    /// Destination tasks, as a list or a comma-separated string.
    #[serde(default, rename = "do", deserialize_with = "task_list")]
    pub targets: Vec<String>,
}

fn task_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        One(String),
        Many(Vec<String>),
    }

    let names: Vec<String> = match Raw::deserialize(deserializer)? {
        Raw::One(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Raw::Many(v) => v.into_iter().map(|p| p.trim().to_string()).collect(),
    };
    Ok(names.into_iter().filter(|n| !n.is_empty()).collect())
}

fn ordered_pairs<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a table of variable names to expressions")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((name, expr)) = map.next_entry::<String, String>()? {
                if pairs.iter().any(|(seen, _)| *seen == name) {
                    return Err(de::Error::custom(format!("duplicate publish variable \"{name}\"")));
                }
                pairs.push((name, expr));
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_map(PairsVisitor)
}

impl WorkflowSpec {
    /// Deserialize a definition from TOML text without any validation.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Build the workflow graph for this definition.
    pub fn graph(&self) -> Result<WorkflowGraph> {
        WorkflowGraph::from_spec(self)
    }

    /// Run the variable-definiteness analysis with the built-in evaluator.
    pub fn validate(&self) -> Result<ValidationReport> {
        let graph = self.graph()?;
        Ok(validate_workflow(&graph, &self.input, &self.vars, &Evaluator::new()))
    }
}
