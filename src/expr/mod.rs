// src/expr/mod.rs

//! Expression evaluation collaborator.
//!
//! The conductor and the validator only need two things from an expression:
//! the set of variables it references, and its value against a context.
//! Both are behind [`ExpressionEvaluator`] so an embedding application can
//! plug in a full yaql/jinja engine; [`Evaluator`] is the built-in
//! implementation covering the subset used by workflow guards and publishes.
//!
//! - [`lexer`] and [`parser`] turn the body of one `<% .. %>` / `{{ .. }}`
//!   block into an AST.
//! - [`eval`] walks that AST against a [`Scope`].

mod eval;
mod lexer;
mod parser;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub use eval::truthy;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("lex error at {pos}: {message}")]
    Lex { pos: usize, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("variable \"{0}\" is not defined")]
    UndefinedVariable(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("function {0}() needs a current task")]
    NoTaskScope(String),
}

/// Expression dialect, recorded by the construct that owns the expression
/// and propagated into validation diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Yaql,
    Jinja,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Yaql => f.write_str("yaql"),
            Dialect::Jinja => f.write_str("jinja"),
        }
    }
}

static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<%(?P<yaql>.*?)%>|\{\{(?P<jinja>.*?)\}\}").expect("valid block regex")
});

static YAQL_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\$\.([A-Za-z_][A-Za-z0-9_]*)|\bctx\(\s*\)\.([A-Za-z_][A-Za-z0-9_]*)|\bctx\(\s*['"]?([A-Za-z_][A-Za-z0-9_]*)['"]?\s*\)"#,
    )
    .expect("valid yaql variable regex")
});

static JINJA_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?:^|[^A-Za-z0-9_.])_\.([A-Za-z_][A-Za-z0-9_]*)|\bctx\(\s*\)\.([A-Za-z_][A-Za-z0-9_]*)|\bctx\(\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]\s*\)"#,
    )
    .expect("valid jinja variable regex")
});

/// One delimited block inside an expression string.
struct Block<'s> {
    dialect: Dialect,
    body: &'s str,
    /// Byte range of the whole block including delimiters.
    span: (usize, usize),
}

fn blocks(source: &str) -> Vec<Block<'_>> {
    BLOCK_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let (dialect, body) = match (caps.name("yaql"), caps.name("jinja")) {
                (Some(m), _) => (Dialect::Yaql, m.as_str()),
                (_, Some(m)) => (Dialect::Jinja, m.as_str()),
                _ => return None,
            };
            Some(Block {
                dialect,
                body,
                span: (whole.start(), whole.end()),
            })
        })
        .collect()
}

/// A raw expression string as authored in a workflow definition.
///
/// Strings without any `<% %>` or `{{ }}` block are plain literals.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression {
    source: String,
}

impl Expression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Dialect of the first block, or `None` for a literal.
    pub fn dialect(&self) -> Option<Dialect> {
        blocks(&self.source).first().map(|b| b.dialect)
    }

    pub fn is_literal(&self) -> bool {
        self.dialect().is_none()
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::new(s)
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::new(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// The task whose transitions are being evaluated.
#[derive(Debug, Clone, Copy)]
pub struct CurrentTask<'a> {
    pub id: &'a str,
    pub route: usize,
    /// Lowercase state name, e.g. `"succeeded"`.
    pub state: &'a str,
    pub result: Option<&'a Value>,
}

/// Everything an expression may observe while it is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    vars: &'a Map<String, Value>,
    current_task: Option<CurrentTask<'a>>,
    task_states: Option<&'a HashMap<String, String>>,
}

impl<'a> Scope<'a> {
    pub fn new(vars: &'a Map<String, Value>) -> Self {
        Self {
            vars,
            current_task: None,
            task_states: None,
        }
    }

    pub fn with_current_task(mut self, task: CurrentTask<'a>) -> Self {
        self.current_task = Some(task);
        self
    }

    pub fn with_task_states(mut self, states: &'a HashMap<String, String>) -> Self {
        self.task_states = Some(states);
        self
    }

    pub fn vars(&self) -> &'a Map<String, Value> {
        self.vars
    }

    pub fn current_task(&self) -> Option<&CurrentTask<'a>> {
        self.current_task.as_ref()
    }

    pub fn task_state(&self, task: &str) -> Option<&'a str> {
        self.task_states?.get(task).map(String::as_str)
    }
}

/// Variable extraction and evaluation, as consumed by the conductor and the
/// validator.
pub trait ExpressionEvaluator: Send + Sync {
    /// Every variable name the expression references. Must not evaluate.
    fn extract_variables(&self, expr: &Expression) -> BTreeSet<String>;

    /// Evaluate against a scope. Fails if a referenced variable is absent or
    /// the expression is malformed.
    fn evaluate(&self, expr: &Expression, scope: &Scope<'_>) -> Result<Value, ExprError>;
}

/// Built-in evaluator for the yaql (`<% $.x %>`) and jinja (`{{ _.x }}`)
/// subsets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Evaluator
    }

    fn eval_block(&self, block: &Block<'_>, scope: &Scope<'_>) -> Result<Value, ExprError> {
        let tokens = lexer::tokenize(block.body)?;
        let ast = parser::Parser::new(tokens, block.dialect).parse()?;
        eval::eval(&ast, scope)
    }
}

impl ExpressionEvaluator for Evaluator {
    fn extract_variables(&self, expr: &Expression) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for block in blocks(expr.source()) {
            let re = match block.dialect {
                Dialect::Yaql => &*YAQL_VAR_RE,
                Dialect::Jinja => &*JINJA_VAR_RE,
            };
            for caps in re.captures_iter(block.body) {
                if let Some(m) = caps.iter().skip(1).flatten().next() {
                    names.insert(m.as_str().to_string());
                }
            }
        }
        names
    }

    fn evaluate(&self, expr: &Expression, scope: &Scope<'_>) -> Result<Value, ExprError> {
        let source = expr.source();
        let found = blocks(source);

        if found.is_empty() {
            return Ok(Value::String(source.to_string()));
        }

        // A single block spanning the whole (trimmed) string keeps its type.
        let trimmed = source.trim();
        let offset = source.len() - source.trim_start().len();
        if let [only] = found.as_slice() {
            if only.span == (offset, offset + trimmed.len()) {
                return self.eval_block(only, scope);
            }
        }

        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for block in &found {
            out.push_str(&source[cursor..block.span.0]);
            out.push_str(&eval::render(&self.eval_block(block, scope)?));
            cursor = block.span.1;
        }
        out.push_str(&source[cursor..]);
        Ok(Value::String(out))
    }
}
