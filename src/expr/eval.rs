// src/expr/eval.rs

//! Tree-walking interpreter for parsed expression bodies.

use serde_json::{Map, Value};

use crate::expr::parser::{Ast, BinOp};
use crate::expr::{ExprError, Scope};

pub(crate) fn eval(ast: &Ast, scope: &Scope<'_>) -> Result<Value, ExprError> {
    match ast {
        Ast::Literal(v) => Ok(v.clone()),
        Ast::Root => Ok(Value::Object(scope.vars().clone())),
        Ast::Name(name) => Ok(Value::String(name.clone())),
        Ast::Attr(target, attr) => {
            if matches!(**target, Ast::Root) {
                return lookup_var(scope, attr);
            }
            match eval(target, scope)? {
                Value::Object(map) => Ok(map.get(attr).cloned().unwrap_or(Value::Null)),
                other => Err(ExprError::Type(format!(
                    "cannot read attribute '{attr}' of {}",
                    type_name(&other)
                ))),
            }
        }
        Ast::Index(target, index) => {
            let target = eval(target, scope)?;
            let index = eval(index, scope)?;
            index_value(&target, &index)
        }
        Ast::Call(name, args) => call(name, args, scope),
        Ast::Neg(inner) => match eval(inner, scope)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i
                .checked_neg()
                .map(Value::from)
                .ok_or_else(|| ExprError::Type("integer overflow in negation".into())),
                None => Ok(Value::from(-n.as_f64().unwrap_or_default())),
            },
            other => Err(ExprError::Type(format!("cannot negate {}", type_name(&other)))),
        },
        Ast::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Ast::Binary(BinOp::And, lhs, rhs) => {
            if !truthy(&eval(lhs, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval(rhs, scope)?)))
        }
        Ast::Binary(BinOp::Or, lhs, rhs) => {
            if truthy(&eval(lhs, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval(rhs, scope)?)))
        }
        Ast::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, scope)?;
            let rhs = eval(rhs, scope)?;
            binary(*op, lhs, rhs)
        }
    }
}

/// Truthiness used by guards: empty collections, zero, `null` and `false`
/// are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn lookup_var(scope: &Scope<'_>, name: &str) -> Result<Value, ExprError> {
    scope
        .vars()
        .get(name)
        .cloned()
        .ok_or_else(|| ExprError::UndefinedVariable(name.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ExprError> {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => {
            let idx = n
                .as_u64()
                .ok_or_else(|| ExprError::Type(format!("invalid array index {n}")))?;
            Ok(items.get(idx as usize).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), Value::String(key)) => {
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        (t, i) => Err(ExprError::Type(format!(
            "cannot index {} with {}",
            type_name(t),
            type_name(i)
        ))),
    }
}

fn call(name: &str, args: &[Ast], scope: &Scope<'_>) -> Result<Value, ExprError> {
    let values = args
        .iter()
        .map(|a| eval(a, scope))
        .collect::<Result<Vec<_>, _>>()?;

    match (name, values.as_slice()) {
        ("ctx", []) => Ok(Value::Object(scope.vars().clone())),
        ("ctx", [Value::String(var)]) => lookup_var(scope, var),
        ("succeeded", []) => current_state_is(scope, name, &["succeeded"]),
        ("failed", []) => current_state_is(scope, name, &["failed"]),
        ("completed", []) => current_state_is(
            scope,
            name,
            &["succeeded", "failed", "canceled", "expired", "abandoned"],
        ),
        ("result", []) => {
            let task = scope
                .current_task()
                .ok_or_else(|| ExprError::NoTaskScope(name.to_string()))?;
            Ok(task.result.cloned().unwrap_or(Value::Null))
        }
        ("task_state", [Value::String(task)]) => Ok(scope
            .task_state(task)
            .map(|s| Value::String(s.to_string()))
            .unwrap_or(Value::Null)),
        ("len", [value]) => match value {
            Value::String(s) => Ok(Value::from(s.chars().count())),
            Value::Array(a) => Ok(Value::from(a.len())),
            Value::Object(o) => Ok(Value::from(o.len())),
            other => Err(ExprError::Type(format!("len() of {}", type_name(other)))),
        },
        ("str", [value]) => Ok(Value::String(render(value))),
        _ => Err(ExprError::UnknownFunction(format!("{name}/{}", values.len()))),
    }
}

fn current_state_is(scope: &Scope<'_>, func: &str, states: &[&str]) -> Result<Value, ExprError> {
    let task = scope
        .current_task()
        .ok_or_else(|| ExprError::NoTaskScope(func.to_string()))?;
    Ok(Value::Bool(states.contains(&task.state)))
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &rhs))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&lhs, &rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &lhs, &rhs),
        BinOp::Add => match (lhs, rhs) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (Value::Object(a), Value::Object(b)) => {
                let mut merged: Map<String, Value> = a;
                merged.extend(b);
                Ok(Value::Object(merged))
            }
            (a, b) => arithmetic(op, &a, &b),
        },
        BinOp::Sub | BinOp::Mul | BinOp::Div => arithmetic(op, &lhs, &rhs),
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are handled in eval"),
    }
}

fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (a, b) => a == b,
    }
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| {
        ExprError::Type(format!(
            "cannot compare {} with {}",
            type_name(lhs),
            type_name(rhs)
        ))
    })?;

    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(ExprError::Type(format!(
            "unsupported operand types {} and {} for {op:?}",
            type_name(lhs),
            type_name(rhs)
        )));
    };

    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        let result = match op {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            _ if b == 0 => return Err(ExprError::Type("division by zero".into())),
            _ => match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                Some(_) => return Ok(Value::from(a as f64 / b as f64)),
                None => None,
            },
        };
        return result
            .map(Value::from)
            .ok_or_else(|| ExprError::Type(format!("integer overflow in {op:?}")));
    }

    let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        _ if b == 0.0 => return Err(ExprError::Type("division by zero".into())),
        _ => a / b,
    };
    Ok(Value::from(result))
}

/// Render a value the way it appears when interpolated into a string.
pub(crate) fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
