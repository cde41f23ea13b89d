//! Evaluation over a read-only results map.
//!
//! Rules:
//! - numbers compare numerically, strings lexicographically
//! - `==`/`!=` between different JSON types is simply unequal
//! - ordering across types, or on bool/null/array/object, is an error
//! - a missing key or index is an error
//! - boolean connectives and bare paths require JSON booleans

use serde_json::{Map, Value};
use std::cmp::Ordering;

use super::PredicateError;
use super::parser::{CmpOp, Expr, Segment};

pub fn eval_bool(expr: &Expr, results: &Map<String, Value>) -> Result<bool, PredicateError> {
    match expr {
        Expr::Or(lhs, rhs) => Ok(eval_bool(lhs, results)? || eval_bool(rhs, results)?),
        Expr::And(lhs, rhs) => Ok(eval_bool(lhs, results)? && eval_bool(rhs, results)?),
        Expr::Not(inner) => Ok(!eval_bool(inner, results)?),
        Expr::Cmp(lhs, op, rhs) => {
            let lhs = eval_value(lhs, results)?;
            let rhs = eval_value(rhs, results)?;
            compare(&lhs, *op, &rhs)
        }
        Expr::Literal(value) => as_bool(value),
        Expr::Path(segments) => as_bool(resolve(segments, results)?),
    }
}

fn eval_value<'a>(
    expr: &'a Expr,
    results: &'a Map<String, Value>,
) -> Result<std::borrow::Cow<'a, Value>, PredicateError> {
    use std::borrow::Cow;
    match expr {
        Expr::Literal(value) => Ok(Cow::Borrowed(value)),
        Expr::Path(segments) => resolve(segments, results).map(Cow::Borrowed),
        other => eval_bool(other, results).map(|b| Cow::Owned(Value::Bool(b))),
    }
}

fn as_bool(value: &Value) -> Result<bool, PredicateError> {
    value
        .as_bool()
        .ok_or_else(|| PredicateError::NotBoolean(type_name(value)))
}

fn resolve<'a>(
    segments: &[Segment],
    results: &'a Map<String, Value>,
) -> Result<&'a Value, PredicateError> {
    let mut path = String::from("results");
    let (first, rest) = match segments.split_first() {
        Some((Segment::Key(key), rest)) => (key, rest),
        Some((Segment::Index(i), _)) => {
            return Err(PredicateError::Type(format!("cannot index results with [{i}]")));
        }
        None => {
            return Err(PredicateError::Type(
                "`results` itself is not a value".to_string(),
            ));
        }
    };
    path.push_str(&format!("[{first:?}]"));
    let mut current = results
        .get(first)
        .ok_or_else(|| PredicateError::MissingKey(path.clone()))?;

    for segment in rest {
        current = match (segment, current) {
            (Segment::Key(key), Value::Object(map)) => {
                path.push_str(&format!("[{key:?}]"));
                map.get(key)
                    .ok_or_else(|| PredicateError::MissingKey(path.clone()))?
            }
            (Segment::Index(i), Value::Array(items)) => {
                path.push_str(&format!("[{i}]"));
                items
                    .get(*i)
                    .ok_or_else(|| PredicateError::MissingKey(path.clone()))?
            }
            (segment, value) => {
                return Err(PredicateError::Type(format!(
                    "cannot apply {segment:?} to {} at {path}",
                    type_name(value)
                )));
            }
        };
    }
    Ok(current)
}

fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool, PredicateError> {
    match op {
        CmpOp::Eq => Ok(loosely_equal(lhs, rhs)),
        CmpOp::Ne => Ok(!loosely_equal(lhs, rhs)),
        CmpOp::Lt => order(lhs, rhs).map(Ordering::is_lt),
        CmpOp::Le => order(lhs, rhs).map(Ordering::is_le),
        CmpOp::Gt => order(lhs, rhs).map(Ordering::is_gt),
        CmpOp::Ge => order(lhs, rhs).map(Ordering::is_ge),
    }
}

/// Structural equality, except that `1` and `1.0` are equal.
fn loosely_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}

fn order(lhs: &Value, rhs: &Value) -> Result<Ordering, PredicateError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            a.zip(b)
                .and_then(|(a, b)| a.partial_cmp(&b))
                .ok_or_else(|| PredicateError::Type("numbers are not comparable".into()))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(PredicateError::Type(format!(
            "cannot order {} against {}",
            type_name(lhs),
            type_name(rhs)
        ))),
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
