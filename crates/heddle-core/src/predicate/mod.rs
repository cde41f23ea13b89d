//! Edge predicates: a small sandboxed expression language.
//!
//! A predicate is evaluated against `results`, a read-only map from
//! dependency id to that dependency's result. The language has
//! comparisons, boolean connectives, literals and field access. There are
//! no calls, no assignment and no names other than `results`.
//!
//! ```ignore
//! let pred = Predicate::parse("results['A']['v'] == 1 and results.B.ok")?;
//! let ready = pred.evaluate(&results)?;
//! ```

mod eval;
mod parser;

use serde_json::{Map, Value};
use thiserror::Error;

pub use parser::{CmpOp, Expr, MAX_NESTING, Segment};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("missing key {0}")]
    MissingKey(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("expected a boolean, found {0}")]
    NotBoolean(String),
}

impl PredicateError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }
}

impl From<PredicateError> for crate::error::SchedulerError {
    fn from(err: PredicateError) -> Self {
        crate::error::SchedulerError::PredicateEvaluation(err.to_string())
    }
}

/// A parsed edge predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: String,
    expr: Expr,
}

impl Predicate {
    pub fn parse(source: &str) -> Result<Self, PredicateError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, results: &Map<String, Value>) -> Result<bool, PredicateError> {
        eval::eval_bool(&self.expr, results)
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, results: &Map<String, Value>) -> Result<bool, PredicateError> {
    Predicate::parse(source)?.evaluate(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn results() -> Map<String, Value> {
        json!({
            "A": {"v": 1, "name": "alpha", "ok": true, "items": [10, 20]},
            "B": {"v": 2.5, "ok": false, "none": null},
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[rstest]
    #[case("results['A']['v']==1", true)]
    #[case("results['A']['v'] == 1.0", true)]
    #[case("results[\"A\"].v != 2", true)]
    #[case("results.B.v > results.A.v", true)]
    #[case("results.B.v <= 2", false)]
    #[case("results.A.name == 'alpha'", true)]
    #[case("results.A.name < 'beta'", true)]
    #[case("results.A.items[1] >= 20", true)]
    #[case("results.A.ok", true)]
    #[case("not results.B.ok", true)]
    #[case("results.A.ok and results.B.ok", false)]
    #[case("results.A.ok || results.B.ok", true)]
    #[case("(results.A.v == 1 or false) && !false", true)]
    #[case("results.B.none == null", true)]
    #[case("results.A.v == '1'", false)]
    #[case("results.A.v != '1'", true)]
    fn evaluates(#[case] source: &str, #[case] expected: bool) {
        assert_eq!(evaluate(source, &results()).unwrap(), expected, "{source}");
    }

    #[rstest]
    #[case::missing_dep("results['Z']['v'] == 1")]
    #[case::missing_field("results.A.missing == 1")]
    #[case::index_out_of_range("results.A.items[5] == 1")]
    #[case::cross_type_order("results.A.v < 'x'")]
    #[case::bool_order("results.A.ok > false")]
    #[case::non_bool_path("results.A.v")]
    #[case::non_bool_connective("results.A.v and true")]
    #[case::field_on_number("results.A.v.x == 1")]
    fn fails_closed(#[case] source: &str) {
        assert!(evaluate(source, &results()).is_err(), "{source}");
    }

    #[rstest]
    #[case::deep_parens(format!("{}true{}", "(".repeat(10_000), ")".repeat(10_000)))]
    #[case::long_not_chain(format!("{}true", "not ".repeat(10_000)))]
    #[case::long_and_chain(vec!["true"; 10_000].join(" and "))]
    #[case::long_or_chain(vec!["false"; 10_000].join(" or "))]
    fn deep_nesting_fails_closed(#[case] source: String) {
        assert!(matches!(
            evaluate(&source, &results()),
            Err(PredicateError::Parse { .. })
        ));
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let source = format!("{}true", "not ".repeat(MAX_NESTING));
        assert!(evaluate(&source, &results()).unwrap());
        let source = format!("{}true", "not ".repeat(MAX_NESTING + 1));
        assert!(matches!(
            evaluate(&source, &results()),
            Err(PredicateError::Parse { .. })
        ));
    }

    #[test]
    fn short_circuit_skips_missing_keys() {
        assert!(evaluate("true or results.Z.v", &results()).unwrap());
        assert!(!evaluate("false and results.Z.v", &results()).unwrap());
    }

    #[test]
    fn missing_key_error_names_the_path() {
        let err = evaluate("results['A']['zz'] == 1", &results()).unwrap_err();
        assert_eq!(err, PredicateError::MissingKey(r#"results["A"]["zz"]"#.into()));
    }

    #[test]
    fn keeps_source_text() {
        let pred = Predicate::parse("results.A.ok").unwrap();
        assert_eq!(pred.source(), "results.A.ok");
        assert!(matches!(pred.expr(), Expr::Path(_)));
    }
}
