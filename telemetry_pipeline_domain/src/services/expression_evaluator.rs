// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Evaluator
//!
//! Evaluates a pre-built boolean [`Expr`] tree against an [`Event`] to
//! produce a boolean, for use in processor/sink routing. Building `Expr`
//! from source text is a separate subsystem and out of scope here; this
//! module only walks an AST a caller already constructed.

use crate::entities::event::Event;
use crate::error::PipelineError;
use crate::value_objects::value::Value;

/// A boolean expression over event fields.
#[derive(Debug, Clone)]
pub enum Expr {
    Field(String),
    Literal(Value),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Le(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Ge(Box<Expr>, Box<Expr>),
    Matches(Box<Expr>, String),
    NotMatches(Box<Expr>, String),
    In(Box<Expr>, Vec<Expr>),
    NotIn(Box<Expr>, Vec<Expr>),
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }
}

fn resolve(expr: &Expr, event: &Event) -> Result<Value, PipelineError> {
    match expr {
        Expr::Field(name) => event
            .get(name)?
            .cloned()
            .ok_or_else(|| PipelineError::unknown_field(format!("unknown field: {name}"))),
        Expr::Literal(v) => Ok(v.clone()),
        other => {
            let b = eval(other, event)?;
            Ok(Value::Bool(b))
        }
    }
}

/// Numeric comparisons promote integer to float; equality between two
/// numeric values always compares as float to avoid int/float mismatches.
/// Any other type pairing fails with `TypeMismatch`.
fn numeric_pair(lhs: &Value, rhs: &Value) -> Result<(f64, f64), PipelineError> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ok((*a as f64, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok((*a, *b)),
        (Value::Int(a), Value::Float(b)) => Ok((*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Ok((*a, *b as f64)),
        _ => Err(PipelineError::type_mismatch(format!(
            "cannot compare {} with {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> Result<bool, PipelineError> {
    match (lhs, rhs) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (a, b) = numeric_pair(lhs, rhs)?;
            Ok(a == b)
        }
        _ => Ok(lhs == rhs),
    }
}

/// Evaluates `expr` against `event`, producing a boolean. A malformed or
/// unevaluable expression surfaces as `ExpressionEvaluation`.
pub fn eval(expr: &Expr, event: &Event) -> Result<bool, PipelineError> {
    match expr {
        Expr::Field(_) | Expr::Literal(_) => {
            let v = resolve(expr, event)?;
            v.as_bool()
        }
        Expr::And(l, r) => Ok(eval(l, event)? && eval(r, event)?),
        Expr::Or(l, r) => Ok(eval(l, event)? || eval(r, event)?),
        Expr::Not(e) => Ok(!eval(e, event)?),
        Expr::Eq(l, r) => values_equal(&resolve(l, event)?, &resolve(r, event)?),
        Expr::Ne(l, r) => Ok(!values_equal(&resolve(l, event)?, &resolve(r, event)?)?),
        Expr::Lt(l, r) => {
            let (a, b) = numeric_pair(&resolve(l, event)?, &resolve(r, event)?)?;
            Ok(a < b)
        }
        Expr::Le(l, r) => {
            let (a, b) = numeric_pair(&resolve(l, event)?, &resolve(r, event)?)?;
            Ok(a <= b)
        }
        Expr::Gt(l, r) => {
            let (a, b) = numeric_pair(&resolve(l, event)?, &resolve(r, event)?)?;
            Ok(a > b)
        }
        Expr::Ge(l, r) => {
            let (a, b) = numeric_pair(&resolve(l, event)?, &resolve(r, event)?)?;
            Ok(a >= b)
        }
        Expr::Matches(l, pattern) => {
            let v = resolve(l, event)?;
            let s = v.as_str()?;
            let re = regex_compile(pattern)?;
            Ok(re.is_match(s))
        }
        Expr::NotMatches(l, pattern) => {
            let v = resolve(l, event)?;
            let s = v.as_str()?;
            let re = regex_compile(pattern)?;
            Ok(!re.is_match(s))
        }
        Expr::In(l, candidates) => {
            let v = resolve(l, event)?;
            for c in candidates {
                if values_equal(&v, &resolve(c, event)?)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::NotIn(l, candidates) => Ok(!eval(&Expr::In(l.clone(), candidates.clone()), event)?),
    }
}

fn regex_compile(pattern: &str) -> Result<regex::Regex, PipelineError> {
    regex::Regex::new(pattern).map_err(|e| PipelineError::expression_evaluation(format!("invalid regex {pattern}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(key: &str, value: Value) -> Event {
        let mut e = Event::new("LOG");
        e.put(key, value).unwrap();
        e
    }

    #[test]
    fn equality_compares_cross_type_numerics() {
        let e = event_with("n", Value::Int(3));
        let expr = Expr::Eq(Box::new(Expr::field("n")), Box::new(Expr::lit(3.0)));
        assert!(eval(&expr, &e).unwrap());
    }

    #[test]
    fn comparison_promotes_int_to_float() {
        let e = event_with("n", Value::Int(2));
        let expr = Expr::Lt(Box::new(Expr::field("n")), Box::new(Expr::lit(2.5)));
        assert!(eval(&expr, &e).unwrap());
    }

    #[test]
    fn unknown_field_fails() {
        let e = Event::new("LOG");
        let expr = Expr::Eq(Box::new(Expr::field("missing")), Box::new(Expr::lit(1i64)));
        let err = eval(&expr, &e).unwrap_err();
        assert_eq!(err.category(), "data");
    }

    #[test]
    fn type_mismatch_on_incompatible_comparison() {
        let e = event_with("s", Value::String("x".into()));
        let expr = Expr::Lt(Box::new(Expr::field("s")), Box::new(Expr::lit(1i64)));
        assert!(eval(&expr, &e).is_err());
    }

    #[test]
    fn in_checks_membership() {
        let e = event_with("s", Value::String("b".into()));
        let expr = Expr::In(
            Box::new(Expr::field("s")),
            vec![Expr::lit("a"), Expr::lit("b"), Expr::lit("c")],
        );
        assert!(eval(&expr, &e).unwrap());
    }

    #[test]
    fn and_or_not_compose() {
        let e = event_with("n", Value::Int(5));
        let expr = Expr::And(
            Box::new(Expr::Gt(Box::new(Expr::field("n")), Box::new(Expr::lit(1i64)))),
            Box::new(Expr::Not(Box::new(Expr::Lt(Box::new(Expr::field("n")), Box::new(Expr::lit(5i64)))))),
        );
        assert!(eval(&expr, &e).unwrap());
    }
}
