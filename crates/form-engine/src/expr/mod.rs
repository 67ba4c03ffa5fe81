//! Expressions authored in field descriptors (`visible`, `required`,
//! `disabled` and `{{ }}` segments of `value`).
//!
//! The engine only talks to the [`Evaluator`] trait. [`DefaultEvaluator`]
//! covers member access, comparisons and boolean logic, which is what form
//! schemas use in practice; hosts that need more plug in their own.

mod parser;

use std::fmt;
use std::sync::Arc;

use serde_json::{Number, Value};
use thiserror::Error;

pub use parser::parse;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("failed to parse expression `{expression}` at offset {offset}: {message}")]
    Parse {
        expression: String,
        offset: usize,
        message: String,
    },
    #[error("failed to evaluate expression `{expression}`: {message}")]
    Evaluate { expression: String, message: String },
}

/// A parsed expression, reusable across evaluations.
pub trait CompiledExpr: fmt::Debug + Send + Sync {
    /// Evaluates against a context; `locals` shadow context entries.
    fn evaluate(&self, context: &Value, locals: &Value) -> Result<Value, ExprError>;

    /// Source text the expression was compiled from.
    fn source(&self) -> &str;
}

/// Pluggable expression capability.
pub trait Evaluator: fmt::Debug + Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpr>, ExprError>;

    fn evaluate(&self, source: &str, context: &Value, locals: &Value) -> Result<Value, ExprError> {
        self.compile(source)?.evaluate(context, locals)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl Evaluator for DefaultEvaluator {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpr>, ExprError> {
        let expr = parse(source)?;
        Ok(Arc::new(Compiled {
            source: source.to_string(),
            expr,
        }))
    }
}

#[derive(Debug)]
struct Compiled {
    source: String,
    expr: Expr,
}

impl CompiledExpr for Compiled {
    fn evaluate(&self, context: &Value, locals: &Value) -> Result<Value, ExprError> {
        Ok(self.expr.evaluate(context, locals))
    }

    fn source(&self) -> &str {
        &self.source
    }
}

/// Expression tree produced by [`parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member {
        object: Box<Expr>,
        property: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    StrictEq,
    StrictNe,
    LooseEq,
    LooseNe,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Expr {
    /// Evaluates the tree. Missing names and members resolve to `null`.
    pub fn evaluate(&self, ctx: &Value, locals: &Value) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Ident(name) => locals
                .get(name)
                .or_else(|| ctx.get(name))
                .cloned()
                .unwrap_or(Value::Null),
            Expr::Member { object, property } => {
                let object = object.evaluate(ctx, locals);
                let property = property.evaluate(ctx, locals);
                member(&object, &property)
            }
            Expr::Not(operand) => Value::Bool(!truthy(&operand.evaluate(ctx, locals))),
            Expr::Negate(operand) => number_value(-to_number(&operand.evaluate(ctx, locals))),
            Expr::Binary { op, left, right } => {
                let left = left.evaluate(ctx, locals);
                let right = right.evaluate(ctx, locals);
                Value::Bool(compare(*op, &left, &right))
            }
            Expr::And(left, right) => {
                let left = left.evaluate(ctx, locals);
                if truthy(&left) {
                    right.evaluate(ctx, locals)
                } else {
                    left
                }
            }
            Expr::Or(left, right) => {
                let left = left.evaluate(ctx, locals);
                if truthy(&left) {
                    left
                } else {
                    right.evaluate(ctx, locals)
                }
            }
        }
    }
}

/// Truthiness as schema authors expect it from script-like expressions.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn member(object: &Value, property: &Value) -> Value {
    let found = match (object, property) {
        (Value::Object(map), Value::String(key)) => map.get(key),
        (Value::Object(map), Value::Number(key)) => map.get(&key.to_string()),
        (Value::Array(items), Value::Number(index)) => {
            index.as_u64().and_then(|index| items.get(index as usize))
        }
        (Value::Array(items), Value::String(key)) if key == "length" => {
            return Value::from(items.len());
        }
        (Value::String(text), Value::String(key)) if key == "length" => {
            return Value::from(text.chars().count());
        }
        _ => None,
    };
    found.cloned().unwrap_or(Value::Null)
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(flag) => f64::from(u8::from(*flag)),
        Value::Number(number) => number.as_f64().unwrap_or(f64::NAN),
        Value::String(text) if text.trim().is_empty() => 0.0,
        Value::String(text) => text.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn number_value(number: f64) -> Value {
    Number::from_f64(number)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn strict_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn loose_equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::String(_))
        | (Value::String(_), Value::Number(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => to_number(left) == to_number(right),
        _ => strict_equals(left, right),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    match op {
        BinaryOp::StrictEq => strict_equals(left, right),
        BinaryOp::StrictNe => !strict_equals(left, right),
        BinaryOp::LooseEq => loose_equals(left, right),
        BinaryOp::LooseNe => !loose_equals(left, right),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => to_number(left).partial_cmp(&to_number(right)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }
        }
    }
}
