use std::fmt;

use chrono::Datelike;

use crate::error::{PartitionError, Result};
use crate::key::KeyExpression;
use crate::value::Value;

/// Compiled form of one key expression, reusable across rows.
pub trait PreparedExpression: Send + Sync + fmt::Debug {
    fn evaluate(&self, row: &[Value]) -> Result<Value>;
}

/// Collaborator that turns key expressions into something executable.
pub trait ExpressionEvaluator: Send + Sync {
    fn prepare(&self, expr: &KeyExpression) -> Result<Box<dyn PreparedExpression>>;
}

/// Evaluator for tables whose keys are plain columns only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExpressions;

impl ExpressionEvaluator for NoExpressions {
    fn prepare(&self, expr: &KeyExpression) -> Result<Box<dyn PreparedExpression>> {
        Err(PartitionError::Expression(format!(
            "no evaluator registered for key expression {}()",
            expr.function
        )))
    }
}

/// A small library of scalar functions usable in partition keys:
/// `year`, `month`, `day` over timestamps, `lower`, `upper` over text and
/// `abs` over numbers. Every function is strict: a NULL argument yields
/// NULL.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinFunctions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Year,
    Month,
    Day,
    Lower,
    Upper,
    Abs,
}

#[derive(Debug)]
struct PreparedBuiltin {
    function: Builtin,
    arg: usize,
}

impl ExpressionEvaluator for BuiltinFunctions {
    fn prepare(&self, expr: &KeyExpression) -> Result<Box<dyn PreparedExpression>> {
        let function = match expr.function.to_ascii_lowercase().as_str() {
            "year" => Builtin::Year,
            "month" => Builtin::Month,
            "day" => Builtin::Day,
            "lower" => Builtin::Lower,
            "upper" => Builtin::Upper,
            "abs" => Builtin::Abs,
            other => {
                return Err(PartitionError::Expression(format!(
                    "unknown function {other}()"
                )))
            }
        };
        match expr.args.as_slice() {
            [arg] => Ok(Box::new(PreparedBuiltin {
                function,
                arg: *arg,
            })),
            args => Err(PartitionError::Expression(format!(
                "{}() takes exactly one argument, got {}",
                expr.function,
                args.len()
            ))),
        }
    }
}

impl PreparedExpression for PreparedBuiltin {
    fn evaluate(&self, row: &[Value]) -> Result<Value> {
        let input = row.get(self.arg).ok_or_else(|| {
            PartitionError::Expression(format!(
                "column {} out of range for row of width {}",
                self.arg,
                row.len()
            ))
        })?;
        if input.is_null() {
            return Ok(Value::Null);
        }
        let type_error = || {
            PartitionError::Expression(format!(
                "{:?}() does not accept {}",
                self.function,
                input
                    .column_type()
                    .map(|ty| ty.to_string())
                    .unwrap_or_else(|| "NULL".into())
            ))
        };
        match (self.function, input) {
            (Builtin::Year, Value::Timestamp(ts)) => Ok(Value::Integer(i64::from(ts.year()))),
            (Builtin::Month, Value::Timestamp(ts)) => Ok(Value::Integer(i64::from(ts.month()))),
            (Builtin::Day, Value::Timestamp(ts)) => Ok(Value::Integer(i64::from(ts.day()))),
            (Builtin::Lower, Value::Text(s)) => Ok(Value::Text(s.to_lowercase())),
            (Builtin::Upper, Value::Text(s)) => Ok(Value::Text(s.to_uppercase())),
            (Builtin::Abs, Value::Integer(i)) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| PartitionError::Expression("integer out of range".into())),
            (Builtin::Abs, Value::Float(f)) => Ok(Value::Float(f.abs())),
            _ => Err(type_error()),
        }
    }
}
