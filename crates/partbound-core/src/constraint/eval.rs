use std::cmp::Ordering;

use crate::constraint::{KeyTerm, Predicate};
use crate::error::{PartitionError, Result};
use crate::expr::{ExpressionEvaluator, PreparedExpression};
use crate::key::{KeyExpression, KeySource};
use crate::value::{compare_datums, Value};

impl KeyTerm {
    pub fn evaluate(&self, row: &[Value], evaluator: &dyn ExpressionEvaluator) -> Result<Value> {
        match &self.source {
            KeySource::Column(attno) => self.column_value(*attno, row),
            KeySource::Expression(expr) => evaluator.prepare(expr)?.evaluate(row),
        }
    }

    fn column_value(&self, attno: usize, row: &[Value]) -> Result<Value> {
        row.get(attno).cloned().ok_or_else(|| {
            PartitionError::Expression(format!(
                "column {} ({}) out of range for row of width {}",
                attno,
                self.name,
                row.len()
            ))
        })
    }
}

/// A predicate with every key expression it mentions prepared up front,
/// for evaluating many rows.
#[derive(Debug)]
pub struct PreparedPredicate<'p> {
    predicate: &'p Predicate,
    expressions: Vec<(&'p KeyExpression, Box<dyn PreparedExpression>)>,
}

impl PreparedPredicate<'_> {
    pub fn evaluate(&self, row: &[Value]) -> Result<Option<bool>> {
        self.predicate.evaluate_with(row, &|term: &KeyTerm, row: &[Value]| -> Result<Value> {
            match &term.source {
                KeySource::Column(attno) => term.column_value(*attno, row),
                KeySource::Expression(expr) => self
                    .expressions
                    .iter()
                    .find(|(prepared, _)| *prepared == expr)
                    .ok_or_else(|| {
                        PartitionError::Internal(format!(
                            "key expression {}() was not prepared",
                            expr.function
                        ))
                    })?
                    .1
                    .evaluate(row),
            }
        })
    }
}

impl Predicate {
    /// Prepares each distinct key expression of the predicate once.
    pub fn prepare<'p>(
        &'p self,
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<PreparedPredicate<'p>> {
        let mut expressions: Vec<(&'p KeyExpression, Box<dyn PreparedExpression>)> = Vec::new();
        let mut pending = vec![self];
        while let Some(predicate) = pending.pop() {
            let term = match predicate {
                Predicate::IsNull(term) | Predicate::IsNotNull(term) => term,
                Predicate::Compare { term, .. } | Predicate::AnyOf { term, .. } => term,
                Predicate::And(args) | Predicate::Or(args) => {
                    pending.extend(args);
                    continue;
                }
                Predicate::Not(arg) => {
                    pending.push(arg);
                    continue;
                }
                Predicate::Const(_) => continue,
            };
            if let KeySource::Expression(expr) = &term.source {
                if !expressions.iter().any(|(seen, _)| *seen == expr) {
                    expressions.push((expr, evaluator.prepare(expr)?));
                }
            }
        }
        Ok(PreparedPredicate {
            predicate: self,
            expressions,
        })
    }

    /// Evaluates the predicate against a row with SQL three-valued logic.
    /// `None` is the SQL NULL result.
    ///
    /// Key expressions are prepared on every call; use
    /// [`Predicate::prepare`] when checking many rows.
    pub fn evaluate(
        &self,
        row: &[Value],
        evaluator: &dyn ExpressionEvaluator,
    ) -> Result<Option<bool>> {
        self.evaluate_with(row, &|term: &KeyTerm, row: &[Value]| -> Result<Value> {
            term.evaluate(row, evaluator)
        })
    }

    fn evaluate_with<F>(&self, row: &[Value], term_value: &F) -> Result<Option<bool>>
    where
        F: Fn(&KeyTerm, &[Value]) -> Result<Value>,
    {
        match self {
            Predicate::IsNull(term) => Ok(Some(term_value(term, row)?.is_null())),
            Predicate::IsNotNull(term) => Ok(Some(!term_value(term, row)?.is_null())),
            Predicate::Compare {
                op,
                term,
                value,
                collation,
            } => {
                let actual = term_value(term, row)?;
                if actual.is_null() || value.is_null() {
                    return Ok(None);
                }
                Ok(Some(op.matches(compare_datums(&actual, value, *collation))))
            }
            Predicate::AnyOf {
                term,
                values,
                collation,
            } => {
                let actual = term_value(term, row)?;
                if actual.is_null() {
                    return Ok(None);
                }
                let mut saw_null = false;
                for candidate in values {
                    if candidate.is_null() {
                        saw_null = true;
                    } else if compare_datums(&actual, candidate, *collation) == Ordering::Equal {
                        return Ok(Some(true));
                    }
                }
                Ok(if saw_null { None } else { Some(false) })
            }
            Predicate::And(args) => {
                let mut result = Some(true);
                for arg in args {
                    match arg.evaluate_with(row, term_value)? {
                        Some(false) => return Ok(Some(false)),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Or(args) => {
                let mut result = Some(false);
                for arg in args {
                    match arg.evaluate_with(row, term_value)? {
                        Some(true) => return Ok(Some(true)),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                Ok(result)
            }
            Predicate::Not(arg) => Ok(arg.evaluate_with(row, term_value)?.map(|value| !value)),
            Predicate::Const(value) => Ok(Some(*value)),
        }
    }
}
