mod eval;

pub use eval::PreparedPredicate;

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PartitionError, Result};
use crate::key::{KeyColumn, KeyExpression, KeySource, PartitionKey, PartitionStrategy};
use crate::spec::{PartitionBoundSpec, RangeDatum, RangeDatumKind};
use crate::value::{Collation, Value};

/// A partition key column or expression as it appears in a constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTerm {
    pub name: String,
    pub source: KeySource,
}

impl KeyTerm {
    pub fn for_column(column: &KeyColumn) -> Self {
        Self {
            name: column.name.clone(),
            source: column.source.clone(),
        }
    }
}

impl fmt::Display for KeyTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Boolean expression over partition key terms.
///
/// A partition constraint is a `Vec<Predicate>` read as an implicit AND.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    IsNull(KeyTerm),
    IsNotNull(KeyTerm),
    Compare {
        op: CompareOp,
        term: KeyTerm,
        value: Value,
        collation: Collation,
    },
    /// `term = ANY (ARRAY[values])`
    AnyOf {
        term: KeyTerm,
        values: Vec<Value>,
        collation: Collation,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Const(bool),
}

impl Predicate {
    fn compare(key: &PartitionKey, keynum: usize, op: CompareOp, value: &Value) -> Self {
        let column = key.column(keynum);
        Predicate::Compare {
            op,
            term: KeyTerm::for_column(column),
            value: value.clone(),
            collation: column.collation,
        }
    }

    /// ANDs the list together; a single element is returned as is and an
    /// empty list is TRUE.
    pub fn and_all(mut args: Vec<Predicate>) -> Predicate {
        match args.len() {
            0 => Predicate::Const(true),
            1 => args.remove(0),
            _ => Predicate::And(args),
        }
    }

    /// ORs the list together; a single element is returned as is and an
    /// empty list is FALSE.
    pub fn or_all(mut args: Vec<Predicate>) -> Predicate {
        match args.len() {
            0 => Predicate::Const(false),
            1 => args.remove(0),
            _ => Predicate::Or(args),
        }
    }

    /// Rewrites every physical column number in the predicate, including
    /// the arguments of key expressions.
    pub fn map_columns<F>(&self, map: &F) -> Result<Predicate>
    where
        F: Fn(usize) -> Result<usize>,
    {
        let map_term = |term: &KeyTerm| -> Result<KeyTerm> {
            let source = match &term.source {
                KeySource::Column(attno) => KeySource::Column(map(*attno)?),
                KeySource::Expression(expr) => KeySource::Expression(KeyExpression {
                    function: expr.function.clone(),
                    args: expr
                        .args
                        .iter()
                        .map(|attno| map(*attno))
                        .collect::<Result<Vec<_>>>()?,
                }),
            };
            Ok(KeyTerm {
                name: term.name.clone(),
                source,
            })
        };
        let map_all = |args: &[Predicate]| -> Result<Vec<Predicate>> {
            args.iter().map(|arg| arg.map_columns(map)).collect()
        };
        Ok(match self {
            Predicate::IsNull(term) => Predicate::IsNull(map_term(term)?),
            Predicate::IsNotNull(term) => Predicate::IsNotNull(map_term(term)?),
            Predicate::Compare {
                op,
                term,
                value,
                collation,
            } => Predicate::Compare {
                op: *op,
                term: map_term(term)?,
                value: value.clone(),
                collation: *collation,
            },
            Predicate::AnyOf {
                term,
                values,
                collation,
            } => Predicate::AnyOf {
                term: map_term(term)?,
                values: values.clone(),
                collation: *collation,
            },
            Predicate::And(args) => Predicate::And(map_all(args)?),
            Predicate::Or(args) => Predicate::Or(map_all(args)?),
            Predicate::Not(arg) => Predicate::Not(Box::new(arg.map_columns(map)?)),
            Predicate::Const(value) => Predicate::Const(*value),
        })
    }

    /// Constant folding: drops TRUE from ANDs and FALSE from ORs, collapses
    /// ANDs containing FALSE and ORs containing TRUE, flattens nested
    /// ANDs/ORs and removes double negation.
    pub fn simplify(self) -> Predicate {
        match self {
            Predicate::Not(arg) => match arg.simplify() {
                Predicate::Const(value) => Predicate::Const(!value),
                Predicate::Not(inner) => *inner,
                other => Predicate::Not(Box::new(other)),
            },
            Predicate::And(args) => {
                let mut kept = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.simplify() {
                        Predicate::Const(true) => {}
                        Predicate::Const(false) => return Predicate::Const(false),
                        Predicate::And(inner) => kept.extend(inner),
                        other => kept.push(other),
                    }
                }
                Predicate::and_all(kept)
            }
            Predicate::Or(args) => {
                let mut kept = Vec::with_capacity(args.len());
                for arg in args {
                    match arg.simplify() {
                        Predicate::Const(false) => {}
                        Predicate::Const(true) => return Predicate::Const(true),
                        Predicate::Or(inner) => kept.extend(inner),
                        other => kept.push(other),
                    }
                }
                Predicate::or_all(kept)
            }
            other => other,
        }
    }
}

fn join_args(f: &mut fmt::Formatter<'_>, args: &[Predicate], separator: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::IsNull(term) => write!(f, "({term} IS NULL)"),
            Predicate::IsNotNull(term) => write!(f, "({term} IS NOT NULL)"),
            Predicate::Compare {
                op, term, value, ..
            } => write!(f, "({term} {} {value})", op.symbol()),
            Predicate::AnyOf { term, values, .. } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "({term} = ANY (ARRAY[{}]))", values.join(", "))
            }
            Predicate::And(args) => join_args(f, args, " AND "),
            Predicate::Or(args) => join_args(f, args, " OR "),
            Predicate::Not(arg) => write!(f, "(NOT {arg})"),
            Predicate::Const(value) => write!(f, "{value}"),
        }
    }
}

/// Renders an implicit-AND constraint list as SQL.
pub fn display_constraint(quals: &[Predicate]) -> String {
    quals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Constraint accepted by a non-default partition with the given bound.
pub fn derive_constraint(key: &PartitionKey, spec: &PartitionBoundSpec) -> Result<Vec<Predicate>> {
    spec.check_strategy(key)?;
    match spec {
        PartitionBoundSpec::List { values } => {
            let has_null = values.iter().any(Value::is_null);
            let values = values.iter().filter(|v| !v.is_null()).cloned().collect();
            Ok(list_qual(key, values, has_null))
        }
        PartitionBoundSpec::Range { lower, upper } => range_qual(key, lower, upper, false),
        PartitionBoundSpec::Default { .. } => Err(PartitionError::InvalidBoundSpec(
            "the constraint of a default partition depends on its siblings".into(),
        )),
    }
}

/// Constraint of the default partition: every key no sibling accepts.
/// For RANGE that includes keys with a NULL column.
///
/// `siblings` are the bounds of all partitions of the parent in canonical
/// order; the default partition's own spec is skipped. Returns an empty
/// list when the default partition is the only one.
pub fn derive_default_constraint(
    key: &PartitionKey,
    siblings: &[PartitionBoundSpec],
) -> Result<Vec<Predicate>> {
    for sibling in siblings {
        sibling.check_strategy(key)?;
    }
    match key.strategy() {
        PartitionStrategy::List => {
            let mut values: Vec<Value> = Vec::new();
            let mut has_null = false;
            for sibling in siblings {
                if let PartitionBoundSpec::List { values: accepted } = sibling {
                    for value in accepted {
                        if value.is_null() {
                            has_null = true;
                        } else {
                            values.push(value.clone());
                        }
                    }
                }
            }
            if values.is_empty() && !has_null {
                return Ok(Vec::new());
            }
            values.sort_by(|a, b| key.compare(0, a, b));
            let accepted = Predicate::and_all(list_qual(key, values, has_null));
            Ok(vec![Predicate::Not(Box::new(accepted))])
        }
        PartitionStrategy::Range => {
            let mut arms = Vec::new();
            for sibling in siblings {
                if let PartitionBoundSpec::Range { lower, upper } = sibling {
                    arms.push(Predicate::and_all(range_qual(key, lower, upper, true)?));
                }
            }
            if arms.is_empty() {
                return Ok(Vec::new());
            }
            // The null tests keep the negated expression from being NULL,
            // so NULL keys are accepted here.
            let mut others = range_nulltest(key);
            others.push(Predicate::or_all(arms));
            Ok(vec![Predicate::Not(Box::new(Predicate::And(others)))])
        }
    }
}

/// Constraint the default partition gains when a partition with
/// `new_quals` is added next to it: `NOT (AND new_quals)`, folded.
pub fn proposed_default_constraint(new_quals: Vec<Predicate>) -> Predicate {
    Predicate::Not(Box::new(Predicate::and_all(new_quals))).simplify()
}

fn list_qual(key: &PartitionKey, values: Vec<Value>, has_null: bool) -> Vec<Predicate> {
    let column = key.column(0);
    let term = KeyTerm::for_column(column);
    let any_of = (!values.is_empty()).then(|| Predicate::AnyOf {
        term: term.clone(),
        values,
        collation: column.collation,
    });
    if has_null {
        match any_of {
            Some(any_of) => vec![Predicate::Or(vec![Predicate::IsNull(term), any_of])],
            None => vec![Predicate::IsNull(term)],
        }
    } else {
        // Routing relies on the IS NOT NULL test even though `= ANY`
        // already rejects NULL.
        let mut result = vec![Predicate::IsNotNull(term)];
        result.extend(any_of);
        result
    }
}

fn range_nulltest(key: &PartitionKey) -> Vec<Predicate> {
    key.columns()
        .iter()
        .map(|column| Predicate::IsNotNull(KeyTerm::for_column(column)))
        .collect()
}

/// Builds the constraint of a range partition.
///
/// For a key `(a, b, c)` with bounds `(al, bl, cl)` and `(au, bu, cu)`:
///
/// ```text
/// (a > al OR (a = al AND b > bl) OR (a = al AND b = bl AND c >= cl))
/// AND
/// (a < au OR (a = au AND b < bu) OR (a = au AND b = bu AND c < cu))
/// ```
///
/// preceded by `IS NOT NULL` for every column and by `col = value` for each
/// leading column whose lower and upper values are equal. Arms stop at the
/// first MINVALUE or MAXVALUE column. With `for_default` the null tests are
/// left out unless nothing else was produced.
fn range_qual(
    key: &PartitionKey,
    lower: &[RangeDatum],
    upper: &[RangeDatum],
    for_default: bool,
) -> Result<Vec<Predicate>> {
    let natts = key.natts();
    if lower.len() != natts || upper.len() != natts {
        return Err(PartitionError::InvalidBoundSpec(
            "range bound must specify exactly one value per partitioning column".into(),
        ));
    }
    let mut result = if for_default {
        Vec::new()
    } else {
        range_nulltest(key)
    };

    let mut start = 0;
    while start < natts {
        let (Some(lower_val), Some(upper_val)) = (lower[start].value(), upper[start].value())
        else {
            break;
        };
        if key.compare(start, lower_val, upper_val) != Ordering::Equal {
            break;
        }
        if start == natts - 1 {
            return Err(PartitionError::InvalidBoundSpec(
                "invalid range bound specification".into(),
            ));
        }
        result.push(Predicate::compare(key, start, CompareOp::Eq, lower_val));
        start += 1;
    }

    let num_or_arms = natts - start;
    let mut lower_or_arms = Vec::new();
    let mut upper_or_arms = Vec::new();
    let mut need_next_lower_arm = true;
    let mut need_next_upper_arm = true;
    let mut current_or_arm = 0;
    while current_or_arm < num_or_arms {
        let mut lower_args = Vec::new();
        let mut upper_args = Vec::new();
        for keynum in start..natts {
            let lower_val = lower[keynum].value();
            let upper_val = upper[keynum].value();
            let lower_next = lower.get(keynum + 1).map(RangeDatum::kind);
            let upper_next = upper.get(keynum + 1).map(RangeDatum::kind);
            let is_arm_prefix = keynum - start < current_or_arm;

            if need_next_lower_arm {
                if let Some(value) = lower_val {
                    let op = if is_arm_prefix {
                        CompareOp::Eq
                    } else if keynum == natts - 1 || lower_next == Some(RangeDatumKind::MinValue)
                    {
                        CompareOp::Ge
                    } else {
                        CompareOp::Gt
                    };
                    lower_args.push(Predicate::compare(key, keynum, op, value));
                }
            }
            if need_next_upper_arm {
                if let Some(value) = upper_val {
                    let op = if is_arm_prefix {
                        CompareOp::Eq
                    } else if upper_next == Some(RangeDatumKind::MaxValue) {
                        CompareOp::Le
                    } else {
                        CompareOp::Lt
                    };
                    upper_args.push(Predicate::compare(key, keynum, op, value));
                }
            }

            // Arm n covers the first n + 1 remaining columns.
            if keynum + 1 - start > current_or_arm {
                if lower_val.is_none() || lower_next != Some(RangeDatumKind::Value) {
                    need_next_lower_arm = false;
                }
                if upper_val.is_none() || upper_next != Some(RangeDatumKind::Value) {
                    need_next_upper_arm = false;
                }
                break;
            }
        }

        if !lower_args.is_empty() {
            lower_or_arms.push(Predicate::and_all(lower_args));
        }
        if !upper_args.is_empty() {
            upper_or_arms.push(Predicate::and_all(upper_args));
        }
        if !need_next_lower_arm && !need_next_upper_arm {
            break;
        }
        current_or_arm += 1;
    }

    if !lower_or_arms.is_empty() {
        result.push(Predicate::or_all(lower_or_arms));
    }
    if !upper_or_arms.is_empty() {
        result.push(Predicate::or_all(upper_or_arms));
    }

    if result.is_empty() {
        // Only reachable for (MINVALUE, ...) TO (MAXVALUE, ...). As a
        // sibling of the default partition it still excludes NULL keys.
        result = if for_default {
            range_nulltest(key)
        } else {
            vec![Predicate::Const(true)]
        };
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;

    fn key(columns: &[&str]) -> PartitionKey {
        PartitionKey::range(
            columns
                .iter()
                .enumerate()
                .map(|(i, name)| KeyColumn::column(*name, i, ColumnType::Integer))
                .collect(),
        )
        .unwrap()
    }

    fn int(v: i64) -> RangeDatum {
        RangeDatum::Value(Value::Integer(v))
    }

    fn render(quals: &[Predicate]) -> String {
        display_constraint(quals)
    }

    #[test]
    fn single_column_range() {
        let key = key(&["a"]);
        let spec = PartitionBoundSpec::range(vec![int(10)], vec![int(20)]);
        assert_eq!(
            render(&derive_constraint(&key, &spec).unwrap()),
            "(a IS NOT NULL) AND (a >= 10) AND (a < 20)"
        );
    }

    #[test]
    fn multi_column_range_with_equal_prefix() {
        let key = key(&["a", "b", "c"]);
        let spec = PartitionBoundSpec::range(
            vec![int(1), int(2), int(3)],
            vec![int(1), int(5), int(6)],
        );
        assert_eq!(
            render(&derive_constraint(&key, &spec).unwrap()),
            "(a IS NOT NULL) AND (b IS NOT NULL) AND (c IS NOT NULL) AND (a = 1) \
             AND ((b > 2) OR ((b = 2) AND (c >= 3))) \
             AND ((b < 5) OR ((b = 5) AND (c < 6)))"
        );
    }

    #[test]
    fn maxvalue_turns_less_than_into_less_equal() {
        let key = key(&["a", "b"]);
        let spec = PartitionBoundSpec::range(
            vec![int(1), RangeDatum::MinValue],
            vec![int(5), RangeDatum::MaxValue],
        );
        assert_eq!(
            render(&derive_constraint(&key, &spec).unwrap()),
            "(a IS NOT NULL) AND (b IS NOT NULL) AND (a >= 1) AND (a <= 5)"
        );
    }

    #[test]
    fn unbounded_range_is_true() {
        let key = key(&["a"]);
        let spec = PartitionBoundSpec::range(vec![RangeDatum::MinValue], vec![RangeDatum::MaxValue]);
        let quals = derive_constraint(&key, &spec).unwrap();
        assert_eq!(render(&quals), "(a IS NOT NULL)");
    }

    #[test]
    fn equal_last_column_is_invalid() {
        let key = key(&["a", "b"]);
        let spec = PartitionBoundSpec::range(vec![int(1), int(2)], vec![int(1), int(2)]);
        assert!(matches!(
            derive_constraint(&key, &spec),
            Err(PartitionError::InvalidBoundSpec(_))
        ));
    }

    #[test]
    fn list_constraints() {
        let key = PartitionKey::list(KeyColumn::column("k", 0, ColumnType::Integer));
        let plain = PartitionBoundSpec::list(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(
            render(&derive_constraint(&key, &plain).unwrap()),
            "(k IS NOT NULL) AND (k = ANY (ARRAY[1, 2]))"
        );
        let with_null = PartitionBoundSpec::list(vec![Value::Integer(1), Value::Null]);
        assert_eq!(
            render(&derive_constraint(&key, &with_null).unwrap()),
            "((k IS NULL) OR (k = ANY (ARRAY[1])))"
        );
        let null_only = PartitionBoundSpec::list(vec![Value::Null]);
        assert_eq!(
            render(&derive_constraint(&key, &null_only).unwrap()),
            "(k IS NULL)"
        );
    }

    #[test]
    fn default_constraints_negate_siblings() {
        let list_key = PartitionKey::list(KeyColumn::column("k", 0, ColumnType::Integer));
        let siblings = vec![
            PartitionBoundSpec::list(vec![Value::Integer(3)]),
            PartitionBoundSpec::list(vec![Value::Integer(1)]),
            PartitionBoundSpec::default_for(PartitionStrategy::List),
        ];
        assert_eq!(
            render(&derive_default_constraint(&list_key, &siblings).unwrap()),
            "(NOT ((k IS NOT NULL) AND (k = ANY (ARRAY[1, 3]))))"
        );

        let range_key = key(&["a"]);
        let siblings = vec![
            PartitionBoundSpec::range(vec![int(0)], vec![int(10)]),
            PartitionBoundSpec::default_for(PartitionStrategy::Range),
        ];
        assert_eq!(
            render(&derive_default_constraint(&range_key, &siblings).unwrap()),
            "(NOT ((a IS NOT NULL) AND ((a >= 0) AND (a < 10))))"
        );
        let alone = vec![PartitionBoundSpec::default_for(PartitionStrategy::Range)];
        assert!(derive_default_constraint(&range_key, &alone)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn range_default_constraint_accepts_null_keys() {
        let key = key(&["a", "b"]);
        let siblings = vec![
            PartitionBoundSpec::range(vec![int(0), int(0)], vec![int(10), int(0)]),
            PartitionBoundSpec::range(
                vec![RangeDatum::MinValue, RangeDatum::MinValue],
                vec![int(0), int(0)],
            ),
            PartitionBoundSpec::default_for(PartitionStrategy::Range),
        ];
        let qual = Predicate::and_all(derive_default_constraint(&key, &siblings).unwrap());
        let holds = |row: &[Value]| qual.evaluate(row, &crate::expr::NoExpressions).unwrap();
        assert_eq!(holds(&[Value::Null, Value::Integer(1)]), Some(true));
        assert_eq!(holds(&[Value::Integer(1), Value::Null]), Some(true));
        assert_eq!(holds(&[Value::Null, Value::Null]), Some(true));
        assert_eq!(holds(&[Value::Integer(20), Value::Integer(0)]), Some(true));
        assert_eq!(holds(&[Value::Integer(5), Value::Integer(7)]), Some(false));
        assert_eq!(holds(&[Value::Integer(-3), Value::Integer(7)]), Some(false));
    }

    #[test]
    fn proposed_default_constraint_is_folded() {
        assert_eq!(
            proposed_default_constraint(vec![Predicate::Const(true)]),
            Predicate::Const(false)
        );
        let key = key(&["a"]);
        let quals = derive_constraint(
            &key,
            &PartitionBoundSpec::range(vec![int(0)], vec![int(5)]),
        )
        .unwrap();
        assert_eq!(
            proposed_default_constraint(quals).to_string(),
            "(NOT ((a IS NOT NULL) AND (a >= 0) AND (a < 5)))"
        );
    }

    #[test]
    fn map_columns_rewrites_expression_arguments() {
        let term = KeyTerm {
            name: "year(ts)".into(),
            source: KeySource::Expression(KeyExpression::new("year", vec![2])),
        };
        let predicate = Predicate::IsNotNull(term);
        let mapped = predicate.map_columns(&|attno| Ok(attno + 1)).unwrap();
        match mapped {
            Predicate::IsNotNull(KeyTerm {
                source: KeySource::Expression(expr),
                ..
            }) => assert_eq!(expr.args, vec![3]),
            other => panic!("unexpected predicate {other:?}"),
        }
    }
}
