use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PartitionError, Result};
use crate::key::{PartitionKey, PartitionStrategy};
use crate::value::Value;

/// Kind of one column of a range bound. The derived ordering is the
/// infinity rank: `MinValue < Value < MaxValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeDatumKind {
    MinValue,
    Value,
    MaxValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeDatum {
    MinValue,
    Value(Value),
    MaxValue,
}

impl RangeDatum {
    pub fn kind(&self) -> RangeDatumKind {
        match self {
            RangeDatum::MinValue => RangeDatumKind::MinValue,
            RangeDatum::Value(_) => RangeDatumKind::Value,
            RangeDatum::MaxValue => RangeDatumKind::MaxValue,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            RangeDatum::Value(value) => Some(value),
            RangeDatum::MinValue | RangeDatum::MaxValue => None,
        }
    }
}

impl From<Value> for RangeDatum {
    fn from(value: Value) -> Self {
        RangeDatum::Value(value)
    }
}

impl fmt::Display for RangeDatum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeDatum::MinValue => f.write_str("MINVALUE"),
            RangeDatum::Value(value) => write!(f, "{value}"),
            RangeDatum::MaxValue => f.write_str("MAXVALUE"),
        }
    }
}

/// Bound of one partition as declared in `FOR VALUES ...` and stored in
/// the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bound", rename_all = "snake_case")]
pub enum PartitionBoundSpec {
    /// `FOR VALUES IN (...)`; a `Value::Null` entry accepts NULL keys.
    List { values: Vec<Value> },
    /// `FOR VALUES FROM (lower) TO (upper)`, lower inclusive, upper exclusive.
    Range {
        lower: Vec<RangeDatum>,
        upper: Vec<RangeDatum>,
    },
    /// `DEFAULT`: receives every key no sibling accepts.
    Default { strategy: PartitionStrategy },
}

impl PartitionBoundSpec {
    pub fn list(values: Vec<Value>) -> Self {
        PartitionBoundSpec::List { values }
    }

    pub fn range(lower: Vec<RangeDatum>, upper: Vec<RangeDatum>) -> Self {
        PartitionBoundSpec::Range { lower, upper }
    }

    pub fn default_for(strategy: PartitionStrategy) -> Self {
        PartitionBoundSpec::Default { strategy }
    }

    pub fn strategy(&self) -> PartitionStrategy {
        match self {
            PartitionBoundSpec::List { .. } => PartitionStrategy::List,
            PartitionBoundSpec::Range { .. } => PartitionStrategy::Range,
            PartitionBoundSpec::Default { strategy } => *strategy,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, PartitionBoundSpec::Default { .. })
    }

    pub fn check_strategy(&self, key: &PartitionKey) -> Result<()> {
        if self.strategy() != key.strategy() {
            return Err(PartitionError::StrategyMismatch {
                expected: key.strategy(),
                found: self.strategy(),
            });
        }
        Ok(())
    }

    /// Validates the spec against `key` and coerces every literal to the
    /// type of its key column. List duplicates are dropped.
    pub fn transform(&self, key: &PartitionKey) -> Result<Self> {
        self.check_strategy(key)?;
        match self {
            PartitionBoundSpec::Default { .. } => Ok(self.clone()),
            PartitionBoundSpec::List { values } => {
                let column = key.column(0);
                let mut result: Vec<Value> = Vec::with_capacity(values.len());
                for value in values {
                    let coerced = value.coerce_to(column.ty)?;
                    let duplicate = result.iter().any(|existing| match (existing, &coerced) {
                        (Value::Null, Value::Null) => true,
                        (Value::Null, _) | (_, Value::Null) => false,
                        (a, b) => key.compare(0, a, b) == Ordering::Equal,
                    });
                    if !duplicate {
                        result.push(coerced);
                    }
                }
                Ok(PartitionBoundSpec::List { values: result })
            }
            PartitionBoundSpec::Range { lower, upper } => {
                if lower.len() != key.natts() {
                    return Err(PartitionError::InvalidBoundSpec(
                        "FROM must specify exactly one value per partitioning column".into(),
                    ));
                }
                if upper.len() != key.natts() {
                    return Err(PartitionError::InvalidBoundSpec(
                        "TO must specify exactly one value per partitioning column".into(),
                    ));
                }
                let lower = transform_range_datums(key, lower)?;
                let upper = transform_range_datums(key, upper)?;
                Ok(PartitionBoundSpec::Range { lower, upper })
            }
        }
    }

    pub fn to_catalog_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| PartitionError::Internal(err.to_string()))
    }

    pub fn from_catalog_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            PartitionError::Internal(format!("malformed partition bound in catalog: {err}"))
        })
    }
}

fn transform_range_datums(key: &PartitionKey, datums: &[RangeDatum]) -> Result<Vec<RangeDatum>> {
    let mut result = Vec::with_capacity(datums.len());
    for (keynum, datum) in datums.iter().enumerate() {
        match datum {
            RangeDatum::Value(Value::Null) => {
                return Err(PartitionError::InvalidBoundSpec(
                    "cannot specify NULL in range bound".into(),
                ))
            }
            RangeDatum::Value(value) => {
                result.push(RangeDatum::Value(value.coerce_to(key.column(keynum).ty)?));
            }
            other => result.push(other.clone()),
        }
    }
    validate_infinite_bounds(&result)?;
    Ok(result)
}

/// Every column after a MINVALUE must also be MINVALUE, and likewise for
/// MAXVALUE; later columns could never influence the bound otherwise.
fn validate_infinite_bounds(datums: &[RangeDatum]) -> Result<()> {
    let mut seen = RangeDatumKind::Value;
    for datum in datums {
        let kind = datum.kind();
        if seen != RangeDatumKind::Value && kind != seen {
            let expected = if seen == RangeDatumKind::MaxValue {
                "MAXVALUE"
            } else {
                "MINVALUE"
            };
            return Err(PartitionError::InvalidBoundSpec(format!(
                "every bound following {expected} must also be {expected}"
            )));
        }
        seen = kind;
    }
    Ok(())
}

pub(crate) fn format_range_datums(datums: &[RangeDatum]) -> String {
    let parts: Vec<String> = datums.iter().map(ToString::to_string).collect();
    format!("({})", parts.join(", "))
}

impl fmt::Display for PartitionBoundSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionBoundSpec::List { values } => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "FOR VALUES IN ({})", parts.join(", "))
            }
            PartitionBoundSpec::Range { lower, upper } => write!(
                f,
                "FOR VALUES FROM {} TO {}",
                format_range_datums(lower),
                format_range_datums(upper)
            ),
            PartitionBoundSpec::Default { .. } => f.write_str("DEFAULT"),
        }
    }
}
