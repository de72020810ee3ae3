use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PartitionError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

/// Collation applied by the partition key's comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collation {
    #[default]
    Binary,
    CaseInsensitive,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
            Value::Null => None,
        }
    }

    /// Raw datum equality. Ignores collation and compares floats bit for
    /// bit, so it never calls into the key's comparison function.
    pub fn datum_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a.as_bytes() == b.as_bytes(),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }

    pub fn coerce_to(&self, target: ColumnType) -> Result<Value> {
        coerce_value(self.clone(), target)
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) | Value::Float(_) => 1,
            Value::Text(_) => 2,
            Value::Timestamp(_) => 3,
            Value::Null => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Timestamp(ts) => write!(f, "'{}'", ts.to_rfc3339()),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "FLOAT",
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Timestamp => "TIMESTAMP",
        };
        f.write_str(name)
    }
}

/// Three-way comparison used for every partition key column.
///
/// Values of the key's declared type compare naturally. Mixed numeric
/// values compare numerically; any other mix falls back to a fixed type
/// rank so the ordering stays total. NULL sorts last, although callers
/// never hand NULL to the comparator for bounds.
pub fn compare_datums(left: &Value, right: &Value, collation: Collation) -> Ordering {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).total_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.total_cmp(&(*b as f64)),
        (Value::Text(a), Value::Text(b)) => match collation {
            Collation::Binary => a.cmp(b),
            Collation::CaseInsensitive => a.to_lowercase().cmp(&b.to_lowercase()),
        },
        (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
        (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
        _ => left.type_rank().cmp(&right.type_rank()),
    }
}

fn coerce_value(value: Value, target: ColumnType) -> Result<Value> {
    let mismatch = |message: &str| PartitionError::Coercion(message.to_string());
    match target {
        ColumnType::Integer => match value {
            Value::Integer(i) => Ok(Value::Integer(i)),
            Value::Float(f) => {
                if (f - f.trunc()).abs() < f64::EPSILON {
                    Ok(Value::Integer(f as i64))
                } else {
                    Err(mismatch("non integral float for INTEGER key"))
                }
            }
            Value::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| mismatch("failed to parse string as INTEGER")),
            Value::Boolean(b) => Ok(Value::Integer(i64::from(b))),
            Value::Null => Ok(Value::Null),
            Value::Timestamp(_) => Err(mismatch("cannot coerce TIMESTAMP to INTEGER")),
        },
        ColumnType::Float => match value {
            Value::Integer(i) => Ok(Value::Float(i as f64)),
            Value::Float(f) => Ok(Value::Float(f)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| mismatch("failed to parse string as FLOAT")),
            Value::Boolean(b) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
            Value::Null => Ok(Value::Null),
            Value::Timestamp(_) => Err(mismatch("cannot coerce TIMESTAMP to FLOAT")),
        },
        ColumnType::Text => match value {
            Value::Text(s) => Ok(Value::Text(s)),
            Value::Integer(i) => Ok(Value::Text(i.to_string())),
            Value::Float(f) => Ok(Value::Text(f.to_string())),
            Value::Boolean(b) => Ok(Value::Text(b.to_string())),
            Value::Null => Ok(Value::Null),
            Value::Timestamp(ts) => Ok(Value::Text(ts.to_rfc3339())),
        },
        ColumnType::Boolean => match value {
            Value::Boolean(b) => Ok(Value::Boolean(b)),
            Value::Integer(i) => Ok(Value::Boolean(i != 0)),
            Value::Float(f) => Ok(Value::Boolean(f != 0.0)),
            Value::Text(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "t" | "1" => Ok(Value::Boolean(true)),
                "false" | "f" | "0" => Ok(Value::Boolean(false)),
                _ => Err(mismatch("failed to parse string as BOOLEAN")),
            },
            Value::Null => Ok(Value::Null),
            Value::Timestamp(_) => Err(mismatch("cannot coerce TIMESTAMP to BOOLEAN")),
        },
        ColumnType::Timestamp => match value {
            Value::Timestamp(ts) => Ok(Value::Timestamp(ts)),
            Value::Text(s) => parse_timestamp_string(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch("failed to parse string as TIMESTAMP")),
            Value::Integer(i) => Utc
                .timestamp_opt(i, 0)
                .single()
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch("failed to convert integer to TIMESTAMP")),
            Value::Float(_) => Err(mismatch("cannot coerce FLOAT to TIMESTAMP")),
            Value::Boolean(_) => Err(mismatch("cannot coerce BOOLEAN to TIMESTAMP")),
            Value::Null => Ok(Value::Null),
        },
    }
}

pub fn parse_timestamp_string(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_collation_ignores_case_but_datum_eq_does_not() {
        let upper = Value::Text("ABC".into());
        let lower = Value::Text("abc".into());
        assert_eq!(
            compare_datums(&upper, &lower, Collation::CaseInsensitive),
            Ordering::Equal
        );
        assert_ne!(compare_datums(&upper, &lower, Collation::Binary), Ordering::Equal);
        assert!(!upper.datum_eq(&lower));
    }

    #[test]
    fn float_datum_eq_is_bitwise() {
        assert!(!Value::Float(0.0).datum_eq(&Value::Float(-0.0)));
        assert!(Value::Float(f64::NAN).datum_eq(&Value::Float(f64::NAN)));
    }

    #[test]
    fn coerces_literals_to_key_type() {
        assert_eq!(
            Value::Text("42".into()).coerce_to(ColumnType::Integer).unwrap(),
            Value::Integer(42)
        );
        assert!(Value::Float(1.5).coerce_to(ColumnType::Integer).is_err());
        let ts = Value::Text("2024-03-01".into())
            .coerce_to(ColumnType::Timestamp)
            .unwrap();
        assert_eq!(
            ts,
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn renders_sql_literals() {
        assert_eq!(Value::Text("it's".into()).to_string(), "'it''s'");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
    }
}
