use std::cmp::Ordering;

use crate::bound::BoundInfo;
use crate::error::{PartitionError, Result};
use crate::key::{PartitionKey, PartitionStrategy};
use crate::spec::{RangeDatum, RangeDatumKind};
use crate::value::Value;

/// One side of a range partition, with infinities split out into `kind`.
/// `datums[i]` is a `Value::Null` placeholder wherever `kind[i]` is not
/// `RangeDatumKind::Value`.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    /// Catalog ordinal of the owning partition, if any.
    pub index: Option<usize>,
    pub datums: Vec<Value>,
    pub kind: Vec<RangeDatumKind>,
    pub lower: bool,
}

impl RangeBound {
    pub fn from_datums(
        key: &PartitionKey,
        index: Option<usize>,
        datums: &[RangeDatum],
        lower: bool,
    ) -> Result<Self> {
        if datums.len() != key.natts() {
            return Err(PartitionError::Internal(format!(
                "range bound has {} columns, partition key has {}",
                datums.len(),
                key.natts()
            )));
        }
        let mut values = Vec::with_capacity(datums.len());
        let mut kind = Vec::with_capacity(datums.len());
        for datum in datums {
            match datum {
                RangeDatum::Value(Value::Null) => {
                    return Err(PartitionError::Internal("invalid range bound datum".into()))
                }
                RangeDatum::Value(value) => values.push(value.clone()),
                RangeDatum::MinValue | RangeDatum::MaxValue => values.push(Value::Null),
            }
            kind.push(datum.kind());
        }
        Ok(Self {
            index,
            datums: values,
            kind,
            lower,
        })
    }

    pub fn as_view(&self) -> RangeBoundView<'_> {
        RangeBoundView {
            datums: &self.datums,
            kind: &self.kind,
            lower: self.lower,
        }
    }
}

/// Borrowed range bound, either a [`RangeBound`] or an entry of a
/// [`BoundInfo`].
#[derive(Debug, Clone, Copy)]
pub struct RangeBoundView<'a> {
    pub datums: &'a [Value],
    pub kind: &'a [RangeDatumKind],
    pub lower: bool,
}

/// Orders two range bounds column by column. Infinite columns decide
/// without calling the comparator, and two equal infinities end the
/// comparison. On a full tie an upper bound sorts before a lower one.
pub fn compare_range_bounds(
    key: &PartitionKey,
    left: RangeBoundView<'_>,
    right: RangeBoundView<'_>,
) -> Ordering {
    let mut cmp = Ordering::Equal;
    for keynum in 0..key.natts() {
        match left.kind[keynum].cmp(&right.kind[keynum]) {
            Ordering::Equal => {}
            unequal => return unequal,
        }
        if left.kind[keynum] != RangeDatumKind::Value {
            break;
        }
        cmp = key.compare(keynum, &left.datums[keynum], &right.datums[keynum]);
        if cmp != Ordering::Equal {
            break;
        }
    }
    if cmp == Ordering::Equal && left.lower != right.lower {
        cmp = if left.lower {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    cmp
}

/// Orders a range bound against the (finite, non-null) key values of a row.
pub fn compare_range_bound_to_values(
    key: &PartitionKey,
    bound_datums: &[Value],
    bound_kind: &[RangeDatumKind],
    values: &[Value],
) -> Ordering {
    let mut cmp = Ordering::Less;
    for keynum in 0..key.natts() {
        match bound_kind[keynum] {
            RangeDatumKind::MinValue => return Ordering::Less,
            RangeDatumKind::MaxValue => return Ordering::Greater,
            RangeDatumKind::Value => {}
        }
        cmp = key.compare(keynum, &bound_datums[keynum], &values[keynum]);
        if cmp != Ordering::Equal {
            break;
        }
    }
    cmp
}

/// What a binary search over a [`BoundInfo`] is looking for.
#[derive(Debug, Clone, Copy)]
pub enum Probe<'a> {
    /// Key values extracted from a row (LIST uses the first one).
    Values(&'a [Value]),
    /// A bound of a partition being added.
    Bound(RangeBoundView<'a>),
}

/// Compares the entry at `offset` of `info` against `probe`.
pub fn compare_entry_at(
    key: &PartitionKey,
    info: &BoundInfo,
    offset: usize,
    probe: Probe<'_>,
) -> Ordering {
    let entry = &info.datums[offset];
    match info.strategy {
        PartitionStrategy::List => {
            let probe_value = match probe {
                Probe::Values(values) => &values[0],
                Probe::Bound(bound) => &bound.datums[0],
            };
            key.compare(0, &entry[0], probe_value)
        }
        PartitionStrategy::Range => {
            let kind = &info.kind[offset];
            match probe {
                Probe::Bound(bound) => {
                    // An entry without a partition index is a lower bound;
                    // keeps equal-valued lower and upper bounds distinct.
                    let stored = RangeBoundView {
                        datums: entry,
                        kind,
                        lower: info.indexes[offset].is_none(),
                    };
                    compare_range_bounds(key, stored, bound)
                }
                Probe::Values(values) => compare_range_bound_to_values(key, entry, kind, values),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::KeyColumn;
    use crate::value::ColumnType;

    fn key2() -> PartitionKey {
        PartitionKey::range(vec![
            KeyColumn::column("a", 0, ColumnType::Integer),
            KeyColumn::column("b", 1, ColumnType::Integer),
        ])
        .unwrap()
    }

    fn bound(key: &PartitionKey, datums: Vec<RangeDatum>, lower: bool) -> RangeBound {
        RangeBound::from_datums(key, None, &datums, lower).unwrap()
    }

    #[test]
    fn upper_sorts_before_equal_lower() {
        let key = key2();
        let datums = vec![Value::Integer(1).into(), Value::Integer(5).into()];
        let lower = bound(&key, datums.clone(), true);
        let upper = bound(&key, datums, false);
        assert_eq!(
            compare_range_bounds(&key, upper.as_view(), lower.as_view()),
            Ordering::Less
        );
        assert_eq!(
            compare_range_bounds(&key, lower.as_view(), upper.as_view()),
            Ordering::Greater
        );
    }

    #[test]
    fn infinities_short_circuit_later_columns() {
        let key = key2();
        let a = bound(
            &key,
            vec![RangeDatum::MaxValue, RangeDatum::MaxValue],
            false,
        );
        let b = bound(
            &key,
            vec![Value::Integer(i64::MAX).into(), Value::Integer(0).into()],
            false,
        );
        assert_eq!(
            compare_range_bounds(&key, a.as_view(), b.as_view()),
            Ordering::Greater
        );
        let c = bound(&key, vec![RangeDatum::MaxValue, RangeDatum::MaxValue], false);
        assert_eq!(
            compare_range_bounds(&key, a.as_view(), c.as_view()),
            Ordering::Equal
        );
    }

    #[test]
    fn bound_to_values_resolves_infinite_columns_first() {
        let key = key2();
        let min = bound(&key, vec![RangeDatum::MinValue, RangeDatum::MinValue], true);
        let values = [Value::Integer(i64::MIN), Value::Integer(i64::MIN)];
        assert_eq!(
            compare_range_bound_to_values(&key, &min.datums, &min.kind, &values),
            Ordering::Less
        );
        let mixed = bound(
            &key,
            vec![Value::Integer(3).into(), RangeDatum::MaxValue],
            false,
        );
        let values = [Value::Integer(3), Value::Integer(99)];
        assert_eq!(
            compare_range_bound_to_values(&key, &mixed.datums, &mixed.kind, &values),
            Ordering::Greater
        );
    }

    #[test]
    fn null_range_datum_is_rejected() {
        let key = key2();
        let err = RangeBound::from_datums(
            &key,
            None,
            &[Value::Null.into(), Value::Integer(1).into()],
            true,
        )
        .unwrap_err();
        assert!(matches!(err, PartitionError::Internal(_)));
    }
}
