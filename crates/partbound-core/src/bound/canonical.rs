use std::cmp::Ordering;

use crate::bound::compare::{compare_range_bounds, RangeBound};
use crate::bound::BoundInfo;
use crate::error::{PartitionError, Result};
use crate::key::{PartitionKey, PartitionStrategy};
use crate::spec::{PartitionBoundSpec, RangeDatumKind};
use crate::value::Value;

/// Catalog ordinal to canonical index, assigned on first sighting.
struct CanonicalMapping {
    mapping: Vec<Option<usize>>,
    next_index: usize,
}

impl CanonicalMapping {
    fn new(nparts: usize) -> Self {
        Self {
            mapping: vec![None; nparts],
            next_index: 0,
        }
    }

    fn assign(&mut self, ordinal: usize) -> usize {
        if let Some(index) = self.mapping[ordinal] {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.mapping[ordinal] = Some(index);
        index
    }

    /// The default partition owns no bound, so it must still be unmapped.
    fn assign_default(&mut self, ordinal: usize) -> Result<usize> {
        if self.mapping[ordinal].is_some() {
            return Err(PartitionError::Internal(
                "default partition already has a canonical index".into(),
            ));
        }
        Ok(self.assign(ordinal))
    }

    fn finish(self) -> Result<Vec<usize>> {
        self.mapping
            .into_iter()
            .enumerate()
            .map(|(ordinal, index)| {
                index.ok_or_else(|| {
                    PartitionError::Internal(format!(
                        "partition at catalog position {ordinal} contributes no bound"
                    ))
                })
            })
            .collect()
    }
}

/// Canonicalizes the bounds of every child of one partitioned table.
///
/// `specs` are in catalog scan order. Returns the bound structure and, for
/// each catalog ordinal, the canonical index of that partition. Canonical
/// indexes depend only on the sorted bounds, so two catalogs describing the
/// same partitions in different orders produce identical results.
pub fn build_bound_info<'a, I>(key: &PartitionKey, specs: I) -> Result<(BoundInfo, Vec<usize>)>
where
    I: IntoIterator<Item = &'a PartitionBoundSpec>,
{
    let specs: Vec<&PartitionBoundSpec> = specs.into_iter().collect();
    let result = match key.strategy() {
        PartitionStrategy::List => build_list(key, &specs)?,
        PartitionStrategy::Range => build_range(key, &specs)?,
    };
    log::debug!(
        "built {} bound info: {} partitions, {} distinct bound entries",
        key.strategy(),
        specs.len(),
        result.0.ndatums()
    );
    Ok(result)
}

fn note_default(
    key: &PartitionKey,
    strategy: PartitionStrategy,
    ordinal: usize,
    default_ordinal: &mut Option<usize>,
) -> Result<()> {
    if strategy != key.strategy() {
        return Err(PartitionError::StrategyMismatch {
            expected: key.strategy(),
            found: strategy,
        });
    }
    if default_ordinal.replace(ordinal).is_some() {
        return Err(PartitionError::Internal(
            "more than one default partition".into(),
        ));
    }
    Ok(())
}

fn build_list(
    key: &PartitionKey,
    specs: &[&PartitionBoundSpec],
) -> Result<(BoundInfo, Vec<usize>)> {
    let mut all_values: Vec<(usize, &Value)> = Vec::new();
    let mut null_ordinal: Option<usize> = None;
    let mut default_ordinal: Option<usize> = None;

    for (ordinal, spec) in specs.iter().enumerate() {
        match spec {
            PartitionBoundSpec::Default { strategy } => {
                note_default(key, *strategy, ordinal, &mut default_ordinal)?
            }
            PartitionBoundSpec::List { values } => {
                for value in values {
                    if value.is_null() {
                        if null_ordinal.is_some() {
                            return Err(PartitionError::DuplicateNullPartition);
                        }
                        null_ordinal = Some(ordinal);
                    } else {
                        all_values.push((ordinal, value));
                    }
                }
            }
            PartitionBoundSpec::Range { .. } => {
                return Err(PartitionError::StrategyMismatch {
                    expected: PartitionStrategy::List,
                    found: PartitionStrategy::Range,
                })
            }
        }
    }

    all_values.sort_by(|a, b| key.compare(0, a.1, b.1));

    let mut mapping = CanonicalMapping::new(specs.len());
    let mut datums = Vec::with_capacity(all_values.len());
    let mut indexes = Vec::with_capacity(all_values.len());
    for (ordinal, value) in all_values {
        datums.push(vec![value.clone()]);
        indexes.push(Some(mapping.assign(ordinal)));
    }
    // A partition that accepts only NULL has not been seen by the walk above.
    let null_index = null_ordinal.map(|ordinal| mapping.assign(ordinal));
    let default_index = default_ordinal
        .map(|ordinal| mapping.assign_default(ordinal))
        .transpose()?;

    let info = BoundInfo {
        strategy: PartitionStrategy::List,
        datums,
        kind: Vec::new(),
        indexes,
        null_index,
        default_index,
    };
    Ok((info, mapping.finish()?))
}

fn build_range(
    key: &PartitionKey,
    specs: &[&PartitionBoundSpec],
) -> Result<(BoundInfo, Vec<usize>)> {
    let mut all_bounds: Vec<RangeBound> = Vec::with_capacity(specs.len() * 2);
    let mut default_ordinal: Option<usize> = None;

    for (ordinal, spec) in specs.iter().enumerate() {
        match spec {
            PartitionBoundSpec::Default { strategy } => {
                note_default(key, *strategy, ordinal, &mut default_ordinal)?
            }
            PartitionBoundSpec::Range { lower, upper } => {
                all_bounds.push(RangeBound::from_datums(key, Some(ordinal), lower, true)?);
                all_bounds.push(RangeBound::from_datums(key, Some(ordinal), upper, false)?);
            }
            PartitionBoundSpec::List { .. } => {
                return Err(PartitionError::StrategyMismatch {
                    expected: PartitionStrategy::Range,
                    found: PartitionStrategy::List,
                })
            }
        }
    }

    all_bounds.sort_by(|a, b| compare_range_bounds(key, a.as_view(), b.as_view()));

    let mut distinct: Vec<&RangeBound> = Vec::with_capacity(all_bounds.len());
    let mut prev: Option<&RangeBound> = None;
    for cur in &all_bounds {
        if is_distinct(key, prev, cur) {
            distinct.push(cur);
        }
        prev = Some(cur);
    }

    let mut mapping = CanonicalMapping::new(specs.len());
    let mut datums = Vec::with_capacity(distinct.len());
    let mut kind = Vec::with_capacity(distinct.len());
    let mut indexes = Vec::with_capacity(distinct.len() + 1);
    for bound in distinct {
        datums.push(bound.datums.clone());
        kind.push(bound.kind.clone());
        // Lower bounds open a stretch no existing partition owns yet.
        if bound.lower {
            indexes.push(None);
        } else {
            let ordinal = bound.index.ok_or_else(|| {
                PartitionError::Internal("range bound without an owning partition".into())
            })?;
            indexes.push(Some(mapping.assign(ordinal)));
        }
    }
    let default_index = default_ordinal
        .map(|ordinal| mapping.assign_default(ordinal))
        .transpose()?;
    indexes.push(None);

    let info = BoundInfo {
        strategy: PartitionStrategy::Range,
        datums,
        kind,
        indexes,
        null_index: None,
        default_index,
    };
    Ok((info, mapping.finish()?))
}

/// Whether `cur` differs from the previously sorted bound. Only the values
/// decide; the lower/upper flag does not, so a lower bound equal to the
/// preceding upper bound is folded into it.
fn is_distinct(key: &PartitionKey, prev: Option<&RangeBound>, cur: &RangeBound) -> bool {
    let Some(prev) = prev else {
        return true;
    };
    for keynum in 0..key.natts() {
        if cur.kind[keynum] != prev.kind[keynum] {
            return true;
        }
        // Both MINVALUE or both MAXVALUE: later columns are ignored.
        if cur.kind[keynum] != RangeDatumKind::Value {
            return false;
        }
        if key.compare(keynum, &cur.datums[keynum], &prev.datums[keynum]) != Ordering::Equal {
            return true;
        }
    }
    false
}
