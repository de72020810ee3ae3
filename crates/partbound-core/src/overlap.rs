use std::cmp::Ordering;
use std::slice;

use crate::bound::compare::{compare_entry_at, compare_range_bounds, Probe, RangeBound};
use crate::bound::search::bound_bsearch;
use crate::bound::BoundInfo;
use crate::error::{PartitionError, Result};
use crate::key::PartitionKey;
use crate::spec::{format_range_datums, PartitionBoundSpec};

/// Existing partition a proposed bound collides with, by canonical index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The new bound claims keys this partition already accepts.
    Overlaps(usize),
    /// A DEFAULT partition was proposed but this one already exists.
    DefaultExists(usize),
}

impl Conflict {
    pub fn index(&self) -> usize {
        match self {
            Conflict::Overlaps(index) | Conflict::DefaultExists(index) => *index,
        }
    }
}

/// Checks a proposed partition bound against the existing siblings.
///
/// `existing` is `None` when the parent has no partitions yet. Empty range
/// bounds are rejected before any sibling is looked at; `partition` only
/// names the new partition in that error.
pub fn check_new_bound_overlap(
    partition: &str,
    key: &PartitionKey,
    existing: Option<&BoundInfo>,
    spec: &PartitionBoundSpec,
) -> Result<Option<Conflict>> {
    spec.check_strategy(key)?;
    match spec {
        PartitionBoundSpec::Default { .. } => {
            Ok(existing
                .and_then(BoundInfo::default_index)
                .map(Conflict::DefaultExists))
        }
        PartitionBoundSpec::List { values } => {
            let Some(info) = existing else {
                return Ok(None);
            };
            for value in values {
                if value.is_null() {
                    if let Some(null_index) = info.null_index() {
                        return Ok(Some(Conflict::Overlaps(null_index)));
                    }
                    continue;
                }
                let result = bound_bsearch(key, info, Probe::Values(slice::from_ref(value)));
                if let Some(offset) = result.exact_match() {
                    return conflict_at(info, offset).map(Some);
                }
            }
            Ok(None)
        }
        PartitionBoundSpec::Range { lower, upper } => {
            let lower_bound = RangeBound::from_datums(key, None, lower, true)?;
            let upper_bound = RangeBound::from_datums(key, None, upper, false)?;
            if compare_range_bounds(key, lower_bound.as_view(), upper_bound.as_view())
                != Ordering::Less
            {
                return Err(PartitionError::EmptyRangeBound {
                    partition: partition.to_string(),
                    lower: format_range_datums(lower),
                    upper: format_range_datums(upper),
                });
            }
            let Some(info) = existing else {
                return Ok(None);
            };

            // The new lower bound is inclusive. If the entry above it has no
            // partition, the lower bound sits in a gap and the new range
            // must end at or before the next lower bound; otherwise it lands
            // inside the partition ending at that entry.
            let next = bound_bsearch(key, info, Probe::Bound(lower_bound.as_view())).next_offset();
            if info.indexes[next].is_some() {
                return conflict_at(info, next).map(Some);
            }
            if next < info.ndatums()
                && compare_entry_at(key, info, next, Probe::Bound(upper_bound.as_view()))
                    == Ordering::Less
            {
                return conflict_at(info, next + 1).map(Some);
            }
            Ok(None)
        }
    }
}

fn conflict_at(info: &BoundInfo, slot: usize) -> Result<Conflict> {
    info.indexes
        .get(slot)
        .copied()
        .flatten()
        .map(Conflict::Overlaps)
        .ok_or_else(|| {
            PartitionError::Internal(format!("bound entry {slot} has no owning partition"))
        })
}
