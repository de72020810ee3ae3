pub mod canonical;
pub mod compare;
pub mod search;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bound::canonical::build_bound_info;
use crate::bound::compare::Probe;
use crate::bound::search::bound_bsearch;
use crate::error::{PartitionError, Result};
use crate::key::{PartitionKey, PartitionStrategy};
use crate::spec::{PartitionBoundSpec, RangeDatumKind};
use crate::value::Value;

/// Catalog identifier of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationId(pub u32);

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical, sorted and deduplicated bounds of all partitions of one
/// partitioned table.
///
/// For LIST, `datums[i]` holds one value and `indexes[i]` the canonical
/// index of the partition accepting it. For RANGE, `kind[i]` tags each
/// column of entry `i`, and `indexes` has one extra trailing slot:
/// `indexes[i]` is the partition whose upper bound is entry `i`, or `None`
/// when entry `i` is a lower bound opening a gap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundInfo {
    pub(crate) strategy: PartitionStrategy,
    pub(crate) datums: Vec<Vec<Value>>,
    pub(crate) kind: Vec<Vec<RangeDatumKind>>,
    pub(crate) indexes: Vec<Option<usize>>,
    pub(crate) null_index: Option<usize>,
    pub(crate) default_index: Option<usize>,
}

impl BoundInfo {
    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    pub fn ndatums(&self) -> usize {
        self.datums.len()
    }

    pub fn datums(&self, offset: usize) -> &[Value] {
        &self.datums[offset]
    }

    /// Column kinds of a RANGE entry; `None` for LIST.
    pub fn kinds(&self, offset: usize) -> Option<&[RangeDatumKind]> {
        self.kind.get(offset).map(Vec::as_slice)
    }

    pub fn indexes(&self) -> &[Option<usize>] {
        &self.indexes
    }

    pub fn null_index(&self) -> Option<usize> {
        self.null_index
    }

    pub fn default_index(&self) -> Option<usize> {
        self.default_index
    }

    pub fn accepts_nulls(&self) -> bool {
        self.null_index.is_some()
    }

    pub fn has_default(&self) -> bool {
        self.default_index.is_some()
    }

    /// Canonical index of the partition accepting a row with these key
    /// values, falling back to the default partition.
    pub fn partition_for_values(&self, key: &PartitionKey, values: &[Value]) -> Option<usize> {
        let found = match self.strategy {
            PartitionStrategy::List => {
                if values[0].is_null() {
                    self.null_index
                } else {
                    bound_bsearch(key, self, Probe::Values(values))
                        .exact_match()
                        .and_then(|offset| self.indexes[offset])
                }
            }
            // No range accepts NULL.
            PartitionStrategy::Range if values.iter().any(Value::is_null) => None,
            PartitionStrategy::Range => {
                let result = bound_bsearch(key, self, Probe::Values(values));
                self.indexes[result.next_offset()]
            }
        };
        found.or(self.default_index)
    }
}

/// Structural equality of two bound collections.
///
/// Compares raw datums with [`Value::datum_eq`] and never calls the key's
/// comparison function, so any visible change to a bound makes the two
/// differ.
pub fn partition_bounds_equal(key: &PartitionKey, left: &BoundInfo, right: &BoundInfo) -> bool {
    if left.strategy != right.strategy
        || left.ndatums() != right.ndatums()
        || left.null_index != right.null_index
        || left.default_index != right.default_index
        || left.indexes.len() != right.indexes.len()
    {
        return false;
    }
    let range = left.strategy == PartitionStrategy::Range;
    for offset in 0..left.ndatums() {
        for keynum in 0..key.natts() {
            if range {
                let kind = left.kind[offset][keynum];
                if kind != right.kind[offset][keynum] {
                    return false;
                }
                if kind != RangeDatumKind::Value {
                    continue;
                }
            }
            if !left.datums[offset][keynum].datum_eq(&right.datums[offset][keynum]) {
                return false;
            }
        }
    }
    left.indexes == right.indexes
}

/// Partitions of one partitioned table: relation ids in canonical order
/// plus their bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDesc {
    oids: Vec<RelationId>,
    bounds: Option<BoundInfo>,
}

impl PartitionDesc {
    /// Builds the descriptor from children in catalog scan order.
    /// `catalog_default` is the default partition recorded for the parent;
    /// a DEFAULT child that disagrees with it means the catalog is corrupt.
    pub fn build(
        key: &PartitionKey,
        children: &[(RelationId, PartitionBoundSpec)],
        catalog_default: Option<RelationId>,
    ) -> Result<Self> {
        if children.is_empty() {
            return Ok(Self {
                oids: Vec::new(),
                bounds: None,
            });
        }
        for (relid, spec) in children {
            if spec.is_default() && catalog_default != Some(*relid) {
                return Err(PartitionError::Internal(format!(
                    "expected default partition {relid}, but catalog records {}",
                    catalog_default.map_or_else(|| "none".to_string(), |id| id.to_string())
                )));
            }
        }

        let (bounds, mapping) = build_bound_info(key, children.iter().map(|(_, spec)| spec))?;
        let mut oids = vec![RelationId(0); children.len()];
        for (ordinal, (relid, _)) in children.iter().enumerate() {
            oids[mapping[ordinal]] = *relid;
        }
        Ok(Self {
            oids,
            bounds: Some(bounds),
        })
    }

    pub fn nparts(&self) -> usize {
        self.oids.len()
    }

    pub fn oids(&self) -> &[RelationId] {
        &self.oids
    }

    pub fn bounds(&self) -> Option<&BoundInfo> {
        self.bounds.as_ref()
    }

    pub fn default_partition(&self) -> Option<RelationId> {
        self.bounds
            .as_ref()
            .and_then(BoundInfo::default_index)
            .map(|index| self.oids[index])
    }

    /// Same partitions with structurally equal bounds.
    pub fn equivalent(&self, key: &PartitionKey, other: &PartitionDesc) -> bool {
        if self.oids != other.oids {
            return false;
        }
        match (&self.bounds, &other.bounds) {
            (None, None) => true,
            (Some(a), Some(b)) => partition_bounds_equal(key, a, b),
            _ => false,
        }
    }
}
