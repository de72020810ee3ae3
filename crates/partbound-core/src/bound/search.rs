use std::cmp::Ordering;

use crate::bound::compare::{compare_entry_at, Probe};
use crate::bound::BoundInfo;
use crate::key::PartitionKey;

/// Outcome of [`bound_bsearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchResult {
    /// Greatest entry that is `<=` the probe; `None` when every entry is
    /// greater.
    pub offset: Option<usize>,
    /// Whether the entry at `offset` equals the probe.
    pub equal: bool,
}

impl SearchResult {
    /// Index of the entry right above `offset`. For RANGE this is the slot
    /// of `indexes` naming the partition that contains the probe.
    pub fn next_offset(&self) -> usize {
        self.offset.map_or(0, |offset| offset + 1)
    }

    pub fn exact_match(&self) -> Option<usize> {
        if self.equal {
            self.offset
        } else {
            None
        }
    }
}

/// Binary search over the canonical entries of `info`. Stops at the first
/// exact match.
pub fn bound_bsearch(key: &PartitionKey, info: &BoundInfo, probe: Probe<'_>) -> SearchResult {
    let mut lo: isize = -1;
    let mut hi: isize = info.ndatums() as isize - 1;
    let mut equal = false;
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        let cmp = compare_entry_at(key, info, mid as usize, probe);
        if cmp != Ordering::Greater {
            lo = mid;
            equal = cmp == Ordering::Equal;
            if equal {
                break;
            }
        } else {
            hi = mid - 1;
        }
    }
    SearchResult {
        offset: usize::try_from(lo).ok(),
        equal,
    }
}
