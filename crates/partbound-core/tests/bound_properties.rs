use std::cmp::Ordering;
use std::collections::BTreeSet;

use partbound_core::{
    bound_bsearch, build_bound_info, compare_entry_at, compare_range_bounds,
    partition_bounds_equal, BoundInfo, ColumnType, KeyColumn, PartitionBoundSpec, PartitionDesc,
    PartitionKey, Probe, RangeBoundView, RangeDatum, RelationId, Value,
};
use proptest::prelude::*;

fn range_key() -> PartitionKey {
    PartitionKey::range(vec![KeyColumn::column("k", 0, ColumnType::Integer)]).unwrap()
}

fn list_key() -> PartitionKey {
    PartitionKey::list(KeyColumn::column("k", 0, ColumnType::Integer))
}

/// Non-overlapping `[lo, hi)` intervals between consecutive cut points,
/// some of them skipped to leave gaps.
fn arb_ranges() -> impl Strategy<Value = Vec<(i64, i64)>> {
    (
        prop::collection::btree_set(-1_000i64..1_000, 2..24),
        prop::collection::vec(any::<bool>(), 24),
    )
        .prop_map(|(cuts, keep)| {
            let cuts: Vec<i64> = cuts.into_iter().collect();
            let mut ranges: Vec<(i64, i64)> = cuts
                .windows(2)
                .zip(keep.iter())
                .filter(|(_, keep)| **keep)
                .map(|(pair, _)| (pair[0], pair[1]))
                .collect();
            if ranges.is_empty() {
                ranges.push((cuts[0], cuts[1]));
            }
            ranges
        })
}

/// Disjoint value sets, one per partition.
fn arb_lists() -> impl Strategy<Value = Vec<Vec<i64>>> {
    (
        prop::collection::btree_set(-500i64..500, 1..40),
        1usize..6,
    )
        .prop_map(|(values, nparts)| {
            let mut lists = vec![Vec::new(); nparts];
            for (i, value) in values.into_iter().enumerate() {
                lists[i % nparts].push(value);
            }
            lists.retain(|list| !list.is_empty());
            lists
        })
}

fn range_specs(ranges: &[(i64, i64)]) -> Vec<PartitionBoundSpec> {
    ranges
        .iter()
        .map(|(lo, hi)| {
            PartitionBoundSpec::range(
                vec![RangeDatum::Value(Value::Integer(*lo))],
                vec![RangeDatum::Value(Value::Integer(*hi))],
            )
        })
        .collect()
}

fn entry(info: &BoundInfo, offset: usize) -> RangeBoundView<'_> {
    RangeBoundView {
        datums: info.datums(offset),
        kind: info.kinds(offset).unwrap(),
        lower: info.indexes()[offset].is_none(),
    }
}

proptest! {
    #[test]
    fn canonical_entries_are_strictly_ascending(ranges in arb_ranges()) {
        let key = range_key();
        let (info, _) = build_bound_info(&key, &range_specs(&ranges)).unwrap();
        for i in 1..info.ndatums() {
            prop_assert_eq!(
                compare_range_bounds(&key, entry(&info, i - 1), entry(&info, i)),
                Ordering::Less
            );
        }
        prop_assert_eq!(info.indexes().len(), info.ndatums() + 1);
        prop_assert_eq!(info.indexes().last().copied(), Some(None));
    }

    #[test]
    fn search_returns_greatest_entry_not_above_probe(ranges in arb_ranges(), probe in -1_100i64..1_100) {
        let key = range_key();
        let (info, _) = build_bound_info(&key, &range_specs(&ranges)).unwrap();
        let values = [Value::Integer(probe)];
        let result = bound_bsearch(&key, &info, Probe::Values(&values));
        let cmp_at = |offset| compare_entry_at(&key, &info, offset, Probe::Values(&values));
        match result.offset {
            Some(offset) => {
                let cmp = cmp_at(offset);
                prop_assert_ne!(cmp, Ordering::Greater);
                prop_assert_eq!(result.equal, cmp == Ordering::Equal);
                if offset + 1 < info.ndatums() {
                    prop_assert_eq!(cmp_at(offset + 1), Ordering::Greater);
                }
            }
            None => {
                prop_assert!(!result.equal);
                if info.ndatums() > 0 {
                    prop_assert_eq!(cmp_at(0), Ordering::Greater);
                }
            }
        }
    }

    #[test]
    fn range_routing_finds_the_containing_partition(ranges in arb_ranges(), probe in -1_100i64..1_100) {
        let key = range_key();
        let (info, mapping) = build_bound_info(&key, &range_specs(&ranges)).unwrap();
        let expected = ranges
            .iter()
            .position(|(lo, hi)| *lo <= probe && probe < *hi)
            .map(|ordinal| mapping[ordinal]);
        prop_assert_eq!(info.partition_for_values(&key, &[Value::Integer(probe)]), expected);
    }

    #[test]
    fn build_is_independent_of_catalog_order(
        ranges in arb_ranges().prop_flat_map(|ranges| {
            let shuffled = Just(ranges.clone()).prop_shuffle();
            (Just(ranges), shuffled)
        })
    ) {
        let key = range_key();
        let (original, shuffled) = ranges;
        let with_ids = |ranges: &[(i64, i64)]| -> Vec<(RelationId, PartitionBoundSpec)> {
            // Relation ids follow the bound, not the scan position.
            ranges
                .iter()
                .zip(range_specs(ranges))
                .map(|((lo, _), spec)| (RelationId((*lo + 2_000) as u32), spec))
                .collect()
        };
        let a = PartitionDesc::build(&key, &with_ids(&original), None).unwrap();
        let b = PartitionDesc::build(&key, &with_ids(&shuffled), None).unwrap();
        prop_assert!(a.equivalent(&key, &b));
        prop_assert!(partition_bounds_equal(&key, a.bounds().unwrap(), b.bounds().unwrap()));
        prop_assert_eq!(a.oids(), b.oids());
    }

    #[test]
    fn list_routing_and_order_independence(
        lists in arb_lists().prop_flat_map(|lists| {
            let shuffled = Just(lists.clone()).prop_shuffle();
            (Just(lists), shuffled)
        }),
        probe in -600i64..600
    ) {
        let key = list_key();
        let (original, shuffled) = lists;
        let specs = |lists: &[Vec<i64>]| -> Vec<PartitionBoundSpec> {
            lists
                .iter()
                .map(|values| {
                    PartitionBoundSpec::list(values.iter().copied().map(Value::Integer).collect())
                })
                .collect()
        };
        let (a, mapping) = build_bound_info(&key, &specs(&original)).unwrap();
        let (b, _) = build_bound_info(&key, &specs(&shuffled)).unwrap();
        prop_assert!(partition_bounds_equal(&key, &a, &b));

        let expected = original
            .iter()
            .position(|values| values.contains(&probe))
            .map(|ordinal| mapping[ordinal]);
        prop_assert_eq!(a.partition_for_values(&key, &[Value::Integer(probe)]), expected);

        let distinct: BTreeSet<usize> = a.indexes().iter().flatten().copied().collect();
        prop_assert_eq!(distinct.len(), original.len());
    }
}
