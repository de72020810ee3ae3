use std::sync::Arc;

use partbound_core::{
    derive_constraint, derive_default_constraint, proposed_default_constraint,
    ExpressionEvaluator, PartitionBoundSpec, PartitionError, Predicate, RelationId,
};

use crate::cache::PartitionDescCache;
use crate::catalog::{Catalog, RelationInfo};
use crate::config::PartitionConfig;
use crate::error::{Result, RouterError};
use crate::layout::attribute_map;

/// Constraint a partition gets from its own bound, in the parent's layout.
fn own_constraint(
    catalog: &dyn Catalog,
    cache: &PartitionDescCache,
    parent: RelationId,
    spec: &PartitionBoundSpec,
) -> Result<Vec<Predicate>> {
    let parent_info = catalog.relation(parent)?;
    let key = catalog
        .partition_key(parent)?
        .ok_or_else(|| RouterError::NotPartitioned(parent_info.name))?;
    if !spec.is_default() {
        return Ok(derive_constraint(&key, spec)?);
    }
    let desc = cache.get(catalog, parent)?;
    let mut siblings = Vec::with_capacity(desc.nparts());
    for oid in desc.oids() {
        if let Some((_, sibling)) = catalog.partition_bound(*oid)? {
            siblings.push(sibling);
        }
    }
    Ok(derive_default_constraint(&key, &siblings)?)
}

/// Rewrites column numbers of `from`'s layout into `to`'s.
fn remap(quals: &[Predicate], from: &RelationInfo, to: &RelationInfo) -> Result<Vec<Predicate>> {
    let map = attribute_map(&from.layout, &to.layout)?;
    let lookup = |attno: usize| {
        map.get(attno).copied().ok_or_else(|| {
            PartitionError::Internal(format!(
                "column {attno} of \"{}\" has no counterpart in \"{}\"",
                from.name, to.name
            ))
        })
    };
    Ok(quals
        .iter()
        .map(|qual| qual.map_columns(&lookup))
        .collect::<std::result::Result<Vec<_>, PartitionError>>()?)
}

/// Full partition constraint of `relation` in its own layout: the
/// constraints of all its ancestors followed by its own. Empty for a
/// relation that is not a partition.
pub fn partition_qual(
    catalog: &dyn Catalog,
    cache: &PartitionDescCache,
    config: &PartitionConfig,
    relation: RelationId,
) -> Result<Arc<Vec<Predicate>>> {
    qual_at_depth(catalog, cache, config, relation, 0)
}

fn qual_at_depth(
    catalog: &dyn Catalog,
    cache: &PartitionDescCache,
    config: &PartitionConfig,
    relation: RelationId,
    depth: usize,
) -> Result<Arc<Vec<Predicate>>> {
    if let Some(qual) = cache.cached_qual(relation) {
        return Ok(qual);
    }
    let epoch = cache.qual_epoch();
    let Some((parent, spec)) = catalog.partition_bound(relation)? else {
        return Ok(cache.store_qual(relation, epoch, Vec::new()));
    };
    let info = catalog.relation(relation)?;
    if depth >= config.max_tree_depth {
        return Err(RouterError::TreeTooDeep {
            relation: info.name,
            limit: config.max_tree_depth,
        });
    }
    let parent_info = catalog.relation(parent)?;
    let mut quals = qual_at_depth(catalog, cache, config, parent, depth + 1)?.to_vec();
    quals.extend(own_constraint(catalog, cache, parent, &spec)?);
    let quals = remap(&quals, &parent_info, &info)?;
    Ok(cache.store_qual(relation, epoch, quals))
}

/// [`partition_qual`] folded into a single predicate.
pub fn partition_qual_expr(
    catalog: &dyn Catalog,
    cache: &PartitionDescCache,
    config: &PartitionConfig,
    relation: RelationId,
) -> Result<Option<Predicate>> {
    let quals = partition_qual(catalog, cache, config, relation)?;
    if quals.is_empty() {
        return Ok(None);
    }
    Ok(Some(Predicate::and_all(quals.to_vec())))
}

/// Fails if the default partition of `parent` holds a row that a new
/// partition with bound `spec` would accept.
///
/// Every leaf below the default partition is scanned. A row passes when
/// the default partition's updated constraint is true or NULL for it.
pub fn check_default_allows_bound(
    catalog: &dyn Catalog,
    cache: &PartitionDescCache,
    evaluator: &dyn ExpressionEvaluator,
    parent: RelationId,
    partition: &str,
    spec: &PartitionBoundSpec,
) -> Result<()> {
    let desc = cache.get(catalog, parent)?;
    let Some(default) = desc.default_partition() else {
        return Ok(());
    };
    let parent_info = catalog.relation(parent)?;
    let key = catalog
        .partition_key(parent)?
        .ok_or_else(|| RouterError::NotPartitioned(parent_info.name.clone()))?;
    let check = proposed_default_constraint(derive_constraint(&key, spec)?);
    let default_info = catalog.relation(default)?;

    for leaf in leaves_under(catalog, default_info.clone())? {
        let mapped = remap(std::slice::from_ref(&check), &parent_info, &leaf)?;
        let leaf_qual = Predicate::and_all(mapped);
        let leaf_check = leaf_qual.prepare(evaluator)?;
        let rows = catalog.scan_rows(leaf.id)?;
        log::debug!(
            "scanning {} rows of \"{}\" for rows belonging to \"{partition}\"",
            rows.len(),
            leaf.name
        );
        for row in &rows {
            if leaf_check.evaluate(row)? == Some(false) {
                log::info!(
                    "updated partition constraint for default partition \"{}\" would be violated by some row",
                    default_info.name
                );
                return Err(RouterError::DefaultPartitionViolation {
                    default: default_info.name.clone(),
                    scanned: leaf.name.clone(),
                    partition: partition.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// `relation` itself if it stores rows, otherwise every leaf below it.
fn leaves_under(catalog: &dyn Catalog, relation: RelationInfo) -> Result<Vec<RelationInfo>> {
    let mut leaves = Vec::new();
    let mut pending = vec![relation];
    while let Some(current) = pending.pop() {
        if !current.is_partitioned() {
            leaves.push(current);
            continue;
        }
        for (child, _) in catalog.partitions(current.id)? {
            pending.push(catalog.relation(child)?);
        }
    }
    Ok(leaves)
}
